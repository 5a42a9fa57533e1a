//! Report document assembly and rendering.
//!
//! The ETLs assemble a [`ReportDocument`]: a title block plus sections of
//! score-sorted statements, optionally grouped under category headers.
//! The in-crate renderer produces the markdown payload persisted in the
//! reports table; DOCX and PDF rendering is an external collaborator
//! behind [`DocumentRenderer`].

use super::extraction::ExtractedStatement;
use crate::error::{AegisError, AegisResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One document section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    /// Section heading.
    pub heading: String,
    /// Optional subtitle row rendered under the heading.
    pub subtitle: Option<String>,
    /// Statements for the section. Rejected statements are filtered at
    /// render time; scores drive the sort.
    pub statements: Vec<ExtractedStatement>,
}

impl DocSection {
    /// Build a section.
    pub fn new(heading: impl Into<String>, statements: Vec<ExtractedStatement>) -> Self {
        Self { heading: heading.into(), subtitle: None, statements }
    }

    /// Attach a subtitle row.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

/// Assembled report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    /// Document title.
    pub title: String,
    /// Subtitle (bank, period).
    pub subtitle: String,
    /// Sections in render order.
    pub sections: Vec<DocSection>,
}

impl ReportDocument {
    /// Build a document.
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self { title: title.into(), subtitle: subtitle.into(), sections: Vec::new() }
    }

    /// Append a section.
    pub fn push_section(&mut self, section: DocSection) {
        self.sections.push(section);
    }

    /// Whether any section carries a renderable statement.
    pub fn has_content(&self) -> bool {
        self.sections
            .iter()
            .any(|s| s.statements.iter().any(|st| !st.rejected && !st.statement.is_empty()))
    }

    /// Fail if the document would render empty.
    pub fn validate_non_empty(&self) -> AegisResult<()> {
        if self.has_content() {
            Ok(())
        } else {
            Err(AegisError::content(format!(
                "Document {} rendered empty; refusing to save",
                self.title
            )))
        }
    }

    /// Render the markdown payload.
    ///
    /// Per section: statements sorted by relevance score descending
    /// (stable, so input order breaks ties), a `[score/10]` prefix when
    /// the score is positive, group headers when any statement carries a
    /// `category_group`, and rejected statements excluded.
    pub fn render_markdown(&self) -> String {
        let mut out = format!("# {}\n\n{}\n", self.title, self.subtitle);

        for section in &self.sections {
            let mut statements: Vec<&ExtractedStatement> = section
                .statements
                .iter()
                .filter(|s| !s.rejected && !s.statement.is_empty())
                .collect();
            if statements.is_empty() {
                continue;
            }
            statements.sort_by_key(|s| std::cmp::Reverse(s.relevance_score));

            out.push_str(&format!("\n## {}\n", section.heading));
            if let Some(subtitle) = &section.subtitle {
                out.push_str(&format!("*{subtitle}*\n"));
            }
            out.push('\n');

            let grouped = statements.iter().any(|s| s.category_group.is_some());
            if grouped {
                // Group headers appear in first-statement order.
                let mut seen: Vec<&str> = Vec::new();
                for statement in &statements {
                    let group = statement.category_group.as_deref().unwrap_or("Other");
                    if !seen.contains(&group) {
                        seen.push(group);
                    }
                }
                for group in seen {
                    out.push_str(&format!("### {group}\n\n"));
                    for statement in statements
                        .iter()
                        .filter(|s| s.category_group.as_deref().unwrap_or("Other") == group)
                    {
                        out.push_str(&render_statement(statement));
                    }
                    out.push('\n');
                }
            } else {
                for statement in &statements {
                    out.push_str(&render_statement(statement));
                }
            }
        }
        out
    }
}

fn render_statement(statement: &ExtractedStatement) -> String {
    if statement.relevance_score > 0 {
        format!("- [{}/10] {}\n", statement.relevance_score, statement.statement)
    } else {
        format!("- {}\n", statement.statement)
    }
}

/// External renderer for DOCX (and optionally PDF) output.
///
/// The markdown payload is produced in-crate; binary document formats are
/// an external collaborator's concern.
pub trait DocumentRenderer: Send + Sync {
    /// Render the document to DOCX bytes.
    fn render_docx(&self, document: &ReportDocument) -> AegisResult<Vec<u8>>;

    /// Render the document to PDF bytes, when supported.
    fn render_pdf(&self, _document: &ReportDocument) -> AegisResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Fallback renderer that ships the markdown payload as the document body.
///
/// Used when no external DOCX service is wired in; the object store still
/// receives a deterministic artifact.
pub struct MarkdownFallbackRenderer;

impl DocumentRenderer for MarkdownFallbackRenderer {
    fn render_docx(&self, document: &ReportDocument) -> AegisResult<Vec<u8>> {
        Ok(document.render_markdown().into_bytes())
    }
}

/// Wrap numeric metrics in `**` emphasis without double-wrapping.
///
/// Matches percentages, dollar amounts, basis points, and magnitude-
/// suffixed figures. Idempotent: `auto_bold(auto_bold(s)) == auto_bold(s)`.
pub fn auto_bold(text: &str) -> String {
    static METRIC: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let metric = METRIC.get_or_init(|| {
        Regex::new(
            r"(?x)
            (\*\*[^*]+\*\*)                                    # already bold: pass through
            |
            (
                \$\d[\d,]*(?:\.\d+)?(?:\s?(?:billion|million|trillion))?  # dollar amounts
                |
                \d[\d,]*(?:\.\d+)?\s?(?:%|bps|basis\ points|billion|million|trillion)  # bare metrics
            )",
        )
        .expect("metric regex is valid")
    });

    metric
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if let Some(bold) = caps.get(1) {
                bold.as_str().to_string()
            } else {
                format!("**{}**", &caps[2])
            }
        })
        .into_owned()
}

/// Split items from two sources into featured and remaining sets by score.
///
/// Takes the top `featured_per_source` from each source (sorted by
/// significance descending; missing scores default to 5), then sorts the
/// featured set and the remainder by score descending. Sorting is stable,
/// so ties keep input order.
pub fn select_featured_items(
    rts_items: Vec<ExtractedStatement>,
    transcript_items: Vec<ExtractedStatement>,
    featured_per_source: usize,
) -> (Vec<ExtractedStatement>, Vec<ExtractedStatement>) {
    fn tag_and_sort(mut items: Vec<ExtractedStatement>, source: &str) -> Vec<ExtractedStatement> {
        for item in &mut items {
            item.source = Some(source.to_string());
            if item.significance_score.is_none() {
                item.significance_score = Some(5);
            }
        }
        items.sort_by_key(|i| std::cmp::Reverse(i.significance_score.unwrap_or(0)));
        items
    }

    let mut rts_sorted = tag_and_sort(rts_items, "RTS");
    let mut transcript_sorted = tag_and_sort(transcript_items, "Transcript");

    let rts_remaining = rts_sorted.split_off(featured_per_source.min(rts_sorted.len()));
    let transcript_remaining =
        transcript_sorted.split_off(featured_per_source.min(transcript_sorted.len()));

    let mut featured = rts_sorted;
    featured.extend(transcript_sorted);
    featured.sort_by_key(|i| std::cmp::Reverse(i.significance_score.unwrap_or(0)));

    let mut remaining = rts_remaining;
    remaining.extend(transcript_remaining);
    remaining.sort_by_key(|i| std::cmp::Reverse(i.significance_score.unwrap_or(0)));

    (featured, remaining)
}
