//! Bank-earnings report ETL.
//!
//! The widest report: a key-metrics overview synthesized from both the
//! regulatory filing and the earnings call, plus "Items of Note" drawn
//! from the two sources with significance scores. Score-based selection
//! promotes the top items from each source into a featured section; the
//! remainder render sorted by score. No LLM deduplication pass is needed;
//! the scores assigned at extraction drive everything.

use super::categories::{Category, SectionScope};
use super::config::EtlConfig;
use super::document::{select_featured_items, DocSection, ReportDocument};
use super::extraction::{extract_category, ExtractedStatement, ExtractionInput};
use super::persist::ReportDescriptor;
use super::{run_etl, EtlDefinition, EtlOutcome, SectionTexts};
use crate::assistant::Aegis;
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmParams, ToolDefinition};
use crate::logging::{log_info, log_warn};
use crate::settings::Settings;
use crate::store::Institution;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Report type key for the bank-earnings report.
pub const REPORT_TYPE: &str = "bank_earnings_report";

/// Items promoted from each source into the featured section.
pub const FEATURED_PER_SOURCE: usize = 2;

/// Category name carrying overview narratives.
const OVERVIEW_CATEGORY: &str = "Overview";
/// Category name carrying items of note.
const ITEMS_CATEGORY: &str = "Items of Note";

/// The bank-earnings report definition.
pub struct BankEarningsEtl {
    config: EtlConfig,
    categories: Vec<Category>,
}

impl BankEarningsEtl {
    /// Build with the built-in category template.
    pub fn new(settings: &Settings) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("BANK_EARNINGS", None, settings)?,
            categories: default_categories(),
        })
    }

    /// Combine the two overview narratives into one paragraph.
    ///
    /// Edge cases short-circuit without an LLM call: either side empty
    /// uses the other verbatim. An LLM failure falls back to the
    /// transcript overview.
    pub async fn combine_overviews(
        &self,
        services: &Aegis,
        rts_overview: &str,
        transcript_overview: &str,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        ctx: &ExecutionContext,
    ) -> (String, String) {
        if rts_overview.is_empty() && transcript_overview.is_empty() {
            return (String::new(), "No overview content from either source".to_string());
        }
        if rts_overview.is_empty() {
            return (
                transcript_overview.to_string(),
                "Only transcript overview available".to_string(),
            );
        }
        if transcript_overview.is_empty() {
            return (rts_overview.to_string(), "Only RTS overview available".to_string());
        }

        let combined: AegisResult<(String, String)> = async {
            let prompt = services
                .prompts
                .load_prompt(self.prompt_layer(), "overview_combination", false, ctx)
                .await?;

            let system_prompt = crate::prompts::render_template(
                &prompt.system_prompt,
                &[
                    ("bank_name", bank.name.as_str()),
                    ("quarter", &quarter.to_string()),
                    ("fiscal_year", &fiscal_year.to_string()),
                ],
            );
            let user_prompt = crate::prompts::render_template(
                prompt.user_prompt.as_deref().unwrap_or(
                    "RTS overview:\n{rts_overview}\n\nTranscript overview:\n{transcript_overview}",
                ),
                &[
                    ("rts_overview", rts_overview),
                    ("transcript_overview", transcript_overview),
                ],
            );

            let tool = ToolDefinition {
                name: "combine_overview".to_string(),
                description: "Merge the two overview narratives".to_string(),
                parameters: prompt.tool_definition.unwrap_or_else(combination_schema),
            };
            let params = LlmParams {
                model: self.config.get_model("overview_combination"),
                temperature: self.config.temperature,
                max_tokens: self.config.get_max_tokens("overview_combination"),
            };

            let completion = services
                .llm
                .complete_with_tools(
                    &[ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
                    &[tool],
                    ctx,
                    &params,
                )
                .await?;

            #[derive(Debug, Deserialize)]
            struct CombinationArguments {
                #[serde(default)]
                combined_overview: String,
                #[serde(default)]
                combination_notes: String,
            }

            let Some(call) = completion.first_tool_call() else {
                return Err(crate::error::AegisError::content(
                    "Overview combination returned no tool call",
                ));
            };
            let arguments: CombinationArguments = parse_tool_arguments(&call.arguments)?;
            Ok((arguments.combined_overview, arguments.combination_notes))
        }
        .await;

        match combined {
            Ok((narrative, notes)) if !narrative.is_empty() => {
                log_info!(
                    execution_id = %ctx.execution_id,
                    combined_length = narrative.len(),
                    "Overview narratives combined"
                );
                (narrative, notes)
            }
            Ok(_) => (
                transcript_overview.to_string(),
                "Fallback: using transcript overview due to empty combination".to_string(),
            ),
            Err(e) => {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    error = %e,
                    "Overview combination failed; using transcript overview"
                );
                (
                    transcript_overview.to_string(),
                    "Fallback: using transcript overview due to LLM error".to_string(),
                )
            }
        }
    }
}

#[async_trait]
impl EtlDefinition for BankEarningsEtl {
    fn descriptor(&self) -> ReportDescriptor {
        ReportDescriptor {
            report_type: REPORT_TYPE.to_string(),
            report_name: "Bank Earnings Report".to_string(),
            report_description:
                "Key metrics overview and items of note from filings and the earnings call"
                    .to_string(),
        }
    }

    fn prompt_layer(&self) -> &'static str {
        "bank_earnings_etl"
    }

    fn config(&self) -> &EtlConfig {
        &self.config
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Transcript categories plus the regulatory filing as a second
    /// source, both tagged for the selection pass.
    async fn extract_bank(
        &self,
        services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        sections: &SectionTexts,
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<ExtractedStatement>> {
        let quarter_text = quarter.to_string();
        let mut statements = Vec::new();

        // Transcript side.
        for category in &self.categories {
            let content = sections.for_scope(category.transcript_sections);
            if content.is_empty() {
                continue;
            }
            let input = ExtractionInput {
                bank_name: &bank.name,
                fiscal_year,
                quarter: &quarter_text,
                transcript_content: &content,
                content_type: "earnings call transcript",
            };
            let mut extracted = extract_category(
                services.llm.as_ref(),
                &services.prompts,
                &self.config,
                self.prompt_layer(),
                category,
                &self.categories,
                &input,
                ctx,
            )
            .await?;
            for statement in &mut extracted {
                statement.source = Some("Transcript".to_string());
            }
            statements.extend(extracted);
        }

        // Regulatory filing side.
        let excerpts =
            services.rts.fetch_excerpts(bank.id, fiscal_year, quarter).await?;
        if excerpts.is_empty() {
            log_warn!(
                execution_id = %ctx.execution_id,
                bank_symbol = %bank.symbol,
                "No regulatory filing excerpts; report will be transcript-only"
            );
        } else {
            let filing_text = excerpts
                .iter()
                .map(|e| e.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            for category in &self.categories {
                let input = ExtractionInput {
                    bank_name: &bank.name,
                    fiscal_year,
                    quarter: &quarter_text,
                    transcript_content: &filing_text,
                    content_type: "regulatory filing",
                };
                let mut extracted = extract_category(
                    services.llm.as_ref(),
                    &services.prompts,
                    &self.config,
                    self.prompt_layer(),
                    category,
                    &self.categories,
                    &input,
                    ctx,
                )
                .await?;
                for statement in &mut extracted {
                    statement.source = Some("RTS".to_string());
                }
                statements.extend(extracted);
            }
        }

        Ok(statements)
    }

    async fn build_document(
        &self,
        services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        statements: Vec<ExtractedStatement>,
        ctx: &ExecutionContext,
    ) -> AegisResult<Option<ReportDocument>> {
        let (overviews, items): (Vec<ExtractedStatement>, Vec<ExtractedStatement>) = statements
            .into_iter()
            .filter(|s| !s.rejected && !s.statement.is_empty())
            .partition(|s| s.category == OVERVIEW_CATEGORY);

        if overviews.is_empty() && items.is_empty() {
            return Ok(None);
        }

        let pick_overview = |source: &str| -> String {
            overviews
                .iter()
                .filter(|s| s.source.as_deref() == Some(source))
                .map(|s| s.statement.clone())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let (narrative, _notes) = self
            .combine_overviews(
                services,
                &pick_overview("RTS"),
                &pick_overview("Transcript"),
                bank,
                fiscal_year,
                quarter,
                ctx,
            )
            .await;

        let (rts_items, transcript_items): (Vec<ExtractedStatement>, Vec<ExtractedStatement>) =
            items.into_iter().partition(|s| s.source.as_deref() == Some("RTS"));
        let (featured, remaining) =
            select_featured_items(rts_items, transcript_items, FEATURED_PER_SOURCE);

        let mut document = ReportDocument::new(
            "Bank Earnings Report",
            format!("{} ({}) FY{fiscal_year} {quarter}", bank.name, bank.symbol),
        );

        if !narrative.is_empty() {
            let overview_statement = ExtractedStatement {
                category: OVERVIEW_CATEGORY.to_string(),
                statement: narrative,
                relevance_score: 0,
                category_group: None,
                qa_id: None,
                significance_score: None,
                rejected: false,
                rejection_reason: None,
                source: None,
            };
            document.push_section(DocSection::new(
                "Key Metrics Overview",
                vec![overview_statement],
            ));
        }

        if !featured.is_empty() {
            document.push_section(
                DocSection::new("Items of Note", promote_significance(featured))
                    .with_subtitle("Top items from each source"),
            );
        }
        if !remaining.is_empty() {
            document.push_section(
                DocSection::new("Additional Items", promote_significance(remaining))
                    .with_subtitle("Sorted by significance"),
            );
        }

        if document.has_content() {
            Ok(Some(document))
        } else {
            Ok(None)
        }
    }
}

/// Items render sorted and prefixed by their significance score.
fn promote_significance(mut items: Vec<ExtractedStatement>) -> Vec<ExtractedStatement> {
    for item in &mut items {
        item.relevance_score = item.significance_score.unwrap_or(5);
        if let Some(source) = &item.source {
            item.category_group = Some(source.clone());
        }
    }
    items
}

/// Drive the bank-earnings report for one period.
pub async fn generate_bank_earnings_report(
    services: &Aegis,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let definition = Arc::new(BankEarningsEtl::new(&services.settings)?);
    run_etl(services, definition, fiscal_year, quarter, output_path).await
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            SectionScope::MD,
            "Key Metrics Overview",
            OVERVIEW_CATEGORY,
            "A single-paragraph narrative of the quarter's headline results",
            &["Net income of $4.2 billion on revenue growth across segments"],
        ),
        Category::new(
            SectionScope::All,
            "Items of Note",
            ITEMS_CATEGORY,
            "Unusual or one-time items affecting comparability, with a significance score",
            &["Restructuring charge of $120 million in the quarter"],
        ),
    ]
}

fn combination_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "combined_overview": {"type": "string"},
            "combination_notes": {"type": "string"}
        },
        "required": ["combined_overview"]
    })
}
