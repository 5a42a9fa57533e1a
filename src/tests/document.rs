//! Document assembly and rendering tests.

use crate::etl::document::{auto_bold, DocSection, ReportDocument};
use crate::etl::extraction::ExtractedStatement;

fn statement(category: &str, text: &str, score: u8) -> ExtractedStatement {
    ExtractedStatement {
        category: category.to_string(),
        statement: text.to_string(),
        relevance_score: score,
        category_group: None,
        qa_id: None,
        significance_score: None,
        rejected: false,
        rejection_reason: None,
        source: None,
    }
}

#[test]
fn statements_render_sorted_by_score_with_prefix() {
    let mut document = ReportDocument::new("Summary", "Test Bank FY2025 Q2");
    document.push_section(DocSection::new(
        "Performance",
        vec![
            statement("Revenue", "lower first", 3),
            statement("Revenue", "higher second", 9),
        ],
    ));

    let markdown = document.render_markdown();
    let high = markdown.find("[9/10] higher second").expect("high-score line");
    let low = markdown.find("[3/10] lower first").expect("low-score line");
    assert!(high < low, "statements must sort by score descending");
}

#[test]
fn zero_score_statements_have_no_prefix() {
    let mut document = ReportDocument::new("Summary", "Test Bank");
    document.push_section(DocSection::new(
        "Overview",
        vec![statement("Overview", "narrative paragraph", 0)],
    ));

    let markdown = document.render_markdown();
    assert!(markdown.contains("- narrative paragraph"));
    assert!(!markdown.contains("[0/10]"));
}

#[test]
fn rejected_statements_are_absent_from_the_document() {
    let mut rejected = statement("Credit", "should not appear", 8);
    rejected.rejected = true;
    rejected.rejection_reason = Some("invalid JSON".to_string());

    let mut document = ReportDocument::new("Summary", "Test Bank");
    document.push_section(DocSection::new(
        "Credit",
        vec![rejected, statement("Credit", "kept", 5)],
    ));

    let markdown = document.render_markdown();
    assert!(!markdown.contains("should not appear"));
    assert!(markdown.contains("kept"));
}

#[test]
fn category_groups_render_as_headers() {
    let mut grouped = statement("Items", "an RTS item", 7);
    grouped.category_group = Some("RTS".to_string());
    let mut other = statement("Items", "a transcript item", 6);
    other.category_group = Some("Transcript".to_string());

    let mut document = ReportDocument::new("Report", "Test Bank");
    document.push_section(DocSection::new("Items of Note", vec![grouped, other]));

    let markdown = document.render_markdown();
    assert!(markdown.contains("### RTS"));
    assert!(markdown.contains("### Transcript"));
}

#[test]
fn subtitle_rows_render_under_headings() {
    let mut document = ReportDocument::new("Report", "Test Bank");
    document.push_section(
        DocSection::new("Themes", vec![statement("T", "text", 5)])
            .with_subtitle("Sorted by relevance"),
    );
    assert!(document.render_markdown().contains("*Sorted by relevance*"));
}

#[test]
fn empty_document_fails_validation() {
    let mut document = ReportDocument::new("Report", "Test Bank");
    let mut rejected = statement("X", "gone", 5);
    rejected.rejected = true;
    document.push_section(DocSection::new("Only Rejections", vec![rejected]));

    assert!(document.validate_non_empty().is_err());
    assert!(!document.has_content());
}

#[test]
fn auto_bold_wraps_metrics() {
    assert_eq!(auto_bold("grew 5% this quarter"), "grew **5%** this quarter");
    assert_eq!(auto_bold("added $3.2 billion"), "added **$3.2 billion**");
    assert_eq!(auto_bold("up 12 bps"), "up **12 bps**");
    assert_eq!(auto_bold("no metrics here"), "no metrics here");
}

#[test]
fn auto_bold_is_idempotent() {
    let once = auto_bold("5%");
    assert_eq!(once, "**5%**");
    assert_eq!(auto_bold(&once), once);

    let sentence = auto_bold("NIM of 1.65% on $900 billion of assets");
    assert_eq!(auto_bold(&sentence), sentence);
}
