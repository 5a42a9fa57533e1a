//! Category template loader tests.

use crate::error::AegisError;
use crate::etl::categories::{
    categories_list_text, load_categories_csv, load_categories_yaml, SectionScope,
};
use crate::transcripts::Section;
use std::io::Write;

fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(content.as_bytes()).expect("write");
    file
}

#[test]
fn csv_loads_canonical_columns() {
    let csv = "\
transcript_sections,report_section,category_name,category_description,example_1,example_2,example_3
ALL,Financial Performance,Revenue,Reported revenue results,Revenue grew 8%,,
QA,Analyst Focus,Concerns,Questions analysts pressed on,Deposit betas,,
";
    let file = write_temp(csv, ".csv");
    let categories = load_categories_csv(file.path()).expect("loads");

    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].transcript_sections, SectionScope::All);
    assert_eq!(categories[0].report_section, "Financial Performance");
    assert_eq!(categories[0].name, "Revenue");
    assert_eq!(categories[0].examples, ["Revenue grew 8%"]);
    assert_eq!(categories[1].transcript_sections, SectionScope::QA);
}

#[test]
fn csv_missing_required_column_is_fatal() {
    let csv = "report_section,category_name,category_description\nA,B,C\n";
    let file = write_temp(csv, ".csv");
    let err = load_categories_csv(file.path()).unwrap_err();
    assert!(matches!(err, AegisError::Config { .. }));
    assert!(err.to_string().contains("transcript_sections"));
}

#[test]
fn csv_blank_rows_are_skipped() {
    let csv = "\
transcript_sections,report_section,category_name,category_description
MD,Outlook,Guidance,Forward-looking statements
MD,Outlook,,
";
    let file = write_temp(csv, ".csv");
    let categories = load_categories_csv(file.path()).expect("loads");
    assert_eq!(categories.len(), 1);
}

#[test]
fn csv_invalid_scope_is_fatal() {
    let csv = "\
transcript_sections,report_section,category_name,category_description
EVERYTHING,Outlook,Guidance,Forward-looking statements
";
    let file = write_temp(csv, ".csv");
    assert!(load_categories_csv(file.path()).is_err());
}

#[test]
fn yaml_loads_the_same_form() {
    let yaml = "\
- transcript_sections: QA
  report_section: Themes
  category_name: Analyst Questions
  category_description: Substantive questions
  example_1: Margin trajectory
";
    let file = write_temp(yaml, ".yaml");
    let categories = load_categories_yaml(file.path()).expect("loads");

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].transcript_sections, SectionScope::QA);
    assert_eq!(categories[0].examples, ["Margin trajectory"]);
}

#[test]
fn scope_covers_sections() {
    assert!(SectionScope::All.covers(Section::MD));
    assert!(SectionScope::All.covers(Section::QA));
    assert!(SectionScope::MD.covers(Section::MD));
    assert!(!SectionScope::MD.covers(Section::QA));
    assert!(!SectionScope::QA.covers(Section::MD));
}

#[test]
fn prompt_lines_carry_examples() {
    let csv = "\
transcript_sections,report_section,category_name,category_description,example_1
ALL,Perf,Margins,Margin commentary,NIM up 5 bps
";
    let file = write_temp(csv, ".csv");
    let categories = load_categories_csv(file.path()).expect("loads");
    let text = categories_list_text(&categories);
    assert!(text.contains("- Margins: Margin commentary (examples: NIM up 5 bps)"));
}
