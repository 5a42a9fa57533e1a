//! ETL framework integration tests: first-run generation, second-run gap
//! detection, and deterministic object naming.

mod common;

use aegis::etl::generate_call_summary;
use aegis::fiscal::Quarter;
use aegis::store::object::document_name;
use aegis::store::DatabaseId;
use aegis::transcripts::{Section, TranscriptChunk};
use aegis::AegisError;
use common::{FixtureBuilder, Scripted, ScriptedLlm};
use std::sync::Arc;

fn chunk(section: Section, speaker_block_id: i64, chunk_id: i64, text: &str) -> TranscriptChunk {
    TranscriptChunk {
        bank_id: 1,
        fiscal_year: 2025,
        quarter: "Q2".to_string(),
        section,
        qa_group_id: if section == Section::QA { Some(1) } else { None },
        speaker_block_id,
        chunk_id,
        text: text.to_string(),
        embedding: None,
    }
}

fn extraction_reply(statement: &str, score: u8) -> Scripted {
    Scripted::ToolCall {
        name: "record_statements".to_string(),
        arguments: format!(
            r#"{{"statements": [{{"statement": "{statement}", "relevance_score": {score}}}]}}"#
        ),
    }
}

fn seeded_fixture(llm: Arc<ScriptedLlm>) -> common::Fixture {
    FixtureBuilder::default()
        .availability_row(
            1,
            "Royal Bank of Canada",
            "RY-CA",
            2025,
            Quarter::Q2,
            &[DatabaseId::Transcripts],
        )
        .transcript_chunk(chunk(Section::MD, 1, 0, "Management discussed revenue growth of 8%."))
        .transcript_chunk(chunk(Section::QA, 2, 0, "Analysts asked about credit quality."))
        .build(llm)
}

#[tokio::test]
async fn first_run_inserts_exactly_one_report_row() {
    // Six categories in the call-summary template; one extraction call
    // each. A leading newline in one payload exercises the whitespace
    // tolerance.
    let llm = Arc::new(ScriptedLlm::new(vec![
        extraction_reply("Revenue grew 8% year over year", 9),
        Scripted::ToolCall {
            name: "record_statements".to_string(),
            arguments: "\n{\"statements\": [{\"statement\": \"NIM expanded 5 bps\", \"relevance_score\": 7}]}".to_string(),
        },
        extraction_reply("PCL ratio rose modestly", 6),
        extraction_reply("CET1 at 13.2 percent", 8),
        extraction_reply("Management guided to mid-single-digit expense growth", 7),
        extraction_reply("Analysts pressed on deposit betas", 5),
    ]));
    let fixture = seeded_fixture(llm);

    let outcome = generate_call_summary(&fixture.aegis, 2025, Quarter::Q2, None)
        .await
        .expect("first run succeeds");

    assert_eq!(outcome.banks_processed, 1);
    assert_eq!(outcome.banks_with_content, 1);

    let rows = fixture.reports.rows.lock().expect("reports lock");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.report_type, "call_summary");
    assert!(row.s3_document_name.starts_with("reports/RY_2025_Q2_"));
    assert!(row.s3_document_name.ends_with(".docx"));
    let markdown = row.markdown_content.as_deref().expect("markdown payload");
    assert!(markdown.contains("[9/10] Revenue grew 8% year over year"));

    let uploads = fixture.uploads.uploads.lock().expect("uploads lock");
    assert_eq!(uploads.len(), 1);
}

#[tokio::test]
async fn second_run_detects_no_gap_and_inserts_nothing() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        extraction_reply("Revenue grew 8% year over year", 9),
        extraction_reply("NIM expanded 5 bps", 7),
        extraction_reply("PCL ratio rose modestly", 6),
        extraction_reply("CET1 at 13.2 percent", 8),
        extraction_reply("Guided to expense growth", 7),
        extraction_reply("Deposit beta questions", 5),
        // Nothing scripted for run two: it must make no LLM calls.
    ]));
    let fixture = seeded_fixture(llm);

    generate_call_summary(&fixture.aegis, 2025, Quarter::Q2, None)
        .await
        .expect("first run succeeds");
    let outcome2 = generate_call_summary(&fixture.aegis, 2025, Quarter::Q2, None)
        .await
        .expect("second run succeeds without LLM calls");

    assert_eq!(outcome2.banks_with_content, 0);
    assert_eq!(outcome2.metrics["banks_skipped"], serde_json::json!(1));

    let rows = fixture.reports.rows.lock().expect("reports lock");
    assert_eq!(rows.len(), 1, "second run must not add rows");
}

#[tokio::test]
async fn rejected_extractions_stay_out_of_document_but_in_telemetry() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        extraction_reply("Good statement", 8),
        // Undecodable payload: rejected, run continues.
        Scripted::ToolCall {
            name: "record_statements".to_string(),
            arguments: "this is not JSON".to_string(),
        },
        extraction_reply("Another good statement", 6),
        extraction_reply("Capital commentary", 7),
        extraction_reply("Outlook commentary", 7),
        extraction_reply("Analyst focus", 5),
    ]));
    let fixture = seeded_fixture(llm);

    let outcome = generate_call_summary(&fixture.aegis, 2025, Quarter::Q2, None)
        .await
        .expect("run succeeds despite one rejection");

    assert_eq!(outcome.banks_with_content, 1);
    assert_eq!(outcome.metrics["rejected_statements"], serde_json::json!(1));

    let rows = fixture.reports.rows.lock().expect("reports lock");
    let markdown = rows[0].markdown_content.as_deref().expect("markdown");
    assert!(markdown.contains("Good statement"));
    assert!(!markdown.contains("not JSON"));
}

#[tokio::test]
async fn no_applicable_banks_is_a_user_error() {
    let llm = Arc::new(ScriptedLlm::new(Vec::new()));
    let fixture = FixtureBuilder::default().build(llm);

    let err = generate_call_summary(&fixture.aegis, 2031, Quarter::Q1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AegisError::UserError { .. }));
}

#[test]
fn object_name_changes_only_with_content() {
    let a = document_name("RY-CA", 2025, Quarter::Q2, b"content one", "docx");
    let b = document_name("RY-CA", 2025, Quarter::Q2, b"content one", "docx");
    let c = document_name("RY-CA", 2025, Quarter::Q2, b"content two", "docx");

    assert_eq!(a, b, "same content must produce the same name");
    assert_ne!(a, c, "different content must produce a different name");
    assert!(a.starts_with("reports/RY_2025_Q2_"));

    let hash_part = a
        .trim_start_matches("reports/RY_2025_Q2_")
        .trim_end_matches(".docx");
    assert_eq!(hash_part.len(), 8);
    assert!(hash_part.chars().all(|c| c.is_ascii_hexdigit()));
}
