//! Score-based items-of-note selection tests.

use crate::etl::document::select_featured_items;
use crate::etl::extraction::ExtractedStatement;

fn item(text: &str, score: Option<u8>) -> ExtractedStatement {
    ExtractedStatement {
        category: "Items of Note".to_string(),
        statement: text.to_string(),
        relevance_score: 0,
        category_group: None,
        qa_id: None,
        significance_score: score,
        rejected: false,
        rejection_reason: None,
        source: None,
    }
}

fn texts(items: &[ExtractedStatement]) -> Vec<&str> {
    items.iter().map(|i| i.statement.as_str()).collect()
}

#[test]
fn takes_top_two_from_each_source_sorted_by_score() {
    // RTS: A=9, B=7, C=5; Transcript: D=8, E=6; featured per source = 2.
    let rts = vec![item("A", Some(9)), item("B", Some(7)), item("C", Some(5))];
    let transcript = vec![item("D", Some(8)), item("E", Some(6))];

    let (featured, remaining) = select_featured_items(rts, transcript, 2);

    assert_eq!(texts(&featured), ["A", "D", "B", "E"]);
    assert_eq!(texts(&remaining), ["C"]);
}

#[test]
fn sources_are_tagged() {
    let (featured, _) =
        select_featured_items(vec![item("rts item", Some(9))], vec![item("call item", Some(8))], 2);
    assert_eq!(featured[0].source.as_deref(), Some("RTS"));
    assert_eq!(featured[1].source.as_deref(), Some("Transcript"));
}

#[test]
fn missing_scores_default_to_five() {
    let (featured, _) = select_featured_items(vec![item("unscored", None)], Vec::new(), 1);
    assert_eq!(featured[0].significance_score, Some(5));
}

#[test]
fn ties_keep_input_order() {
    let rts = vec![item("first", Some(7)), item("second", Some(7)), item("third", Some(7))];
    let (featured, remaining) = select_featured_items(rts, Vec::new(), 2);
    assert_eq!(texts(&featured), ["first", "second"]);
    assert_eq!(texts(&remaining), ["third"]);
}

#[test]
fn short_sources_yield_fewer_featured() {
    let (featured, remaining) =
        select_featured_items(vec![item("only", Some(4))], Vec::new(), 2);
    assert_eq!(texts(&featured), ["only"]);
    assert!(remaining.is_empty());
}
