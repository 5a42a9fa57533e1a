//! Transcript retrieval engine tests.

use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::transcripts::{
    RetrievalEngine, RetrievalMethod, Section, TranscriptChunk, TranscriptStore, GAP_SENTINEL,
};
use async_trait::async_trait;
use std::sync::Arc;

/// In-memory transcript corpus.
#[derive(Default)]
struct MemoryTranscriptStore {
    chunks: Vec<TranscriptChunk>,
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn fetch_section(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        section: Section,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.section == section
            })
            .cloned()
            .collect())
    }

    async fn fetch_call(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
            })
            .cloned()
            .collect())
    }

    async fn fetch_speaker_block(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        speaker_block_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.speaker_block_id == speaker_block_id
            })
            .cloned()
            .collect())
    }

    async fn fetch_qa_group(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        qa_group_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.qa_group_id == Some(qa_group_id)
            })
            .cloned()
            .collect())
    }
}

fn chunk(
    section: Section,
    qa_group_id: Option<i64>,
    speaker_block_id: i64,
    chunk_id: i64,
    text: &str,
    embedding: Option<Vec<f32>>,
) -> TranscriptChunk {
    TranscriptChunk {
        bank_id: 1,
        fiscal_year: 2025,
        quarter: "Q2".to_string(),
        section,
        qa_group_id,
        speaker_block_id,
        chunk_id,
        text: text.to_string(),
        embedding,
    }
}

fn engine_with(chunks: Vec<TranscriptChunk>) -> RetrievalEngine {
    RetrievalEngine::new(Arc::new(MemoryTranscriptStore { chunks }))
}

#[tokio::test]
async fn full_section_returns_every_chunk_in_order_without_gaps() {
    let engine = engine_with(vec![
        // Deliberately shuffled insert order.
        chunk(Section::QA, Some(2), 5, 0, "second group", None),
        chunk(Section::QA, Some(1), 3, 1, "first group part two", None),
        chunk(Section::QA, Some(1), 3, 0, "first group part one", None),
    ]);

    let content = engine
        .retrieve(1, 2025, Quarter::Q2, &RetrievalMethod::FullSection { section: Section::QA }, None)
        .await
        .expect("retrieves");

    let texts: Vec<&str> = content.chunks().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["first group part one", "first group part two", "second group"]);
    assert_eq!(content.gap_count(), 0);
    assert!(!content.rendered().contains("[Gap:"));
}

#[tokio::test]
async fn full_section_over_empty_period_is_empty_not_error() {
    let engine = engine_with(Vec::new());
    let content = engine
        .retrieve(1, 2025, Quarter::Q2, &RetrievalMethod::FullSection { section: Section::MD }, None)
        .await
        .expect("empty result is not an error");
    assert!(content.is_empty());
    assert_eq!(content.rendered(), "");
}

#[tokio::test]
async fn vector_topk_marks_disjoint_spans_with_gap_sentinel() {
    let engine = engine_with(vec![
        chunk(Section::MD, None, 1, 0, "margin outlook", Some(vec![1.0, 0.0])),
        chunk(Section::MD, None, 1, 1, "filler", Some(vec![0.0, 1.0])),
        chunk(Section::MD, None, 1, 2, "NIM guidance figure", Some(vec![0.9, 0.1])),
    ]);

    let content = engine
        .retrieve(
            1,
            2025,
            Quarter::Q2,
            &RetrievalMethod::VectorTopK { top_k: 2 },
            Some(&[1.0, 0.0]),
        )
        .await
        .expect("retrieves");

    // Chunks 0 and 2 win; they are non-adjacent, so one gap.
    assert_eq!(content.gap_count(), 1);
    let rendered = content.rendered();
    assert!(rendered.contains(GAP_SENTINEL));
    assert!(rendered.contains("margin outlook"));
    assert!(rendered.contains("NIM guidance figure"));
    assert!(!rendered.contains("filler"));
}

#[tokio::test]
async fn vector_topk_without_embedding_is_empty() {
    let engine = engine_with(vec![chunk(Section::MD, None, 1, 0, "text", Some(vec![1.0]))]);
    let content = engine
        .retrieve(1, 2025, Quarter::Q2, &RetrievalMethod::VectorTopK { top_k: 3 }, None)
        .await
        .expect("no embedding degrades to empty");
    assert!(content.is_empty());
}

#[tokio::test]
async fn category_similarity_returns_whole_groups() {
    let engine = engine_with(vec![
        chunk(Section::QA, Some(1), 1, 0, "credit question", Some(vec![1.0, 0.0])),
        chunk(Section::QA, Some(1), 2, 0, "credit answer", Some(vec![1.0, 0.0])),
        chunk(Section::QA, Some(2), 3, 0, "unrelated question", Some(vec![0.0, 1.0])),
    ]);

    let content = engine
        .retrieve(
            1,
            2025,
            Quarter::Q2,
            &RetrievalMethod::CategorySimilarity { category: "credit".to_string(), top_k: 1 },
            Some(&[1.0, 0.0]),
        )
        .await
        .expect("retrieves");

    let texts: Vec<&str> = content.chunks().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["credit question", "credit answer"]);
    assert!(!content.rendered().contains("unrelated"));
}

#[tokio::test]
async fn qa_group_returns_ordered_chunks() {
    let engine = engine_with(vec![
        chunk(Section::QA, Some(7), 11, 1, "response continued", None),
        chunk(Section::QA, Some(7), 10, 0, "the question", None),
        chunk(Section::QA, Some(7), 11, 0, "the response", None),
    ]);

    let content = engine
        .retrieve(1, 2025, Quarter::Q2, &RetrievalMethod::QaGroup { qa_group_id: 7 }, None)
        .await
        .expect("retrieves");

    let texts: Vec<&str> = content.chunks().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["the question", "the response", "response continued"]);
    assert_eq!(content.gap_count(), 0);
}

#[tokio::test]
async fn chunk_neighborhood_notes_missing_neighbors_as_gaps() {
    // Chunks 0, 1, 3 exist in block 4; chunk 2 is missing.
    let engine = engine_with(vec![
        chunk(Section::MD, None, 4, 0, "zero", None),
        chunk(Section::MD, None, 4, 1, "one", None),
        chunk(Section::MD, None, 4, 3, "three", None),
    ]);

    let content = engine
        .retrieve(
            1,
            2025,
            Quarter::Q2,
            &RetrievalMethod::ChunkNeighborhood { speaker_block_id: 4, chunk_id: 1, window: 2 },
            None,
        )
        .await
        .expect("retrieves");

    assert_eq!(content.gap_count(), 1);
    assert!(content.rendered().contains(GAP_SENTINEL));
}

#[test]
fn retrieval_method_parses_from_tool_arguments() {
    let method: RetrievalMethod =
        serde_json::from_str(r#"{"method": "full_section", "section": "QA"}"#)
            .expect("parses");
    assert_eq!(method, RetrievalMethod::FullSection { section: Section::QA });

    // Leading newline, as some providers emit.
    let raw = "\n{\"method\": \"vector_topk\", \"top_k\": 3}";
    let method: RetrievalMethod =
        crate::llm::parse_tool_arguments(raw).expect("whitespace stripped before decode");
    assert_eq!(method, RetrievalMethod::VectorTopK { top_k: 3 });
}
