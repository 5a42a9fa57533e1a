//! Backing store for the transcript corpus.

use super::chunk::{Section, TranscriptChunk};
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use async_trait::async_trait;

/// Read-only access to the chunked transcript corpus.
///
/// Implementations must return chunks in canonical document order
/// (section, qa_group_id, speaker_block_id, chunk_id ascending). The
/// relational gateway provides the production implementation; tests use
/// in-memory fixtures.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Every chunk of one section of one call, ordered. An empty result is
    /// valid (no transcript for the period), never an error.
    async fn fetch_section(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        section: Section,
    ) -> AegisResult<Vec<TranscriptChunk>>;

    /// Every chunk of both sections of one call, ordered.
    async fn fetch_call(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<TranscriptChunk>>;

    /// All chunks in one speaker block, ordered.
    async fn fetch_speaker_block(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        speaker_block_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>>;

    /// All chunks in one QA group, ordered.
    async fn fetch_qa_group(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        qa_group_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>>;
}
