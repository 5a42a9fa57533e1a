//! Transcript corpus: chunk model, backing store, retrieval engine.
//!
//! Earnings-call transcripts are stored pre-chunked. Management-discussion
//! (MD) chunks carry no QA group; question-and-answer (QA) chunks are
//! grouped by `qa_group_id` with one or more speaker blocks in ascending
//! order. Chunk order within (section, qa_group_id, speaker_block_id)
//! reconstructs the original transcript. The corpus is read-only from this
//! system's perspective.

pub mod chunk;
pub mod retrieval;
pub mod store;

pub use chunk::{Section, TranscriptChunk};
pub use retrieval::{RetrievalEngine, RetrievalMethod, RetrievedContent, GAP_SENTINEL};
pub use store::TranscriptStore;
