//! Transcript retrieval engine.
//!
//! Six retrieval methods over the chunked corpus, selected by the
//! transcripts subagent via an LLM tool call:
//!
//! | Method | Input | Returns |
//! |--------|-------|---------|
//! | M0 full_section | section | every chunk of that section, ordered |
//! | M1 category_similarity | category + query embedding | top-K QA groups by aggregate embedding |
//! | M2 speaker_block | speaker_block_id | all chunks in the block |
//! | M3 qa_group | qa_group_id | all chunks in the group, ordered |
//! | M4 chunk_neighborhood | chunk_id ± N | chunk and neighbors, gaps noted |
//! | M5 vector_topk | query embedding + K | top-K chunks by cosine similarity |
//!
//! Returned chunk sequences are always in canonical document order when
//! contiguous; disjoint spans from similarity search are separated by the
//! [`GAP_SENTINEL`] so the downstream synthesizer can tell them apart.
//! There is no silent truncation: M0 returns every chunk regardless of
//! size; length management is the caller's responsibility.

use super::chunk::{Section, TranscriptChunk};
use super::store::TranscriptStore;
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sentinel inserted between disjoint retrieved spans.
///
/// Tests and the synthesis prompt depend on this exact text.
pub const GAP_SENTINEL: &str = "[Gap: non-contiguous excerpts]";

/// Default K for similarity methods.
pub const DEFAULT_TOP_K: usize = 5;

/// One of the six retrieval methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// M0: every chunk of one section.
    FullSection {
        /// Section to fetch (wire form `MD` / `QA`).
        section: Section,
    },
    /// M1: top-K QA groups whose aggregate embedding best matches.
    CategorySimilarity {
        /// Category name driving the query embedding.
        category: String,
        /// Number of groups to return.
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
    /// M2: all chunks in one speaker block.
    SpeakerBlock {
        /// Target block.
        speaker_block_id: i64,
    },
    /// M3: all chunks in one QA group.
    QaGroup {
        /// Target group.
        qa_group_id: i64,
    },
    /// M4: a chunk and its neighbors within its speaker block.
    ChunkNeighborhood {
        /// Block containing the chunk.
        speaker_block_id: i64,
        /// Center chunk.
        chunk_id: i64,
        /// Neighbors on each side.
        #[serde(default = "default_window")]
        window: i64,
    },
    /// M5: top-K chunks by cosine similarity.
    VectorTopK {
        /// Number of chunks to return.
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_window() -> i64 {
    2
}

impl RetrievalMethod {
    /// Whether this method needs a query embedding.
    pub fn needs_embedding(&self) -> bool {
        matches!(
            self,
            RetrievalMethod::CategorySimilarity { .. } | RetrievalMethod::VectorTopK { .. }
        )
    }
}

/// Retrieval output: contiguous segments of chunks in canonical order.
///
/// A single segment means the whole result is one contiguous span; gaps
/// appear only between segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContent {
    /// Contiguous spans, each internally in document order.
    pub segments: Vec<Vec<TranscriptChunk>>,
}

impl RetrievedContent {
    fn contiguous(chunks: Vec<TranscriptChunk>) -> Self {
        if chunks.is_empty() {
            Self { segments: Vec::new() }
        } else {
            Self { segments: vec![chunks] }
        }
    }

    /// All chunks across segments, in emission order.
    pub fn chunks(&self) -> impl Iterator<Item = &TranscriptChunk> {
        self.segments.iter().flatten()
    }

    /// Number of gap boundaries in the result.
    pub fn gap_count(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Render the result as text, separating disjoint spans with
    /// [`GAP_SENTINEL`].
    pub fn rendered(&self) -> String {
        self.segments
            .iter()
            .map(|segment| {
                segment.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n")
            })
            .collect::<Vec<_>>()
            .join(&format!("\n\n{GAP_SENTINEL}\n\n"))
    }
}

/// Retrieval engine over a transcript store.
pub struct RetrievalEngine {
    store: Arc<dyn TranscriptStore>,
}

impl RetrievalEngine {
    /// Create an engine over a store.
    pub fn new(store: Arc<dyn TranscriptStore>) -> Self {
        Self { store }
    }

    /// Execute one retrieval.
    ///
    /// `query_embedding` is required by M1 and M5 and ignored elsewhere;
    /// similarity methods with no embedding available return an empty
    /// result rather than an error.
    pub async fn retrieve(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        method: &RetrievalMethod,
        query_embedding: Option<&[f32]>,
    ) -> AegisResult<RetrievedContent> {
        let content = match method {
            RetrievalMethod::FullSection { section } => {
                let chunks =
                    self.store.fetch_section(bank_id, fiscal_year, quarter, *section).await?;
                RetrievedContent::contiguous(canonical_sort(chunks))
            }
            RetrievalMethod::SpeakerBlock { speaker_block_id } => {
                let chunks = self
                    .store
                    .fetch_speaker_block(bank_id, fiscal_year, quarter, *speaker_block_id)
                    .await?;
                RetrievedContent::contiguous(canonical_sort(chunks))
            }
            RetrievalMethod::QaGroup { qa_group_id } => {
                let chunks = self
                    .store
                    .fetch_qa_group(bank_id, fiscal_year, quarter, *qa_group_id)
                    .await?;
                RetrievedContent::contiguous(canonical_sort(chunks))
            }
            RetrievalMethod::ChunkNeighborhood { speaker_block_id, chunk_id, window } => {
                let chunks = self
                    .store
                    .fetch_speaker_block(bank_id, fiscal_year, quarter, *speaker_block_id)
                    .await?;
                let lo = chunk_id - window;
                let hi = chunk_id + window;
                let selected: Vec<TranscriptChunk> = canonical_sort(chunks)
                    .into_iter()
                    .filter(|c| c.chunk_id >= lo && c.chunk_id <= hi)
                    .collect();
                segment_by_adjacency(selected)
            }
            RetrievalMethod::CategorySimilarity { category, top_k } => {
                let Some(query) = query_embedding else {
                    return Ok(RetrievedContent::default());
                };
                let chunks =
                    self.store.fetch_section(bank_id, fiscal_year, quarter, Section::QA).await?;
                log_debug!(
                    category = %category,
                    qa_chunks = chunks.len(),
                    top_k = top_k,
                    "Ranking QA groups by category similarity"
                );
                top_qa_groups(chunks, query, *top_k)
            }
            RetrievalMethod::VectorTopK { top_k } => {
                let Some(query) = query_embedding else {
                    return Ok(RetrievedContent::default());
                };
                let chunks = self.store.fetch_call(bank_id, fiscal_year, quarter).await?;
                top_chunks(chunks, query, *top_k)
            }
        };

        Ok(content)
    }
}

/// Sort chunks into canonical document order.
fn canonical_sort(mut chunks: Vec<TranscriptChunk>) -> Vec<TranscriptChunk> {
    chunks.sort_by_key(TranscriptChunk::order_key);
    chunks
}

/// Split an ordered selection into contiguous segments.
///
/// Consecutive chunks stay in one segment only when strictly adjacent
/// within a speaker block; every other boundary is a gap.
fn segment_by_adjacency(chunks: Vec<TranscriptChunk>) -> RetrievedContent {
    let mut segments: Vec<Vec<TranscriptChunk>> = Vec::new();
    for chunk in chunks {
        match segments.last_mut() {
            Some(segment)
                if segment.last().is_some_and(|prev| prev.is_adjacent_to(&chunk)) =>
            {
                segment.push(chunk);
            }
            _ => segments.push(vec![chunk]),
        }
    }
    RetrievedContent { segments }
}

/// M1: rank QA groups by the cosine similarity of their mean embedding.
fn top_qa_groups(chunks: Vec<TranscriptChunk>, query: &[f32], top_k: usize) -> RetrievedContent {
    let mut groups: BTreeMap<i64, Vec<TranscriptChunk>> = BTreeMap::new();
    for chunk in chunks {
        let Some(group_id) = chunk.qa_group_id else { continue };
        groups.entry(group_id).or_default().push(chunk);
    }

    let mut scored: Vec<(i64, f32)> = groups
        .iter()
        .filter_map(|(group_id, members)| {
            mean_embedding(members).map(|mean| (*group_id, cosine_similarity(&mean, query)))
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    // Selected groups render in canonical order; each group is one
    // contiguous segment.
    let mut selected_ids: Vec<i64> = scored.into_iter().map(|(id, _)| id).collect();
    selected_ids.sort_unstable();

    let segments: Vec<Vec<TranscriptChunk>> = selected_ids
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .map(canonical_sort)
        .collect();
    RetrievedContent { segments }
}

/// M5: rank individual chunks by cosine similarity.
fn top_chunks(chunks: Vec<TranscriptChunk>, query: &[f32], top_k: usize) -> RetrievedContent {
    let mut scored: Vec<(f32, TranscriptChunk)> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let score = chunk.embedding.as_ref().map(|e| cosine_similarity(e, query))?;
            Some((score, chunk))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    let selected = canonical_sort(scored.into_iter().map(|(_, c)| c).collect());
    segment_by_adjacency(selected)
}

fn mean_embedding(chunks: &[TranscriptChunk]) -> Option<Vec<f32>> {
    let vectors: Vec<&Vec<f32>> = chunks.iter().filter_map(|c| c.embedding.as_ref()).collect();
    let first_len = vectors.first()?.len();
    let mut mean = vec![0.0f32; first_len];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != first_len {
            continue;
        }
        for (slot, value) in mean.iter_mut().zip(vector) {
            *slot += value;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for slot in &mut mean {
        *slot /= count as f32;
    }
    Some(mean)
}

/// Cosine similarity with a zero-norm guard.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
