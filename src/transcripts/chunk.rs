//! Transcript chunk model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transcript section: the two halves of an earnings call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    /// Management discussion.
    MD,
    /// Question and answer.
    QA,
}

impl Section {
    /// Wire form (`MD` / `QA`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::MD => "MD",
            Section::QA => "QA",
        }
    }

    /// Parse the wire form, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MD" => Some(Section::MD),
            "QA" => Some(Section::QA),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk of a transcript.
///
/// MD chunks have no `qa_group_id`. Within a QA group, speaker blocks
/// appear in ascending `speaker_block_id` order and chunks in ascending
/// `chunk_id` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Owning institution.
    pub bank_id: i32,
    /// Fiscal year of the call.
    pub fiscal_year: i32,
    /// Fiscal quarter of the call (wire form `Q1`..`Q4`).
    pub quarter: String,
    /// Section this chunk belongs to.
    pub section: Section,
    /// QA group, for QA chunks only.
    pub qa_group_id: Option<i64>,
    /// Speaker block within the section or group.
    pub speaker_block_id: i64,
    /// Chunk position within the speaker block.
    pub chunk_id: i64,
    /// Chunk text.
    pub text: String,
    /// Dense embedding, when one has been computed.
    pub embedding: Option<Vec<f32>>,
}

impl TranscriptChunk {
    /// Canonical sort key reconstructing document order.
    pub fn order_key(&self) -> (u8, i64, i64, i64) {
        let section_rank = match self.section {
            Section::MD => 0,
            Section::QA => 1,
        };
        (
            section_rank,
            self.qa_group_id.unwrap_or(0),
            self.speaker_block_id,
            self.chunk_id,
        )
    }

    /// Whether `other` immediately follows this chunk within the same
    /// speaker block. Adjacency across speaker blocks is not knowable from
    /// ids alone, so similarity output always marks block boundaries as
    /// gaps.
    pub fn is_adjacent_to(&self, other: &TranscriptChunk) -> bool {
        self.section == other.section
            && self.qa_group_id == other.qa_group_id
            && self.speaker_block_id == other.speaker_block_id
            && other.chunk_id == self.chunk_id + 1
    }
}
