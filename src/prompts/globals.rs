//! Global prompt blocks.
//!
//! A global prompt is a reusable text block prepended to a prompt's system
//! text on demand. Blocks are either static or a pure function of "now"
//! (the fiscal context).

use crate::fiscal::fiscal_statement;
use chrono::NaiveDate;

/// Identity block shared by every agent in the pipeline.
const AEGIS_IDENTITY: &str = "\
You are Aegis, a financial research assistant specializing in bank earnings \
analysis. You ground every statement in retrieved source material and never \
speculate beyond it.";

/// Grounding rules shared by synthesis prompts.
const GROUNDING_RULES: &str = "\
Grounding rules:
- Attribute statements to their speakers (\"management noted\", \"analysts asked\", \"the CFO responded\").
- Quote verbatim only inside explicit quotation marks.
- Never expose internal identifiers, database field names, or section headers.
- If the retrieved material does not answer the question, say so.";

/// Resolve a global prompt id to its text block.
///
/// Returns `None` for unknown ids; the registry logs and skips those.
pub fn resolve_global(id: &str, today: NaiveDate) -> Option<String> {
    match id {
        "fiscal_context" => Some(fiscal_statement(today)),
        "aegis_identity" => Some(AEGIS_IDENTITY.to_string()),
        "grounding_rules" => Some(GROUNDING_RULES.to_string()),
        _ => None,
    }
}
