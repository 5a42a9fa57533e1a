//! Versioned prompt registry and global prompt blocks.
//!
//! Prompt records live in the relational store keyed by (layer, name);
//! only the most recently inserted version per key is served. Records can
//! reference global prompts (reusable text blocks such as the fiscal
//! context), which the registry prepends to the system text on load.

pub mod globals;
pub mod registry;

pub use registry::{LoadedPrompt, PromptRecord, PromptRegistry, PromptStore, render_template};
