//! Per-bank category extraction.
//!
//! For each category applicable to a bank's transcript sections, the
//! framework retrieves the relevant chunks, renders the extraction prompt,
//! calls `complete_with_tools` with the category's tool schema, and parses
//! the tool-call arguments (whitespace stripped before JSON decode) into
//! structured statements.
//!
//! A category whose arguments fail to decode or miss required fields is
//! logged as a rejected extraction with a reason; the run continues with
//! the next category. Rejected statements stay in telemetry and never
//! reach the rendered document.

use super::categories::{categories_list_text, Category};
use super::config::EtlConfig;
use crate::context::ExecutionContext;
use crate::error::{AegisError, AegisResult};
use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, LlmParams, ToolDefinition};
use crate::logging::{log_debug, log_warn};
use crate::prompts::{render_template, LoadedPrompt, PromptRegistry};
use serde::{Deserialize, Serialize};
use tiktoken_rs::cl100k_base;

/// One extracted statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedStatement {
    /// Category the statement was extracted under. Filled from the
    /// extraction context when the model omits it.
    #[serde(default)]
    pub category: String,
    /// The statement text.
    pub statement: String,
    /// Relevance in [0, 10]; statements render sorted by this.
    #[serde(default)]
    pub relevance_score: u8,
    /// Optional grouping header for hierarchical rendering.
    #[serde(default)]
    pub category_group: Option<String>,
    /// QA group the statement came from (theme-grouping ETLs).
    #[serde(default)]
    pub qa_id: Option<i64>,
    /// Significance for items-of-note selection.
    #[serde(default)]
    pub significance_score: Option<u8>,
    /// Whether the extraction was rejected.
    #[serde(default)]
    pub rejected: bool,
    /// Why the extraction was rejected.
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Source tag for multi-source ETLs (`RTS` / `Transcript`).
    #[serde(default)]
    pub source: Option<String>,
}

impl ExtractedStatement {
    /// A rejected placeholder carrying the reason into telemetry.
    pub fn rejected(category: &str, reason: impl Into<String>) -> Self {
        Self {
            category: category.to_string(),
            statement: String::new(),
            relevance_score: 0,
            category_group: None,
            qa_id: None,
            significance_score: None,
            rejected: true,
            rejection_reason: Some(reason.into()),
            source: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionArguments {
    #[serde(default)]
    statements: Vec<ExtractedStatement>,
    #[serde(default)]
    rejected: bool,
    #[serde(default)]
    rejection_reason: Option<String>,
}

/// Inputs for one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionInput<'a> {
    /// Bank display name.
    pub bank_name: &'a str,
    /// Fiscal year.
    pub fiscal_year: i32,
    /// Quarter wire form.
    pub quarter: &'a str,
    /// Retrieved transcript text (gap sentinels included).
    pub transcript_content: &'a str,
    /// What kind of content this is (`earnings call transcript`,
    /// `regulatory filing`).
    pub content_type: &'a str,
}

/// Rough token budget for transcript content in one extraction prompt.
pub const PROMPT_TOKEN_BUDGET: usize = 24_000;

/// Estimate the token count of a text with the cl100k tokenizer.
///
/// The tokenizer is built once per process. Falls back to a bytes/4
/// heuristic if it fails to load.
pub fn estimate_tokens(text: &str) -> usize {
    static TOKENIZER: std::sync::OnceLock<Option<tiktoken_rs::CoreBPE>> =
        std::sync::OnceLock::new();
    match TOKENIZER.get_or_init(|| cl100k_base().ok()) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len() / 4,
    }
}

/// Truncate text to a token budget at a line boundary.
///
/// Truncation is explicit, never silent: the caller receives a flag and
/// the framework logs it.
pub fn truncate_to_token_budget(text: &str, budget: usize) -> (String, bool) {
    if estimate_tokens(text) <= budget {
        return (text.to_string(), false);
    }

    let mut kept = String::new();
    for line in text.lines() {
        let candidate_len = kept.len() + line.len() + 1;
        // Cheap pre-check before paying for tokenization.
        if candidate_len / 3 > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        if estimate_tokens(&kept) > budget {
            // Drop the line that crossed the budget.
            if let Some(pos) = kept.rfind('\n') {
                kept.truncate(pos);
            }
            break;
        }
    }
    (kept, true)
}

/// Run one category extraction.
///
/// Never propagates a `ContentError`: malformed tool output becomes a
/// single rejected statement so the run continues.
pub async fn extract_category(
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    config: &EtlConfig,
    prompt_layer: &str,
    category: &Category,
    all_categories: &[Category],
    input: &ExtractionInput<'_>,
    ctx: &ExecutionContext,
) -> AegisResult<Vec<ExtractedStatement>> {
    let prompt = prompts.load_prompt(prompt_layer, "extraction", true, ctx).await?;

    let (content, truncated) =
        truncate_to_token_budget(input.transcript_content, PROMPT_TOKEN_BUDGET);
    if truncated {
        log_warn!(
            execution_id = %ctx.execution_id,
            bank_name = %input.bank_name,
            category = %category.name,
            "Transcript content exceeded the prompt token budget; truncated at a line boundary"
        );
    }

    let categories_list = categories_list_text(all_categories);
    let fiscal_year = input.fiscal_year.to_string();
    let pairs: Vec<(&str, &str)> = vec![
        ("bank_name", input.bank_name),
        ("fiscal_year", &fiscal_year),
        ("quarter", input.quarter),
        ("transcript_content", &content),
        ("categories_list", &categories_list),
        ("content_type", input.content_type),
        ("category_name", &category.name),
        ("category_description", &category.description),
    ];

    let system_prompt = render_template(&prompt.system_prompt, &pairs);
    let user_prompt = render_template(
        prompt.user_prompt.as_deref().unwrap_or(
            "Extract statements for category {category_name} from the {content_type} below.\n\n\
             {transcript_content}",
        ),
        &pairs,
    );

    let tool = extraction_tool(&prompt);
    let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
    let params = LlmParams {
        model: config.get_model("extraction"),
        temperature: config.temperature,
        max_tokens: config.get_max_tokens("extraction"),
    };

    let mut attempt = 0;
    let completion = loop {
        attempt += 1;
        match llm.complete_with_tools(&messages, &[tool.clone()], ctx, &params).await {
            Ok(completion) => break completion,
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    category = %category.name,
                    attempt = attempt,
                    error = %e,
                    "Extraction call failed; retrying"
                );
            }
            Err(e) => return Err(e),
        }
    };

    let Some(call) = completion.first_tool_call() else {
        return Ok(vec![ExtractedStatement::rejected(
            &category.name,
            "Extraction returned no tool call",
        )]);
    };

    let arguments: ExtractionArguments = match parse_tool_arguments(&call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            return Ok(vec![ExtractedStatement::rejected(&category.name, e.to_string())]);
        }
    };

    if arguments.rejected {
        return Ok(vec![ExtractedStatement::rejected(
            &category.name,
            arguments
                .rejection_reason
                .unwrap_or_else(|| "Extraction rejected by model".to_string()),
        )]);
    }

    let mut statements = arguments.statements;
    for statement in &mut statements {
        if statement.category.is_empty() {
            statement.category = category.name.clone();
        }
        statement.relevance_score = statement.relevance_score.min(10);
        if let Some(score) = statement.significance_score {
            statement.significance_score = Some(score.min(10));
        }
    }

    log_debug!(
        execution_id = %ctx.execution_id,
        bank_name = %input.bank_name,
        category = %category.name,
        statement_count = statements.len(),
        "Category extracted"
    );
    Ok(statements)
}

fn extraction_tool(prompt: &LoadedPrompt) -> ToolDefinition {
    ToolDefinition {
        name: "record_statements".to_string(),
        description: "Record the statements extracted for this category".to_string(),
        parameters: prompt.tool_definition.clone().unwrap_or_else(default_extraction_schema),
    }
}

fn default_extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "statements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": {"type": "string"},
                        "statement": {"type": "string"},
                        "relevance_score": {"type": "integer", "minimum": 0, "maximum": 10},
                        "category_group": {"type": "string"},
                        "qa_id": {"type": "integer"},
                        "significance_score": {"type": "integer", "minimum": 0, "maximum": 10}
                    },
                    "required": ["statement", "relevance_score"]
                }
            },
            "rejected": {"type": "boolean"},
            "rejection_reason": {"type": "string"}
        },
        "required": ["statements"]
    })
}
