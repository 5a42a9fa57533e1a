//! Key-themes ETL.
//!
//! Extracts QA-section statements tagged with their `qa_id`, then runs a
//! grouping pass: an LLM tool call clusters QA groups into named themes.
//! A grouping that references a qa_id absent from the extraction is a
//! content error; the ETL falls back to one theme per category rather
//! than rendering a corrupt grouping.

use super::categories::{Category, SectionScope};
use super::config::EtlConfig;
use super::document::{DocSection, ReportDocument};
use super::extraction::ExtractedStatement;
use super::persist::ReportDescriptor;
use super::{run_etl, EtlDefinition, EtlOutcome};
use crate::assistant::Aegis;
use crate::context::ExecutionContext;
use crate::error::{AegisError, AegisResult};
use crate::fiscal::Quarter;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmParams, ToolDefinition};
use crate::logging::log_warn;
use crate::settings::Settings;
use crate::store::Institution;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Report type key for key themes.
pub const REPORT_TYPE: &str = "key_themes";

/// A named theme over one or more QA groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    /// Theme title.
    pub name: String,
    /// QA groups in the theme. Blocks store their group id only; the
    /// theme owns the forward references.
    pub qa_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct GroupingArguments {
    #[serde(default)]
    themes: Vec<WireTheme>,
}

#[derive(Debug, Deserialize)]
struct WireTheme {
    theme_name: String,
    #[serde(default)]
    qa_ids: Vec<i64>,
}

/// The key-themes ETL definition.
pub struct KeyThemesEtl {
    config: EtlConfig,
    categories: Vec<Category>,
}

impl KeyThemesEtl {
    /// Build with the built-in category template.
    pub fn new(settings: &Settings) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("KEY_THEMES", None, settings)?,
            categories: default_categories(),
        })
    }

    /// Cluster extracted statements into themes via LLM tool call.
    ///
    /// Validates every referenced qa_id against the extraction; an
    /// unknown id aborts the grouping with a content error.
    pub async fn group_themes(
        &self,
        services: &Aegis,
        statements: &[ExtractedStatement],
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<Theme>> {
        let known_ids: BTreeSet<i64> =
            statements.iter().filter_map(|s| s.qa_id).collect();
        if known_ids.is_empty() {
            return Ok(Vec::new());
        }

        let prompt =
            services.prompts.load_prompt(self.prompt_layer(), "theme_grouping", true, ctx).await?;

        let statement_list = statements
            .iter()
            .filter(|s| !s.rejected)
            .filter_map(|s| {
                s.qa_id.map(|id| format!("- qa_id {id}: {}", s.statement))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage::system(prompt.system_prompt),
            ChatMessage::user(format!("Statements by QA group:\n{statement_list}")),
        ];
        let tool = ToolDefinition {
            name: "group_themes".to_string(),
            description: "Cluster QA groups into named themes".to_string(),
            parameters: prompt.tool_definition.unwrap_or_else(default_grouping_schema),
        };
        let params = LlmParams {
            model: self.config.get_model("grouping"),
            temperature: self.config.temperature,
            max_tokens: self.config.get_max_tokens("grouping"),
        };

        let completion = services
            .llm
            .complete_with_tools(&messages, &[tool], ctx, &params)
            .await?;
        let Some(call) = completion.first_tool_call() else {
            return Err(AegisError::content("Theme grouping returned no tool call"));
        };
        let arguments: GroupingArguments = parse_tool_arguments(&call.arguments)?;

        let mut themes = Vec::with_capacity(arguments.themes.len());
        for wire in arguments.themes {
            for qa_id in &wire.qa_ids {
                if !known_ids.contains(qa_id) {
                    return Err(AegisError::content(format!(
                        "Theme {} references nonexistent qa_id {qa_id}",
                        wire.theme_name
                    )));
                }
            }
            themes.push(Theme { name: wire.theme_name, qa_ids: wire.qa_ids });
        }
        Ok(themes)
    }
}

#[async_trait]
impl EtlDefinition for KeyThemesEtl {
    fn descriptor(&self) -> ReportDescriptor {
        ReportDescriptor {
            report_type: REPORT_TYPE.to_string(),
            report_name: "Key Themes".to_string(),
            report_description: "Recurring themes across the analyst question-and-answer session"
                .to_string(),
        }
    }

    fn prompt_layer(&self) -> &'static str {
        "key_themes_etl"
    }

    fn config(&self) -> &EtlConfig {
        &self.config
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    async fn build_document(
        &self,
        services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        statements: Vec<ExtractedStatement>,
        ctx: &ExecutionContext,
    ) -> AegisResult<Option<ReportDocument>> {
        let usable: Vec<&ExtractedStatement> = statements
            .iter()
            .filter(|s| !s.rejected && !s.statement.is_empty())
            .collect();
        if usable.is_empty() {
            return Ok(None);
        }

        let mut document = ReportDocument::new(
            "Key Themes",
            format!("{} ({}) FY{fiscal_year} {quarter}", bank.name, bank.symbol),
        );

        let themes = match self.group_themes(services, &statements, ctx).await {
            Ok(themes) if !themes.is_empty() => themes,
            Ok(_) => Vec::new(),
            Err(e) => {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    bank_symbol = %bank.symbol,
                    error = %e,
                    "Theme grouping failed; falling back to per-category sections"
                );
                Vec::new()
            }
        };

        if themes.is_empty() {
            // Fallback layout: one section per category.
            let mut categories: Vec<&str> = Vec::new();
            for statement in &usable {
                if !categories.contains(&statement.category.as_str()) {
                    categories.push(statement.category.as_str());
                }
            }
            for category in categories {
                let section_statements: Vec<ExtractedStatement> = usable
                    .iter()
                    .filter(|s| s.category == category)
                    .map(|s| (*s).clone())
                    .collect();
                document.push_section(DocSection::new(category, section_statements));
            }
            return Ok(Some(document));
        }

        // Themes render ordered by their aggregate relevance.
        let mut scored: Vec<(u32, Theme)> = themes
            .into_iter()
            .map(|theme| {
                let score: u32 = usable
                    .iter()
                    .filter(|s| s.qa_id.is_some_and(|id| theme.qa_ids.contains(&id)))
                    .map(|s| s.relevance_score as u32)
                    .sum();
                (score, theme)
            })
            .collect();
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));

        for (_, theme) in scored {
            let theme_statements: Vec<ExtractedStatement> = usable
                .iter()
                .filter(|s| s.qa_id.is_some_and(|id| theme.qa_ids.contains(&id)))
                .map(|s| (*s).clone())
                .collect();
            if theme_statements.is_empty() {
                continue;
            }
            let subtitle = format!(
                "{} question group{}",
                theme.qa_ids.len(),
                if theme.qa_ids.len() == 1 { "" } else { "s" }
            );
            document.push_section(
                DocSection::new(theme.name, theme_statements).with_subtitle(subtitle),
            );
        }

        Ok(Some(document))
    }
}

/// Drive the key-themes ETL for one period.
pub async fn generate_key_themes(
    services: &Aegis,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let definition = Arc::new(KeyThemesEtl::new(&services.settings)?);
    run_etl(services, definition, fiscal_year, quarter, output_path).await
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            SectionScope::QA,
            "Themes",
            "Analyst Questions",
            "Substantive analyst questions and the responses they drew, tagged by QA group",
            &["Question on margin trajectory and the CFO's response"],
        ),
    ]
}

fn default_grouping_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "themes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "theme_name": {"type": "string"},
                        "qa_ids": {"type": "array", "items": {"type": "integer"}}
                    },
                    "required": ["theme_name", "qa_ids"]
                }
            }
        },
        "required": ["themes"]
    })
}
