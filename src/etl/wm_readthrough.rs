//! Wealth-management readthrough ETL.
//!
//! Narrative readthrough of wealth and asset management commentary:
//! flows, margins, and advisor dynamics from management discussion, plus
//! analyst pressure points from the QA session. Statements render under
//! category-group headers.

use super::categories::{Category, SectionScope};
use super::config::EtlConfig;
use super::document::{DocSection, ReportDocument};
use super::extraction::ExtractedStatement;
use super::persist::ReportDescriptor;
use super::{run_etl, EtlDefinition, EtlOutcome};
use crate::assistant::Aegis;
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::settings::Settings;
use crate::store::Institution;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Report type key for the wealth-management readthrough.
pub const REPORT_TYPE: &str = "wm_readthrough";

/// The wealth-management readthrough definition.
pub struct WmReadthroughEtl {
    config: EtlConfig,
    categories: Vec<Category>,
}

impl WmReadthroughEtl {
    /// Build with the built-in category template.
    pub fn new(settings: &Settings) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("WM_READTHROUGH", None, settings)?,
            categories: default_categories(),
        })
    }
}

#[async_trait]
impl EtlDefinition for WmReadthroughEtl {
    fn descriptor(&self) -> ReportDescriptor {
        ReportDescriptor {
            report_type: REPORT_TYPE.to_string(),
            report_name: "Wealth Management Readthrough".to_string(),
            report_description:
                "Wealth and asset management commentary from the quarterly call".to_string(),
        }
    }

    fn prompt_layer(&self) -> &'static str {
        "wm_readthrough_etl"
    }

    fn config(&self) -> &EtlConfig {
        &self.config
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    async fn build_document(
        &self,
        _services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        mut statements: Vec<ExtractedStatement>,
        _ctx: &ExecutionContext,
    ) -> AegisResult<Option<ReportDocument>> {
        if !statements.iter().any(|s| !s.rejected && !s.statement.is_empty()) {
            return Ok(None);
        }

        // Category names double as group headers in the single-section
        // narrative layout.
        for statement in &mut statements {
            if statement.category_group.is_none() && !statement.category.is_empty() {
                statement.category_group = Some(statement.category.clone());
            }
        }

        let mut document = ReportDocument::new(
            "Wealth Management Readthrough",
            format!("{} ({}) FY{fiscal_year} {quarter}", bank.name, bank.symbol),
        );
        document.push_section(
            DocSection::new("Wealth Management Commentary", statements)
                .with_subtitle("Grouped by topic, sorted by relevance"),
        );
        Ok(Some(document))
    }
}

/// Drive the wealth-management readthrough for one period.
pub async fn generate_wm_readthrough(
    services: &Aegis,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let definition = Arc::new(WmReadthroughEtl::new(&services.settings)?);
    run_etl(services, definition, fiscal_year, quarter, output_path).await
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            SectionScope::MD,
            "Wealth Management Commentary",
            "Net Flows",
            "Net new assets, inflows and outflows across wealth and asset management",
            &["Net inflows of $12 billion in the quarter"],
        ),
        Category::new(
            SectionScope::MD,
            "Wealth Management Commentary",
            "Fee Margins",
            "Fee rates, margin trends, and mix shifts in managed assets",
            &[],
        ),
        Category::new(
            SectionScope::MD,
            "Wealth Management Commentary",
            "Advisor Dynamics",
            "Advisor headcount, recruiting, and productivity",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            "Wealth Management Commentary",
            "Analyst Pressure Points",
            "Wealth-related questions analysts pressed on",
            &["Questions on sustainability of flow momentum"],
        ),
    ]
}
