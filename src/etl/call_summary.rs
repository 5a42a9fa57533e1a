//! Call-summary ETL.
//!
//! Extracts key statements from the whole call (MD and QA) across a broad
//! category template and renders them grouped by report section, sorted by
//! relevance with score prefixes.

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

/// Report type key for the call summary.
pub const REPORT_TYPE: &str = "call_summary";

/// The call-summary ETL definition.
pub struct CallSummaryEtl {
    config: EtlConfig,
    categories: Vec<Category>,
}

impl CallSummaryEtl {
    /// Build with the built-in category template.
    pub fn new(settings: &Settings) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("CALL_SUMMARY", None, settings)?,
            categories: default_categories(),
        })
    }

    /// Build with a caller-supplied category template.
    pub fn with_categories(settings: &Settings, categories: Vec<Category>) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("CALL_SUMMARY", None, settings)?,
            categories,
        })
    }
}

#[async_trait]
impl EtlDefinition for CallSummaryEtl {
    fn descriptor(&self) -> ReportDescriptor {
        ReportDescriptor {
            report_type: REPORT_TYPE.to_string(),
            report_name: "Earnings Call Summary".to_string(),
            report_description: "Structured summary of the quarterly earnings call".to_string(),
        }
    }

    fn prompt_layer(&self) -> &'static str {
        "call_summary_etl"
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
        statements: Vec<ExtractedStatement>,
        _ctx: &ExecutionContext,
    ) -> AegisResult<Option<ReportDocument>> {
        if !statements.iter().any(|s| !s.rejected && !s.statement.is_empty()) {
            return Ok(None);
        }

        let mut document = ReportDocument::new(
            "Earnings Call Summary",
            format!("{} ({}) FY{fiscal_year} {quarter}", bank.name, bank.symbol),
        );

        // Sections appear in category-template order.
        let mut section_order: Vec<&str> = Vec::new();
        for category in &self.categories {
            if !section_order.contains(&category.report_section.as_str()) {
                section_order.push(category.report_section.as_str());
            }
        }

        for section_name in section_order {
            let section_categories: Vec<&str> = self
                .categories
                .iter()
                .filter(|c| c.report_section == section_name)
                .map(|c| c.name.as_str())
                .collect();
            let section_statements: Vec<ExtractedStatement> = statements
                .iter()
                .filter(|s| section_categories.contains(&s.category.as_str()))
                .cloned()
                .collect();
            if section_statements.is_empty() {
                continue;
            }
            document.push_section(
                DocSection::new(section_name, section_statements)
                    .with_subtitle("Sorted by relevance"),
            );
        }

        Ok(Some(document))
    }
}

/// Drive the call-summary ETL for one period.
pub async fn generate_call_summary(
    services: &Aegis,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let definition = Arc::new(CallSummaryEtl::new(&services.settings)?);
    run_etl(services, definition, fiscal_year, quarter, output_path).await
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            SectionScope::All,
            "Financial Performance",
            "Revenue and Earnings",
            "Reported revenue, net income, and EPS results versus expectations",
            &["Revenue grew 8% year over year", "EPS of $2.84 beat consensus"],
        ),
        Category::new(
            SectionScope::All,
            "Financial Performance",
            "Margins and Profitability",
            "Net interest margin, efficiency ratio, and return metrics",
            &["NIM expanded 5 bps sequentially"],
        ),
        Category::new(
            SectionScope::All,
            "Credit and Risk",
            "Credit Quality",
            "Provisions, impaired loans, and allowance coverage",
            &["PCL ratio of 32 bps, up from 28 bps"],
        ),
        Category::new(
            SectionScope::All,
            "Capital and Liquidity",
            "Capital Position",
            "CET1 ratio, buybacks, and dividend actions",
            &["CET1 of 13.2% after the buyback"],
        ),
        Category::new(
            SectionScope::MD,
            "Strategy and Outlook",
            "Guidance and Outlook",
            "Forward-looking guidance and management outlook statements",
            &["Management expects mid-single-digit expense growth"],
        ),
        Category::new(
            SectionScope::QA,
            "Analyst Focus",
            "Analyst Concerns",
            "Themes analysts pressed on during the question-and-answer session",
            &["Multiple analysts asked about deposit betas"],
        ),
    ]
}
