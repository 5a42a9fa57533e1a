//! Capital-markets readthrough ETL.
//!
//! Three sections: forward-looking outlook statements from management
//! discussion, and two categorized question sets from the QA session
//! (market volatility and regulatory themes; pipeline strength and
//! activity levels). A batch formatting pass wraps numeric metrics in the
//! outlook statements with emphasis markup.

use super::categories::{Category, SectionScope};
use super::config::EtlConfig;
use super::document::{auto_bold, DocSection, ReportDocument};
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

/// Report type key for the capital-markets readthrough.
pub const REPORT_TYPE: &str = "cm_readthrough";

/// Section headings, in render order.
const OUTLOOK_SECTION: &str = "Capital Markets Outlook";
const VOLATILITY_SECTION: &str = "Market Volatility and Regulatory Q&A";
const PIPELINES_SECTION: &str = "Pipelines and Activity Q&A";

/// The capital-markets readthrough definition.
pub struct CmReadthroughEtl {
    config: EtlConfig,
    categories: Vec<Category>,
}

impl CmReadthroughEtl {
    /// Build with the built-in category template.
    pub fn new(settings: &Settings) -> AegisResult<Self> {
        Ok(Self {
            config: EtlConfig::from_yaml("CM_READTHROUGH", None, settings)?,
            categories: default_categories(),
        })
    }
}

#[async_trait]
impl EtlDefinition for CmReadthroughEtl {
    fn descriptor(&self) -> ReportDescriptor {
        ReportDescriptor {
            report_type: REPORT_TYPE.to_string(),
            report_name: "Capital Markets Readthrough".to_string(),
            report_description:
                "Capital markets outlook and categorized analyst questions".to_string(),
        }
    }

    fn prompt_layer(&self) -> &'static str {
        "cm_readthrough_etl"
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
        // Batch formatting pass: outlook metrics get emphasis markup.
        // auto_bold is idempotent, so re-running an ETL never stacks
        // asterisks.
        let outlook_categories: Vec<&str> = self
            .categories
            .iter()
            .filter(|c| c.report_section == OUTLOOK_SECTION)
            .map(|c| c.name.as_str())
            .collect();
        for statement in &mut statements {
            if outlook_categories.contains(&statement.category.as_str()) {
                statement.statement = auto_bold(&statement.statement);
            }
        }

        if !statements.iter().any(|s| !s.rejected && !s.statement.is_empty()) {
            return Ok(None);
        }

        let mut document = ReportDocument::new(
            "Capital Markets Readthrough",
            format!("{} ({}) FY{fiscal_year} {quarter}", bank.name, bank.symbol),
        );

        for section_name in [OUTLOOK_SECTION, VOLATILITY_SECTION, PIPELINES_SECTION] {
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
            document.push_section(DocSection::new(section_name, section_statements));
        }

        Ok(Some(document))
    }
}

/// Drive the capital-markets readthrough for one period.
pub async fn generate_cm_readthrough(
    services: &Aegis,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let definition = Arc::new(CmReadthroughEtl::new(&services.settings)?);
    run_etl(services, definition, fiscal_year, quarter, output_path).await
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            SectionScope::MD,
            OUTLOOK_SECTION,
            "Investment Banking activity",
            "Forward-looking commentary on investment banking fees and deal activity",
            &["Advisory pipeline is the strongest in two years"],
        ),
        Category::new(
            SectionScope::MD,
            OUTLOOK_SECTION,
            "Global Markets",
            "Trading revenue outlook and client flow expectations",
            &["FICC revenue expected to normalize"],
        ),
        Category::new(
            SectionScope::MD,
            OUTLOOK_SECTION,
            "Sponsor activity",
            "Financial sponsor engagement and leveraged finance pipelines",
            &["Sponsors re-engaging as rate clarity improves"],
        ),
        Category::new(
            SectionScope::MD,
            OUTLOOK_SECTION,
            "Market catalysts",
            "Events management expects to move activity levels",
            &["Election clarity seen unlocking M&A"],
        ),
        Category::new(
            SectionScope::MD,
            OUTLOOK_SECTION,
            "Competition shifts",
            "Share gains, losses, and competitive positioning changes",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            VOLATILITY_SECTION,
            "Global Markets",
            "Questions on trading conditions, volatility, and line draws",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            VOLATILITY_SECTION,
            "Risk Management",
            "Questions on hedging, VaR, and risk appetite",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            VOLATILITY_SECTION,
            "Corporate Banking",
            "Questions on corporate lending and facility utilization",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            VOLATILITY_SECTION,
            "Regulatory Changes",
            "Questions on capital rules and regulatory developments",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            PIPELINES_SECTION,
            "Investment Banking and M&A activity",
            "Questions on deal pipelines and announced-to-completed conversion",
            &[],
        ),
        Category::new(
            SectionScope::QA,
            PIPELINES_SECTION,
            "Transaction Banking",
            "Questions on cash management and trade finance activity",
            &[],
        ),
    ]
}
