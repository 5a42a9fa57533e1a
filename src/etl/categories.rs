//! Category templates.
//!
//! A category is an analyst-defined bucket constraining one LLM
//! extraction to a single topic. Templates load from CSV (or YAML) in the
//! canonical 6-column form: `transcript_sections`, `report_section`,
//! `category_name`, `category_description`, `example_1..example_3`.
//! Missing required columns are a fatal configuration error.

use crate::error::{AegisError, AegisResult};
use crate::transcripts::Section;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which transcript sections a category applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionScope {
    /// Both sections.
    All,
    /// Management discussion only.
    MD,
    /// Question and answer only.
    QA,
}

impl SectionScope {
    /// Parse the template form (`ALL` / `MD` / `QA`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Some(SectionScope::All),
            "MD" => Some(SectionScope::MD),
            "QA" => Some(SectionScope::QA),
            _ => None,
        }
    }

    /// Whether the scope covers a section.
    pub fn covers(&self, section: Section) -> bool {
        match self {
            SectionScope::All => true,
            SectionScope::MD => section == Section::MD,
            SectionScope::QA => section == Section::QA,
        }
    }
}

/// One extraction category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Sections this category is extracted from.
    pub transcript_sections: SectionScope,
    /// Document section the statements render under.
    pub report_section: String,
    /// Category name.
    pub name: String,
    /// What belongs in this category.
    pub description: String,
    /// Up to three example statements.
    pub examples: Vec<String>,
}

impl Category {
    /// Build a category inline (the built-in templates use this).
    pub fn new(
        scope: SectionScope,
        report_section: &str,
        name: &str,
        description: &str,
        examples: &[&str],
    ) -> Self {
        Self {
            transcript_sections: scope,
            report_section: report_section.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            examples: examples.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Prompt-ready one-line rendering.
    pub fn prompt_line(&self) -> String {
        if self.examples.is_empty() {
            format!("- {}: {}", self.name, self.description)
        } else {
            format!(
                "- {}: {} (examples: {})",
                self.name,
                self.description,
                self.examples.join("; ")
            )
        }
    }
}

/// Render a category list for a `{categories_list}` template slot.
pub fn categories_list_text(categories: &[Category]) -> String {
    categories.iter().map(Category::prompt_line).collect::<Vec<_>>().join("\n")
}

const REQUIRED_COLUMNS: [&str; 4] = [
    "transcript_sections",
    "report_section",
    "category_name",
    "category_description",
];

/// Load categories from a canonical-form CSV file.
pub fn load_categories_csv(path: &Path) -> AegisResult<Vec<Category>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        AegisError::config(format!("Categories file not readable: {} ({e})", path.display()))
    })?;

    let headers = reader
        .headers()
        .map_err(|e| AegisError::config(format!("Categories file has no header row: {e}")))?
        .clone();

    let index_of = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    for required in REQUIRED_COLUMNS {
        if index_of(required).is_none() {
            return Err(AegisError::config(format!(
                "Categories file {} is missing required column {required}",
                path.display()
            )));
        }
    }

    let sections_col = index_of("transcript_sections").unwrap_or_default();
    let report_col = index_of("report_section").unwrap_or_default();
    let name_col = index_of("category_name").unwrap_or_default();
    let description_col = index_of("category_description").unwrap_or_default();
    let example_cols: Vec<usize> = ["example_1", "example_2", "example_3"]
        .iter()
        .filter_map(|c| index_of(c))
        .collect();

    let mut categories = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| AegisError::config(format!("Categories file row unreadable: {e}")))?;

        let name = record.get(name_col).unwrap_or_default().trim();
        let description = record.get(description_col).unwrap_or_default().trim();
        if name.is_empty() || description.is_empty() {
            // Blank template rows are authoring scratch space.
            continue;
        }

        let sections_raw = record.get(sections_col).unwrap_or_default();
        let transcript_sections = SectionScope::parse(sections_raw).ok_or_else(|| {
            AegisError::config(format!(
                "Category {name} has invalid transcript_sections: {sections_raw}"
            ))
        })?;

        let examples: Vec<String> = example_cols
            .iter()
            .filter_map(|col| record.get(*col))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        categories.push(Category {
            transcript_sections,
            report_section: record.get(report_col).unwrap_or_default().trim().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            examples,
        });
    }

    if categories.is_empty() {
        return Err(AegisError::config(format!(
            "Categories file {} contains no usable rows",
            path.display()
        )));
    }
    Ok(categories)
}

/// Load categories from a YAML list in the same canonical form.
pub fn load_categories_yaml(path: &Path) -> AegisResult<Vec<Category>> {
    #[derive(Deserialize)]
    struct YamlCategory {
        transcript_sections: String,
        #[serde(default)]
        report_section: String,
        category_name: String,
        category_description: String,
        #[serde(default)]
        example_1: Option<String>,
        #[serde(default)]
        example_2: Option<String>,
        #[serde(default)]
        example_3: Option<String>,
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        AegisError::config(format!("Categories file not readable: {} ({e})", path.display()))
    })?;
    let parsed: Vec<YamlCategory> = serde_yaml::from_str(&raw)
        .map_err(|e| AegisError::config(format!("Invalid categories YAML: {e}")))?;

    parsed
        .into_iter()
        .map(|y| {
            let transcript_sections =
                SectionScope::parse(&y.transcript_sections).ok_or_else(|| {
                    AegisError::config(format!(
                        "Category {} has invalid transcript_sections: {}",
                        y.category_name, y.transcript_sections
                    ))
                })?;
            Ok(Category {
                transcript_sections,
                report_section: y.report_section,
                name: y.category_name,
                description: y.category_description,
                examples: [y.example_1, y.example_2, y.example_3]
                    .into_iter()
                    .flatten()
                    .filter(|e| !e.trim().is_empty())
                    .collect(),
            })
        })
        .collect()
}
