//! Request-scoped types shared by every stage of the extraction pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extraction::PipelineError;

pub use crate::llm_client::TokenUsage;

/// Which prompt and output schema apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    DataRelevant,
    SoftwareEngineer,
    General,
}

const COMMON_HEAD: &[&str] = &[
    "Company",
    "Industry",
    "Citizenship",
    "Visa_policy",
    "JobType",
    "YoE_year",
    "YoE_level",
];
const COMMON_TAIL: &[&str] = &["Domain_Knowledge", "Min_Education"];

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [
        RoleKind::DataRelevant,
        RoleKind::SoftwareEngineer,
        RoleKind::General,
    ];

    /// The name shown to end users and accepted at the API boundary.
    pub fn display_name(self) -> &'static str {
        match self {
            RoleKind::DataRelevant => "Data relevant",
            RoleKind::SoftwareEngineer => "Software Engineer",
            RoleKind::General => "General",
        }
    }

    /// Role-specific keys inserted between the common head and tail.
    fn extra_keys(self) -> &'static [&'static str] {
        match self {
            RoleKind::DataRelevant => &["DS_skills"],
            RoleKind::SoftwareEngineer => &["Languages", "SE_skills"],
            RoleKind::General => &[],
        }
    }

    /// Exact key set, in order, the model is instructed to emit for this role.
    pub fn schema_keys(self) -> Vec<&'static str> {
        COMMON_HEAD
            .iter()
            .chain(self.extra_keys())
            .chain(COMMON_TAIL)
            .copied()
            .collect()
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for RoleKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "data relevant" | "data_relevant" | "datarelevant" => Ok(RoleKind::DataRelevant),
            "software engineer" | "software_engineer" | "softwareengineer" => {
                Ok(RoleKind::SoftwareEngineer)
            }
            "general" => Ok(RoleKind::General),
            _ => Err(PipelineError::InvalidArgument(format!(
                "'{s}' is not a valid role. Choose from {:?}.",
                RoleKind::ALL.map(RoleKind::display_name)
            ))),
        }
    }
}

/// Priced quality tier. Selects both the provider model and the rate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Fast,
    Advanced,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Fast, ModelKind::Advanced];

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Fast => "GPT-3.5",
            ModelKind::Advanced => "GPT-4",
        }
    }

    /// Model identifier sent to the provider.
    pub fn api_model(self) -> &'static str {
        match self {
            ModelKind::Fast => "gpt-3.5-turbo",
            ModelKind::Advanced => "gpt-4",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "gpt-3.5" | "fast" => Ok(ModelKind::Fast),
            "gpt-4" | "advanced" => Ok(ModelKind::Advanced),
            _ => Err(PipelineError::InvalidArgument(format!(
                "'{s}' is not a valid model. Choose from {:?}.",
                ModelKind::ALL.map(ModelKind::display_name)
            ))),
        }
    }
}

fn normalize_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// Classification tag returned alongside the field mapping. `None` means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTag {
    Flagged,
    NotJob,
    NotJson,
}

impl ExtractionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionTag::Flagged => "flagged",
            ExtractionTag::NotJob => "not_job",
            ExtractionTag::NotJson => "not_json",
        }
    }
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// Moderation rejected the input; nothing was billed.
    Flagged,
    NotAJobDescription { cost: f64 },
    Malformed { cost: f64 },
    Success { fields: Map<String, Value>, cost: f64 },
}

impl ExtractionResult {
    pub fn cost(&self) -> f64 {
        match self {
            ExtractionResult::Flagged => 0.0,
            ExtractionResult::NotAJobDescription { cost }
            | ExtractionResult::Malformed { cost }
            | ExtractionResult::Success { cost, .. } => *cost,
        }
    }

    pub fn tag(&self) -> Option<ExtractionTag> {
        match self {
            ExtractionResult::Flagged => Some(ExtractionTag::Flagged),
            ExtractionResult::NotAJobDescription { .. } => Some(ExtractionTag::NotJob),
            ExtractionResult::Malformed { .. } => Some(ExtractionTag::NotJson),
            ExtractionResult::Success { .. } => None,
        }
    }

    /// Flattens into the caller-facing pair: field mapping with `cost` added, plus tag.
    pub fn into_outcome(self) -> ExtractionOutcome {
        let cost = self.cost();
        let info = self.tag();
        let mut result = match self {
            ExtractionResult::Success { fields, .. } => fields,
            _ => Map::new(),
        };
        result.insert("cost".to_string(), Value::from(cost));
        ExtractionOutcome { result, info }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub result: Map<String, Value>,
    pub info: Option<ExtractionTag>,
}
