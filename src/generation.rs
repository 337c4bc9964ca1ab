//! Evaluation generation: strategy knobs, the evaluation configuration produced by a run,
//! and the staged [`GenerationEngine`] that fills it.
//!
//! Optional fields are `Option`s so that converting a result to a [`Document`] marks them
//! `Undefined`; the sanitizer removes them before the artifact is stored.

pub mod engine;
pub mod parse;
pub mod plan;
pub mod prompts;

pub use engine::GenerationEngine;

use crate::context::Severity;
use crate::document::Document;
use crate::error::{GenerationError, StorageError};
use crate::orchestrator::{AgentReport, CoverageReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Default wall-clock budget for one generation run.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Comprehensive,
    Targeted,
    Rapid,
}

impl StrategyType {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyType::Comprehensive => "comprehensive",
            StrategyType::Targeted => "targeted",
            StrategyType::Rapid => "rapid",
        }
    }
}

impl FromStr for StrategyType {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(StrategyType::Comprehensive),
            "targeted" | "focused" => Ok(StrategyType::Targeted),
            "rapid" => Ok(StrategyType::Rapid),
            other => Err(GenerationError::InvalidRequest(format!(
                "unknown generation strategy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Light,
    Standard,
    Thorough,
}

impl Intensity {
    pub fn as_str(self) -> &'static str {
        match self {
            Intensity::Light => "light",
            Intensity::Standard => "standard",
            Intensity::Thorough => "thorough",
        }
    }

    pub fn max_tests_per_suite(self) -> usize {
        match self {
            Intensity::Light => 5,
            Intensity::Standard => 10,
            Intensity::Thorough => 20,
        }
    }

    /// Scenarios requested per domain prompt before the domain multiplier.
    pub fn domain_base_count(self) -> f64 {
        match self {
            Intensity::Light => 3.0,
            Intensity::Standard => 8.0,
            Intensity::Thorough => 15.0,
        }
    }
}

impl FromStr for Intensity {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Intensity::Light),
            "standard" => Ok(Intensity::Standard),
            "thorough" => Ok(Intensity::Thorough),
            other => Err(GenerationError::InvalidRequest(format!(
                "unknown test intensity '{}'",
                other
            ))),
        }
    }
}

/// Caller-supplied knobs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStrategy {
    pub strategy_type: StrategyType,
    pub intensity: Intensity,
    pub focus_areas: Option<Vec<String>>,
    /// Upper bound on every suite's scenario count.
    pub max_tests_per_suite: usize,
    /// Upper bound on total generation wall-time.
    pub time_limit: Duration,
}

impl GenerationStrategy {
    pub fn new(strategy_type: StrategyType, intensity: Intensity) -> Self {
        Self {
            strategy_type,
            intensity,
            focus_areas: None,
            max_tests_per_suite: intensity.max_tests_per_suite(),
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    /// Parse the string pair stored on job records.
    pub fn parse(strategy: &str, intensity: &str) -> Result<Self, GenerationError> {
        Ok(Self::new(strategy.parse()?, intensity.parse()?))
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_focus_areas(mut self, areas: Vec<String>) -> Self {
        self.focus_areas = if areas.is_empty() { None } else { Some(areas) };
        self
    }

    pub fn with_max_tests_per_suite(mut self, max: usize) -> Self {
        self.max_tests_per_suite = max;
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_tests_per_suite == 0 {
            return Err(GenerationError::InvalidRequest(
                "maxTestsPerSuite must be positive".to_string(),
            ));
        }
        if self.time_limit.is_zero() {
            return Err(GenerationError::InvalidRequest(
                "timeLimitSeconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn includes_focus(&self, area: &str) -> bool {
        self.focus_areas
            .as_ref()
            .map(|areas| areas.iter().any(|a| a.eq_ignore_ascii_case(area)))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInput {
    #[serde(rename = "type")]
    pub input_type: String,
    pub value: String,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutput {
    /// `pass`, `block`, `behavior`, or a pass-specific kind.
    #[serde(rename = "type")]
    pub output_type: String,
    pub value: String,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(rename = "type")]
    pub assertion_type: String,
    pub condition: String,
    pub expected: bool,
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub unit: Option<String>,
}

impl Metric {
    pub fn gauge(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            metric_type: "gauge".to_string(),
            unit: Some(unit.to_string()),
        }
    }

    pub fn counter(name: &str) -> Self {
        Self {
            name: name.to_string(),
            metric_type: "counter".to_string(),
            unit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub guardrail_id: Option<String>,
    pub inputs: Vec<ScenarioInput>,
    pub expected_outputs: Vec<ExpectedOutput>,
    pub assertions: Vec<Assertion>,
    pub metrics: Vec<Metric>,
    pub weight: f64,
    pub priority: Severity,
    pub tags: Vec<String>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Scenario {
    pub fn input_text(&self) -> &str {
        self.inputs.first().map(|i| i.value.as_str()).unwrap_or("")
    }

    pub fn expected_type(&self) -> &str {
        self.expected_outputs
            .first()
            .map(|o| o.output_type.as_str())
            .unwrap_or("")
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteCoverage {
    pub guardrails_covered: usize,
    pub guardrails_total: usize,
    pub percentage: f64,
    pub by_type: BTreeMap<String, usize>,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteMetadata {
    pub generated_by: String,
    pub synthesized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub suite_type: String,
    pub priority: Severity,
    pub scenarios: Vec<Scenario>,
    pub coverage: SuiteCoverage,
    pub metadata: Option<SuiteMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub excellent: u8,
    pub good: u8,
    pub acceptable: u8,
    pub poor: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub weight: f64,
    pub metrics: Vec<String>,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalCondition {
    pub condition: String,
    pub severity: String,
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCriteria {
    pub dimensions: Vec<Dimension>,
    pub weighting_strategy: String,
    pub minimum_pass_threshold: u8,
    pub critical_failure_conditions: Vec<CriticalCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSettings {
    pub mock_responses: bool,
    pub deterministic_mode: bool,
    pub real_data: bool,
    pub ai_agents_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Environment {
    pub name: String,
    #[serde(rename = "type")]
    pub environment_type: String,
    pub configuration: EnvironmentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStage {
    pub percentage: u8,
    pub duration: String,
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressiveRollout {
    pub enabled: bool,
    pub stages: Vec<RolloutStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureHandling {
    pub strategy: String,
    pub max_retries: u32,
    pub backoff_multiplier: u32,
    pub alert_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStrategy {
    pub mode: String,
    pub parallelism: u32,
    pub prioritization: String,
    pub environments: Vec<Environment>,
    pub progressive_rollout: Option<ProgressiveRollout>,
    pub failure_handling: FailureHandling,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallScore {
    pub value: f64,
    pub grade: String,
    pub trend: String,
    pub recommendation: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceFactor {
    pub factor: String,
    pub impact: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfidence {
    pub overall: f64,
    pub by_dimension: BTreeMap<String, f64>,
    pub factors: Vec<ConfidenceFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringFramework {
    pub algorithm: String,
    pub score_ranges: BTreeMap<String, [u8; 2]>,
    pub dimension_scores: BTreeMap<String, f64>,
    pub overall_score: OverallScore,
    pub confidence: ScoringConfidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub generated_by: Vec<String>,
    pub strategy: Option<String>,
    pub intensity: Option<String>,
    pub context_complexity: Option<f64>,
    pub total_scenarios: usize,
    /// Milliseconds.
    pub estimated_duration: u64,
    pub llm_model: Option<String>,
    pub generation_cost: Option<f64>,
    pub orchestrated: Option<bool>,
    pub coverage: Option<CoverageReport>,
    pub confidence: Option<f64>,
    pub agents: Option<Vec<AgentReport>>,
    pub conflicts: Option<usize>,
    pub resolutions: Option<usize>,
}

/// The evaluation configuration a run produces, whichever generator produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: String,
    pub use_case_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub test_suites: Vec<TestSuite>,
    pub evaluation_criteria: EvaluationCriteria,
    pub execution_strategy: ExecutionStrategy,
    pub scoring_framework: ScoringFramework,
    pub metadata: ResultMetadata,
}

impl GenerationResult {
    pub fn total_scenarios(&self) -> usize {
        self.test_suites.iter().map(|s| s.scenarios.len()).sum()
    }

    /// Document form for sanitizing and storage. Absent optionals become `Undefined`.
    pub fn to_document(&self) -> Result<Document, StorageError> {
        Document::from_serialize(self)
    }
}

/// Title-case a snake_case identifier: `content_safety` -> `Content Safety`.
pub fn format_type_name(raw: &str) -> String {
    raw.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Priority ordering used to sort suites: critical first.
pub fn priority_rank(priority: Severity) -> u8 {
    match priority {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
    }
}
