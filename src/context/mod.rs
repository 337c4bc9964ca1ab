//! Generation context: the read-only snapshot of a use case that every generator pass reads.
//! Built once per run by the aggregator and shared behind an `Arc`; nothing mutates it afterwards.

pub mod aggregator;

pub use aggregator::ContextAggregator;

use crate::store::FinancialRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resolved identity of whoever asked for the run, as supplied by the auth gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
}

impl CallerIdentity {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role: role.into(),
        }
    }

    /// Identity for runs started from a local shell.
    pub fn local() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
        Self::new(user.clone(), user, "operator")
    }
}

/// Use case fields relevant to generation.
#[derive(Debug, Clone, PartialEq)]
pub struct UseCaseProfile {
    pub id: String,
    pub title: String,
    pub problem_statement: String,
    pub proposed_solution: String,
    pub current_state: String,
    pub desired_state: String,
    pub success_criteria: Vec<String>,
    pub key_assumptions: Vec<String>,
    pub primary_stakeholders: Vec<String>,
    pub secondary_stakeholders: Vec<String>,
    pub confidence_level: f64,
    pub system_criticality: String,
    pub implementation_complexity: String,
}

impl UseCaseProfile {
    pub fn is_public_facing(&self) -> bool {
        self.primary_stakeholders.iter().any(|s| s == "General Public")
    }

    pub fn is_mission_critical(&self) -> bool {
        self.system_criticality == "Mission Critical"
    }
}

/// Sub-assessment results by domain. Missing assessments are empty objects.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSnapshots {
    pub technical: Value,
    pub business: Value,
    pub ethical: Value,
    pub risk: Value,
    pub data: Value,
    pub roadmap: Value,
    pub budget: Value,
    pub compliance: Value,
}

impl Default for AssessmentSnapshots {
    fn default() -> Self {
        let empty = || Value::Object(Default::default());
        Self {
            technical: empty(),
            business: empty(),
            ethical: empty(),
            risk: empty(),
            data: empty(),
            roadmap: empty(),
            budget: empty(),
            compliance: empty(),
        }
    }
}

/// Severity shared by risks, guardrail rules and scenario priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Case-insensitive parse; anything unrecognised is `Medium`.
    pub fn parse(raw: &str) -> Severity {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Scenario weight derived from severity.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 2.0,
            Severity::High => 1.5,
            Severity::Medium | Severity::Low => 1.0,
        }
    }
}

/// One rule of the guardrail configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailRule {
    pub id: String,
    pub rule: String,
    pub description: String,
    pub rule_type: String,
    pub severity: Severity,
    pub enforcement: Option<String>,
}

/// Guardrail configuration the evaluation is generated against.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailSummary {
    pub guardrails_id: String,
    pub configuration: Value,
    pub total_rules: usize,
    pub critical_rules: usize,
    pub rules_by_type: BTreeMap<String, usize>,
    pub enforcement_strategies: Vec<String>,
    pub rules: Vec<GuardrailRule>,
}

impl GuardrailSummary {
    pub fn count_of(&self, rule_type: &str) -> usize {
        self.rules_by_type.get(rule_type).copied().unwrap_or(0)
    }

    /// Rules grouped by type, in type order.
    pub fn rules_grouped(&self) -> BTreeMap<&str, Vec<&GuardrailRule>> {
        let mut groups: BTreeMap<&str, Vec<&GuardrailRule>> = BTreeMap::new();
        for rule in &self.rules {
            groups.entry(rule.rule_type.as_str()).or_default().push(rule);
        }
        groups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Technical,
    Ethical,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedRisk {
    pub category: RiskCategory,
    pub severity: Severity,
    pub description: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    pub identified: Vec<IdentifiedRisk>,
    pub critical_count: usize,
    pub high_count: usize,
    pub residual_risk_level: RiskLevel,
}

impl RiskProfile {
    /// Derive counts and residual level from the identified risks.
    pub fn from_risks(identified: Vec<IdentifiedRisk>) -> Self {
        let critical_count = identified
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .count();
        let high_count = identified
            .iter()
            .filter(|r| r.severity == Severity::High)
            .count();
        let residual_risk_level = if critical_count > 0 {
            RiskLevel::High
        } else if high_count > 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        Self {
            identified,
            critical_count,
            high_count,
            residual_risk_level,
        }
    }

    pub fn has_category(&self, category: RiskCategory) -> bool {
        self.identified.iter().any(|r| r.category == category)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplianceProfile {
    pub frameworks: Vec<String>,
    pub requirements: Vec<String>,
    pub jurisdictions: Vec<String>,
    pub gdpr: bool,
    pub hipaa: bool,
    pub eu_ai_act: bool,
    pub iso_42001: bool,
    pub uae_ai: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceProfile {
    pub response_time_requirement: String,
    pub availability_requirement: String,
    pub concurrent_users: u64,
    pub expected_requests_per_day: u64,
    pub latency_threshold_ms: u64,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            response_time_requirement: "1000ms".to_string(),
            availability_requirement: "99.9%".to_string(),
            concurrent_users: 100,
            expected_requests_per_day: 10_000,
            latency_threshold_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestingHistory {
    pub previous_evaluations: usize,
    pub last_evaluation_date: Option<DateTime<Utc>>,
    pub average_pass_rate: Option<f64>,
    pub common_failure_patterns: Vec<String>,
    pub critical_test_gaps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaturityLevel {
    Initial,
    Developing,
    Intermediate,
    Advanced,
}

impl MaturityLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 8 => MaturityLevel::Advanced,
            s if s >= 5 => MaturityLevel::Intermediate,
            s if s >= 2 => MaturityLevel::Developing,
            _ => MaturityLevel::Initial,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationalContext {
    pub risk_appetite: String,
    pub maturity_level: MaturityLevel,
    pub testing_budget: Option<f64>,
    pub required_coverage: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovalSummary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

/// Immutable input to every generator pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub caller: CallerIdentity,
    pub organization_id: Option<String>,
    pub use_case: UseCaseProfile,
    pub guardrails: GuardrailSummary,
    pub assessments: AssessmentSnapshots,
    pub risks: RiskProfile,
    pub compliance: ComplianceProfile,
    pub performance: PerformanceProfile,
    pub testing: TestingHistory,
    pub organizational: OrganizationalContext,
    pub approvals: ApprovalSummary,
    pub financials: Option<FinancialRecord>,
    pub built_at: DateTime<Utc>,
}

impl GenerationContext {
    pub fn total_guardrail_rules(&self) -> usize {
        self.guardrails.total_rules
    }

    pub fn identified_risks_count(&self) -> usize {
        self.risks.identified.len()
    }

    /// Rough 0-10 measure of how much the context asks of a test plan.
    pub fn complexity(&self) -> f64 {
        let risk = ((self.risks.critical_count * 2 + self.risks.high_count) as f64).min(3.0);
        let compliance = (self.compliance.frameworks.len() as f64).min(3.0);
        let scale = if self.performance.expected_requests_per_day > 10_000 {
            2.0
        } else {
            1.0
        };
        let stakeholders = (self.use_case.primary_stakeholders.len() as f64 / 2.0).min(2.0);
        (risk + compliance + scale + stakeholders).min(10.0)
    }
}
