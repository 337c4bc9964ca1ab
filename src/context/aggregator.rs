//! Context aggregator: reads a use case's assessment graph and folds it into one
//! [`GenerationContext`]. Read-only; no provider calls.

use crate::context::{
    ApprovalSummary, AssessmentSnapshots, CallerIdentity, ComplianceProfile, GenerationContext,
    GuardrailRule, GuardrailSummary, IdentifiedRisk, MaturityLevel, OrganizationalContext,
    PerformanceProfile, RiskCategory, RiskProfile, Severity, TestingHistory, UseCaseProfile,
};
use crate::error::GenerationError;
use crate::store::{
    ApprovalRecord, AssessmentRecord, AssessmentSource, EvaluationRecord, GuardrailRecord,
    UseCaseRecord,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Categories checked for gaps in prior test runs.
const TEST_CATEGORIES: [&str; 6] = [
    "safety",
    "performance",
    "compliance",
    "ethics",
    "security",
    "cost",
];

/// How many completed evaluations feed the testing history.
const HISTORY_DEPTH: usize = 10;

pub struct ContextAggregator {
    source: Arc<dyn AssessmentSource>,
}

impl ContextAggregator {
    pub fn new(source: Arc<dyn AssessmentSource>) -> Self {
        Self { source }
    }

    /// Build the context for one run.
    ///
    /// Fails with `NotFound` when the use case does not exist and with `DependencyMissing`
    /// when no guardrail configuration is available. Missing sub-assessments are tolerated.
    pub fn build_context(
        &self,
        use_case_id: &str,
        guardrails_id: Option<&str>,
        caller: &CallerIdentity,
    ) -> Result<Arc<GenerationContext>, GenerationError> {
        let use_case = self
            .source
            .use_case(use_case_id)?
            .ok_or_else(|| GenerationError::NotFound(format!("use case {}", use_case_id)))?;

        let guardrail = match guardrails_id {
            Some(id) => self.source.guardrail(id)?,
            None => self.source.latest_guardrail(use_case_id)?,
        };
        let guardrail = guardrail
            .filter(|g| !g.configuration.is_null())
            .ok_or_else(|| {
                GenerationError::DependencyMissing(format!(
                    "guardrails must be generated for use case {} before evaluations",
                    use_case_id
                ))
            })?;

        let assessments = classify_assessments(&self.source.assessments(use_case_id)?);
        let evaluations = self.source.evaluations(use_case_id)?;
        let approvals = summarize_approvals(&self.source.approvals(use_case_id)?);
        let financials = self.source.financials(use_case_id)?;

        let risks = analyze_risks(&assessments);
        let compliance = extract_compliance(&assessments);
        let performance = extract_performance(&assessments);
        let testing = testing_history(&evaluations);
        let organizational = organizational_context(&assessments, evaluations.len());
        let guardrails = process_guardrails(&guardrail);

        let context = GenerationContext {
            caller: caller.clone(),
            organization_id: use_case.organization_id.clone(),
            use_case: use_case_profile(&use_case, &assessments),
            guardrails,
            assessments,
            risks,
            compliance,
            performance,
            testing,
            organizational,
            approvals,
            financials,
            built_at: Utc::now(),
        };

        info!(
            use_case_id,
            guardrails = context.total_guardrail_rules(),
            risks = context.identified_risks_count(),
            "Generation context built"
        );
        Ok(Arc::new(context))
    }
}

/// JavaScript-style truthiness, used where assessment answers are loosely typed.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn positive_u64(value: &Value, key: &str) -> Option<u64> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| *n > 0.0)
        .map(|n| n as u64)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert(i.clone()))
        .collect()
}

/// Assign each assessment to a domain by case-insensitive substring of its type.
/// Later assessments of the same domain replace earlier ones.
fn classify_assessments(records: &[AssessmentRecord]) -> AssessmentSnapshots {
    let mut snapshots = AssessmentSnapshots::default();
    for record in records {
        let kind = record.assessment_type.to_lowercase();
        let slot = if kind.contains("technical") {
            &mut snapshots.technical
        } else if kind.contains("business") {
            &mut snapshots.business
        } else if kind.contains("ethical") || kind.contains("ethics") {
            &mut snapshots.ethical
        } else if kind.contains("risk") {
            &mut snapshots.risk
        } else if kind.contains("data") {
            &mut snapshots.data
        } else if kind.contains("roadmap") {
            &mut snapshots.roadmap
        } else if kind.contains("budget") {
            &mut snapshots.budget
        } else if kind.contains("compliance") {
            &mut snapshots.compliance
        } else {
            debug!(assessment_type = %record.assessment_type, "Ignoring unclassified assessment");
            continue;
        };
        if record.results.is_object() {
            *slot = record.results.clone();
        }
    }
    snapshots
}

fn use_case_profile(use_case: &UseCaseRecord, assessments: &AssessmentSnapshots) -> UseCaseProfile {
    UseCaseProfile {
        id: use_case.id.clone(),
        title: use_case.title.clone(),
        problem_statement: use_case.problem_statement.clone(),
        proposed_solution: use_case.proposed_solution.clone(),
        current_state: use_case.current_state.clone(),
        desired_state: use_case.desired_state.clone(),
        success_criteria: use_case.success_criteria.clone(),
        key_assumptions: use_case.key_assumptions.clone(),
        primary_stakeholders: use_case.primary_stakeholders.clone(),
        secondary_stakeholders: use_case.secondary_stakeholders.clone(),
        confidence_level: use_case.confidence_level,
        system_criticality: non_empty_str(&assessments.business, "systemCriticality")
            .unwrap_or("Standard")
            .to_string(),
        implementation_complexity: use_case
            .implementation_complexity
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Medium".to_string()),
    }
}

fn risk_entry(category: RiskCategory, severity: Severity, entry: &Value) -> IdentifiedRisk {
    IdentifiedRisk {
        category,
        severity,
        description: non_empty_str(entry, "risk")
            .or_else(|| non_empty_str(entry, "description"))
            .unwrap_or_default()
            .to_string(),
        mitigation: non_empty_str(entry, "mitigation")
            .unwrap_or_default()
            .to_string(),
    }
}

fn analyze_risks(assessments: &AssessmentSnapshots) -> RiskProfile {
    let mut risks = Vec::new();

    if let Some(items) = assessments.risk.get("technicalRisks").and_then(Value::as_array) {
        for item in items {
            let severity = Severity::parse(non_empty_str(item, "impact").unwrap_or("medium"));
            risks.push(risk_entry(RiskCategory::Technical, severity, item));
        }
    }

    if let Some(items) = assessments.ethical.get("ethicalRisks").and_then(Value::as_array) {
        for item in items {
            let severity = Severity::parse(non_empty_str(item, "severity").unwrap_or("medium"));
            risks.push(risk_entry(RiskCategory::Ethical, severity, item));
        }
    }

    if let Some(model_risks) = assessments.risk.get("modelRisks").and_then(Value::as_object) {
        for (name, level) in model_risks {
            if !truthy(Some(level)) || level.as_str() == Some("Low") {
                continue;
            }
            let severity = match level.as_str() {
                Some("High") => Severity::Critical,
                Some("Medium") => Severity::High,
                _ => Severity::Medium,
            };
            risks.push(IdentifiedRisk {
                category: RiskCategory::Model,
                severity,
                description: name.clone(),
                mitigation: format!("Monitor and mitigate {}", name),
            });
        }
    }

    RiskProfile::from_risks(risks)
}

fn extract_compliance(assessments: &AssessmentSnapshots) -> ComplianceProfile {
    let mut profile = ComplianceProfile::default();
    let mut frameworks = Vec::new();
    let mut jurisdictions = Vec::new();
    let mut requirements = Vec::new();

    if let Some(protection) = assessments.risk.get("dataProtection") {
        if truthy(protection.get("gdprCompliant")) {
            profile.gdpr = true;
            frameworks.push("GDPR".to_string());
            jurisdictions.push("EU".to_string());
        }
        if truthy(protection.get("hipaaCompliant")) {
            profile.hipaa = true;
            frameworks.push("HIPAA".to_string());
            jurisdictions.push("US".to_string());
        }
        jurisdictions.extend(string_list(protection, "jurisdictions"));
    }

    let compliance = &assessments.compliance;
    if truthy(compliance.get("euAiAct")) {
        profile.eu_ai_act = true;
        frameworks.push("EU AI Act".to_string());
    }
    if truthy(compliance.get("iso42001")) {
        profile.iso_42001 = true;
        frameworks.push("ISO 42001".to_string());
    }
    if truthy(compliance.get("uaeAi")) {
        profile.uae_ai = true;
        frameworks.push("UAE AI Regulation".to_string());
    }
    requirements.extend(string_list(compliance, "requirements"));

    profile.frameworks = dedup(frameworks);
    profile.requirements = dedup(requirements);
    profile.jurisdictions = dedup(jurisdictions);
    profile
}

fn extract_performance(assessments: &AssessmentSnapshots) -> PerformanceProfile {
    let defaults = PerformanceProfile::default();
    let business = &assessments.business;
    let technical = &assessments.technical;
    PerformanceProfile {
        response_time_requirement: non_empty_str(business, "responseTimeRequirement")
            .map(str::to_string)
            .unwrap_or(defaults.response_time_requirement),
        availability_requirement: non_empty_str(business, "availabilityRequirement")
            .map(str::to_string)
            .unwrap_or(defaults.availability_requirement),
        concurrent_users: positive_u64(business, "concurrentUsers")
            .unwrap_or(defaults.concurrent_users),
        expected_requests_per_day: positive_u64(technical, "expectedRequestsPerDay")
            .unwrap_or(defaults.expected_requests_per_day),
        latency_threshold_ms: positive_u64(technical, "latencyThreshold")
            .unwrap_or(defaults.latency_threshold_ms),
    }
}

fn testing_history(evaluations: &[EvaluationRecord]) -> TestingHistory {
    let completed: Vec<&EvaluationRecord> = evaluations
        .iter()
        .filter(|e| e.status == "completed")
        .take(HISTORY_DEPTH)
        .collect();

    if completed.is_empty() {
        return TestingHistory::default();
    }

    let mut total_tests = 0u64;
    let mut passed_tests = 0u64;
    let mut failures: HashMap<&str, usize> = HashMap::new();
    let mut by_category: HashMap<&str, (usize, usize)> = HashMap::new();

    for evaluation in &completed {
        if let Some(summary) = &evaluation.summary {
            total_tests += summary.total_tests;
            passed_tests += summary.passed;
        }
        for result in &evaluation.results {
            let category = result.category.as_deref();
            if let (false, Some(c)) = (result.passed, category) {
                *failures.entry(c).or_default() += 1;
            }
            let slot = by_category.entry(category.unwrap_or("unknown")).or_default();
            slot.0 += 1;
            if result.passed {
                slot.1 += 1;
            }
        }
    }

    let mut patterns: Vec<(&str, usize)> = failures.into_iter().collect();
    patterns.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let gaps = TEST_CATEGORIES
        .iter()
        .filter_map(|category| match by_category.get(category) {
            None | Some((0, _)) => Some(format!("No {} tests found", category)),
            Some((total, passed)) if (*passed as f64) / (*total as f64) < 0.5 => {
                Some(format!("Low pass rate in {} tests", category))
            }
            _ => None,
        })
        .collect();

    TestingHistory {
        previous_evaluations: completed.len(),
        last_evaluation_date: completed.first().map(|e| e.created_at),
        average_pass_rate: Some(if total_tests > 0 {
            passed_tests as f64 / total_tests as f64 * 100.0
        } else {
            0.0
        }),
        common_failure_patterns: patterns
            .into_iter()
            .take(5)
            .map(|(c, _)| c.to_string())
            .collect(),
        critical_test_gaps: gaps,
    }
}

fn organizational_context(
    assessments: &AssessmentSnapshots,
    evaluation_count: usize,
) -> OrganizationalContext {
    let risk_appetite = non_empty_str(&assessments.risk, "riskAppetite")
        .or_else(|| non_empty_str(&assessments.business, "riskTolerance"))
        .unwrap_or("moderate")
        .to_string();

    let technical = &assessments.technical;
    let mut score = 0u32;
    if technical
        .get("existingAISystems")
        .and_then(Value::as_f64)
        .map(|n| n > 0.0)
        .unwrap_or(false)
    {
        score += 2;
    }
    if truthy(technical.get("mlOpsCapability")) {
        score += 2;
    }
    if technical.get("dataQuality").and_then(Value::as_str) == Some("high") {
        score += 1;
    }
    if truthy(assessments.business.get("governanceStructure")) {
        score += 2;
    }
    if truthy(assessments.risk.get("riskManagementProcess")) {
        score += 1;
    }
    if evaluation_count > 5 {
        score += 2;
    }

    let required_coverage = match risk_appetite.as_str() {
        "low" => 95,
        "high" => 70,
        _ => 85,
    };

    OrganizationalContext {
        risk_appetite,
        maturity_level: MaturityLevel::from_score(score),
        testing_budget: assessments
            .business
            .get("testingBudget")
            .and_then(Value::as_f64)
            .filter(|b| *b != 0.0),
        required_coverage,
    }
}

fn summarize_approvals(approvals: &[ApprovalRecord]) -> ApprovalSummary {
    let mut summary = ApprovalSummary {
        total: approvals.len(),
        ..Default::default()
    };
    for approval in approvals {
        match approval.status.to_lowercase().as_str() {
            "approved" => summary.approved += 1,
            "rejected" => summary.rejected += 1,
            _ => summary.pending += 1,
        }
    }
    summary
}

/// Flatten `guardrails.rules.{category: [rule]}` into typed rules and counts.
fn process_guardrails(record: &GuardrailRecord) -> GuardrailSummary {
    let mut rules = Vec::new();
    let mut rules_by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut enforcement = Vec::new();

    let categories = record
        .configuration
        .get("guardrails")
        .and_then(|g| g.get("rules"))
        .and_then(Value::as_object);

    if let Some(categories) = categories {
        for (category, entries) in categories {
            let Some(entries) = entries.as_array() else {
                continue;
            };
            for (index, entry) in entries.iter().enumerate() {
                let rule_type = non_empty_str(entry, "type").unwrap_or(category).to_string();
                *rules_by_type.entry(rule_type.clone()).or_default() += 1;

                let enforced = entry
                    .get("implementation")
                    .and_then(|i| non_empty_str(i, "enforcement"))
                    .map(str::to_string);
                if let Some(e) = &enforced {
                    enforcement.push(e.clone());
                }

                rules.push(GuardrailRule {
                    id: non_empty_str(entry, "id")
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{}-{}", category, index + 1)),
                    rule: non_empty_str(entry, "rule").unwrap_or_default().to_string(),
                    description: non_empty_str(entry, "description")
                        .unwrap_or_default()
                        .to_string(),
                    rule_type,
                    severity: Severity::parse(
                        non_empty_str(entry, "severity").unwrap_or("medium"),
                    ),
                    enforcement: enforced,
                });
            }
        }
    }

    GuardrailSummary {
        guardrails_id: record.id.clone(),
        configuration: record.configuration.clone(),
        total_rules: rules.len(),
        critical_rules: rules
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .count(),
        rules_by_type,
        enforcement_strategies: dedup(enforcement),
        rules,
    }
}
