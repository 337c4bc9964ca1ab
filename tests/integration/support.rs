//! Shared fixtures: a scripted completion provider and a seeded record store.

use async_trait::async_trait;
use chrono::Utc;
use guardgen::error::ProviderError;
use guardgen::pipeline::Generator;
use guardgen::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, MessageRole, ModelProviderClient,
    StructuredCompleter, TokenUsage,
};
use guardgen::store::persistence::UseCaseBundle;
use guardgen::store::{AssessmentRecord, GuardrailRecord, SledStore, UseCaseRecord};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Script = Box<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>;

/// Completion provider answering each call from its user prompt.
pub struct ScriptedProvider {
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Three distinct scenarios per call, in whichever list field the prompt asks for.
    pub fn answering() -> Self {
        Self::new(|prompt| Ok(scenarios_for(prompt, 3)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = (self.script)(&prompt)?;
        Ok(CompletionResponse {
            content,
            model: "scripted-model".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

/// A response body with `count` scenarios unique to `prompt`.
pub fn scenarios_for(prompt: &str, count: usize) -> String {
    let field = if prompt.contains("\"testScenarios\"") {
        "testScenarios"
    } else {
        "scenarios"
    };
    let tag = format!("{:x}", prompt.len());
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "name": format!("case {} {}", tag, i),
                "testInput": format!("probe {} {}", tag, i),
                "expectedBehavior": "Refuses and explains the policy",
                "priority": "high",
                "assertions": ["Response is blocked"],
                "tags": ["integration"]
            })
        })
        .collect();
    json!({ field: items }).to_string()
}

pub fn generator(provider: Arc<ScriptedProvider>) -> Generator {
    Generator::new(
        StructuredCompleter::new(provider, CompletionOptions::default())
            .with_retry(1, Duration::from_millis(10)),
    )
}

pub fn use_case(id: &str) -> UseCaseRecord {
    UseCaseRecord {
        id: id.to_string(),
        organization_id: Some("org-7".to_string()),
        title: "Claims Triage Assistant".to_string(),
        problem_statement: "Manual claim routing is slow".to_string(),
        proposed_solution: "Model-assisted routing with human review".to_string(),
        current_state: "Adjusters read every claim".to_string(),
        desired_state: "Routine claims routed automatically".to_string(),
        success_criteria: vec!["Routing accuracy above 95%".to_string()],
        key_assumptions: Vec::new(),
        primary_stakeholders: vec!["Claims Adjusters".to_string()],
        secondary_stakeholders: Vec::new(),
        confidence_level: 0.6,
        implementation_complexity: Some("medium".to_string()),
        created_at: Utc::now(),
    }
}

pub fn guardrails(id: &str, use_case_id: &str) -> GuardrailRecord {
    GuardrailRecord {
        id: id.to_string(),
        use_case_id: use_case_id.to_string(),
        configuration: json!({
            "guardrails": { "rules": {
                "critical": [
                    { "id": "cs-1", "type": "content_safety", "severity": "critical",
                      "rule": "Block abusive content",
                      "implementation": { "enforcement": "block" } },
                    { "id": "pii-1", "type": "data_protection", "severity": "critical",
                      "rule": "Never reveal claimant personal data" }
                ],
                "operational": [
                    { "id": "ab-1", "type": "agent_behavior", "severity": "high",
                      "rule": "Escalate disputed claims to a human" }
                ]
            }}
        }),
        created_at: Utc::now(),
    }
}

pub fn risk_assessment(use_case_id: &str) -> AssessmentRecord {
    AssessmentRecord {
        id: format!("risk-{}", use_case_id),
        use_case_id: use_case_id.to_string(),
        assessment_type: "risk".to_string(),
        results: json!({
            "technicalRisks": [
                { "risk": "Misrouted high-value claims", "impact": "high",
                  "mitigation": "Human review above a value threshold" }
            ],
            "dataProtection": { "gdprCompliant": true }
        }),
        created_at: Utc::now(),
    }
}

pub fn ethical_assessment(use_case_id: &str) -> AssessmentRecord {
    AssessmentRecord {
        id: format!("ethics-{}", use_case_id),
        use_case_id: use_case_id.to_string(),
        assessment_type: "ethical".to_string(),
        results: json!({
            "ethicalRisks": [
                { "risk": "Unequal treatment of claimants", "severity": "critical" }
            ]
        }),
        created_at: Utc::now(),
    }
}

/// Use case, risk and ethical assessments and one guardrail configuration.
pub fn bundle(use_case_id: &str) -> UseCaseBundle {
    UseCaseBundle {
        use_case: use_case(use_case_id),
        assessments: vec![risk_assessment(use_case_id), ethical_assessment(use_case_id)],
        guardrails: vec![guardrails(&format!("g-{}", use_case_id), use_case_id)],
        evaluations: Vec::new(),
        approvals: Vec::new(),
        financials: None,
    }
}

/// Temporary store holding [`bundle`] for `use_case_id`.
pub fn seeded_store(use_case_id: &str) -> Arc<SledStore> {
    let store = SledStore::temporary().unwrap();
    store.import_bundle(&bundle(use_case_id)).unwrap();
    Arc::new(store)
}
