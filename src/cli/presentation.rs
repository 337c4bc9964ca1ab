//! CLI presentation: text and json formatters per command family.

use crate::cli::CliError;
use crate::job::WatchOutcome;
use crate::service::DirectResponse;
use crate::store::persistence::ImportSummary;
use crate::store::{EvaluationRecord, JobRecord};
use comfy_table::presets::{UTF8_BORDERS_ONLY, UTF8_FULL};
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;

pub fn format_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Input(e.to_string()))
}

pub fn format_import_summary(summary: &ImportSummary) -> String {
    format!(
        "Imported use case {}: {} assessment(s), {} guardrail configuration(s), {} evaluation(s), {} approval(s)",
        summary.use_case_id,
        summary.assessments,
        summary.guardrails,
        summary.evaluations,
        summary.approvals
    )
}

pub fn format_job_text(job: &JobRecord) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Job".to_string(), job.id.clone()]);
    table.add_row(vec!["Use case".to_string(), job.use_case_id.clone()]);
    table.add_row(vec!["Status".to_string(), job.status.to_string()]);
    table.add_row(vec!["Progress".to_string(), format!("{}%", job.progress)]);
    table.add_row(vec!["Step".to_string(), job.current_step.clone()]);
    table.add_row(vec![
        "Strategy".to_string(),
        format!("{} / {}", job.generation_strategy, job.test_intensity),
    ]);
    if job.use_orchestrator {
        table.add_row(vec!["Mode", "multi-agent orchestrator"]);
    }
    table.add_row(vec!["Created".to_string(), job.created_at.to_rfc3339()]);
    if let Some(done) = job.completed_at {
        table.add_row(vec!["Finished".to_string(), done.to_rfc3339()]);
    }
    if let Some(error) = &job.error {
        table.add_row(vec!["Error".to_string(), error.clone()]);
    }
    if let Some(result) = &job.result {
        table.add_row(vec![
            "Evaluation".to_string(),
            result
                .evaluation_id
                .clone()
                .unwrap_or_else(|| "(not saved)".to_string()),
        ]);
        table.add_row(vec![
            "Generated".to_string(),
            format!(
                "{} suite(s), {} scenario(s) via {}",
                result.summary.total_suites,
                result.summary.total_scenarios,
                result.summary.generation_method
            ),
        ]);
    }
    table.to_string()
}

/// One line per observed job update while following a run.
pub fn format_progress_line(job: &JobRecord) -> String {
    format!("[{:>3}%] {}", job.progress, job.current_step)
}

pub fn format_watch_outcome(outcome: &WatchOutcome) -> String {
    match outcome {
        WatchOutcome::Finished(job) => format_job_text(job),
        WatchOutcome::Stalled { record, idle } => format!(
            "{}\nNo progress for {}s; the run may have been interrupted.",
            format_job_text(record),
            idle.as_secs()
        ),
    }
}

pub fn format_direct_text(response: &DirectResponse) -> String {
    let summary = &response.summary;
    let mut out = match &response.evaluation_id {
        Some(id) => format!("Saved evaluation {}\n", id),
        None => "Evaluation generated but not saved\n".to_string(),
    };
    out.push_str(&format!(
        "{} suite(s), {} scenario(s), confidence {:.2}, method {}\n",
        summary.total_suites, summary.total_scenarios, summary.confidence, summary.generation_method
    ));
    out.push_str(&format!(
        "Estimated run time: {}s\n",
        summary.estimated_duration / 1000
    ));
    out.push_str(&suites_table(&response.evaluation_config));
    out
}

pub fn format_evaluation_text(record: &EvaluationRecord) -> String {
    let mut out = format!(
        "{} ({})\nUse case: {}\nStatus: {}\nCreated: {}\n",
        record.name,
        record.id,
        record.use_case_id,
        record.status,
        record.created_at.to_rfc3339()
    );
    if !record.description.is_empty() {
        out.push_str(&format!("{}\n", record.description));
    }
    out.push_str(&suites_table(&record.configuration));
    out
}

fn suites_table(configuration: &Value) -> String {
    let suites = configuration
        .get("testSuites")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if suites.is_empty() {
        return "No test suites.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Suite", "Type", "Priority", "Scenarios"]);
    for suite in suites {
        let text = |key: &str| {
            suite
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        };
        let scenarios = suite
            .get("scenarios")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        table.add_row(vec![
            text("name"),
            text("type"),
            text("priority"),
            scenarios.to_string(),
        ]);
    }
    table.to_string()
}
