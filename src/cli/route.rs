//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::parse::{
    Commands, ConfigCommands, EvaluationCommands, GenerationArgs, JobCommands, UseCaseCommands,
};
use crate::cli::presentation::{
    format_direct_text, format_evaluation_text, format_import_summary, format_job_text,
    format_json, format_progress_line, format_watch_outcome,
};
use crate::cli::CliError;
use crate::config::{ConfigLoader, GuardgenConfig};
use crate::context::{CallerIdentity, ContextAggregator};
use crate::error::SetupError;
use crate::job::{ExecutionMode, JobController, JobRequest, JobWatcher, StartOutcome};
use crate::pipeline::Generator;
use crate::service::{DirectRequest, GenerationService};
use crate::store::persistence::UseCaseBundle;
use crate::store::{JobRecord, SledStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runtime context for CLI execution: effective config, the store and the services built
/// on it. Built from the workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: GuardgenConfig,
    store: Arc<SledStore>,
    controller: JobController,
    service: GenerationService,
    caller: CallerIdentity,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        }
        .validated()?;

        let store_path = resolve_store_path(&workspace_root, &config.storage.path);
        let store = Arc::new(SledStore::open(&store_path).map_err(SetupError::from)?);
        info!(store = %store_path.display(), "Store opened");

        let generator = Generator::from_config(&config)
            .map_err(|e| SetupError::Config(format!("Failed to build provider client: {}", e)))?;
        if generator.is_none() {
            warn!(
                provider = config.provider.provider_type.as_str(),
                "No provider credentials; generation commands will fail"
            );
        }

        let aggregator = Arc::new(ContextAggregator::new(store.clone()));
        let controller = JobController::new(
            store.clone(),
            store.clone(),
            aggregator.clone(),
            generator.clone(),
            config.generation.job_settings(),
        );
        let service = GenerationService::new(
            aggregator,
            store.clone(),
            generator,
            config.generation.direct_time_limit(),
        )
        .with_max_tests_per_suite(config.generation.max_tests_per_suite);

        Ok(Self {
            config,
            store,
            controller,
            service,
            caller: CallerIdentity::local(),
        })
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, CliError> {
        let output = match command {
            Commands::Usecase { command } => self.handle_usecase(command),
            Commands::Job { command } => self.handle_job(command).await,
            Commands::Generate {
                target,
                focus,
                format,
            } => self.handle_generate(target, focus, format).await,
            Commands::Evaluation { command } => self.handle_evaluation(command),
            Commands::Config { command } => self.handle_config(command),
        };
        if let Err(err) = self.store.flush() {
            warn!(error = %err, "Store flush failed");
        }
        output
    }

    fn handle_usecase(&self, command: &UseCaseCommands) -> Result<String, CliError> {
        match command {
            UseCaseCommands::Import { file } => {
                let raw = std::fs::read_to_string(file).map_err(|e| {
                    CliError::Input(format!("Failed to read {}: {}", file.display(), e))
                })?;
                let bundle: UseCaseBundle = serde_json::from_str(&raw).map_err(|e| {
                    CliError::Input(format!("Invalid bundle {}: {}", file.display(), e))
                })?;
                let summary = self.store.import_bundle(&bundle)?;
                Ok(format_import_summary(&summary))
            }
        }
    }

    async fn handle_job(&self, command: &JobCommands) -> Result<String, CliError> {
        match command {
            JobCommands::Create { target, format } => {
                let job = self.controller.create_job(self.job_request(target))?;
                render_job(&job, format)
            }
            JobCommands::Start {
                job_id,
                sync,
                format,
            } => {
                let mode = if *sync {
                    ExecutionMode::Sync
                } else {
                    ExecutionMode::Async
                };
                match self.controller.start(job_id, mode, &self.caller).await? {
                    StartOutcome::AlreadyFinished(job)
                    | StartOutcome::AlreadyProcessing(job)
                    | StartOutcome::Finished(job) => render_job(&job, format),
                    StartOutcome::Started { job_id } => {
                        // the spawned run dies with this process, so follow it here
                        let outcome = self.follow(&job_id, Duration::from_millis(500), None).await?;
                        match outcome {
                            crate::job::WatchOutcome::Finished(job) => render_job(&job, format),
                            stalled => Ok(format_watch_outcome(&stalled)),
                        }
                    }
                }
            }
            JobCommands::Status {
                job_id,
                use_case,
                format,
            } => {
                let job = match (job_id, use_case) {
                    (Some(id), _) => self.controller.get_job(id)?,
                    (None, Some(use_case)) => self.controller.latest_job(use_case)?,
                    (None, None) => {
                        return Err(CliError::Input("Pass a job id or --use-case".to_string()))
                    }
                };
                render_job(&job, format)
            }
            JobCommands::Watch {
                job_id,
                interval_ms,
                stall_after_secs,
            } => {
                let outcome = self
                    .follow(
                        job_id,
                        Duration::from_millis(*interval_ms),
                        stall_after_secs.map(Duration::from_secs),
                    )
                    .await?;
                Ok(format_watch_outcome(&outcome))
            }
        }
    }

    async fn follow(
        &self,
        job_id: &str,
        interval: Duration,
        stall_after: Option<Duration>,
    ) -> Result<crate::job::WatchOutcome, CliError> {
        let stall_after =
            stall_after.unwrap_or_else(|| self.config.generation.job_settings().time_limit);
        let watcher = JobWatcher::new(self.store.clone(), interval, stall_after);
        Ok(watcher
            .watch(job_id, |job| eprintln!("{}", format_progress_line(job)))
            .await?)
    }

    async fn handle_generate(
        &self,
        target: &GenerationArgs,
        focus: &[String],
        format: &str,
    ) -> Result<String, CliError> {
        let request = DirectRequest {
            use_case_id: target.use_case.clone(),
            guardrails_id: target.guardrails.clone(),
            generation_strategy: self.strategy_or_default(target),
            test_intensity: self.intensity_or_default(target),
            focus_areas: focus.to_vec(),
            use_orchestrator: target.orchestrator,
        };
        let response = self.service.generate_direct(&request, &self.caller).await?;
        if format == "json" {
            format_json(&response)
        } else {
            Ok(format_direct_text(&response))
        }
    }

    fn handle_evaluation(&self, command: &EvaluationCommands) -> Result<String, CliError> {
        match command {
            EvaluationCommands::Show {
                id,
                use_case,
                format,
            } => {
                let record = match (id, use_case) {
                    (Some(id), _) => self.service.evaluation(id)?,
                    (None, Some(use_case)) => self.service.latest_evaluation(use_case)?,
                    (None, None) => {
                        return Err(CliError::Input("Pass --id or --use-case".to_string()))
                    }
                };
                if format == "json" {
                    format_json(&record)
                } else {
                    Ok(format_evaluation_text(&record))
                }
            }
        }
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, CliError> {
        match command {
            ConfigCommands::Show { format } => {
                let mut shown = self.config.clone();
                if shown.provider.api_key.is_some() {
                    shown.provider.api_key = Some("********".to_string());
                }
                match format.as_str() {
                    "json" => format_json(&shown),
                    "toml" => toml::to_string_pretty(&shown)
                        .map_err(|e| CliError::Input(format!("Failed to render config: {}", e))),
                    other => Err(CliError::Input(format!(
                        "Unknown format '{}' (expected toml or json)",
                        other
                    ))),
                }
            }
            ConfigCommands::Validate => {
                let key = if self.config.provider.is_configured() {
                    "configured"
                } else {
                    "missing"
                };
                Ok(format!(
                    "Configuration OK\nProvider: {} ({}), credentials {}",
                    self.config.provider.provider_type.as_str(),
                    self.config.provider.model,
                    key
                ))
            }
        }
    }

    fn job_request(&self, target: &GenerationArgs) -> JobRequest {
        JobRequest {
            use_case_id: target.use_case.clone(),
            guardrails_id: target.guardrails.clone(),
            generation_strategy: self.strategy_or_default(target),
            test_intensity: self.intensity_or_default(target),
            use_orchestrator: target.orchestrator,
            requested_by: Some(self.caller.user_id.clone()),
        }
    }

    fn strategy_or_default(&self, target: &GenerationArgs) -> String {
        target
            .strategy
            .clone()
            .unwrap_or_else(|| self.config.generation.default_strategy.clone())
    }

    fn intensity_or_default(&self, target: &GenerationArgs) -> String {
        target
            .intensity
            .clone()
            .unwrap_or_else(|| self.config.generation.default_intensity.clone())
    }
}

fn render_job(job: &JobRecord, format: &str) -> Result<String, CliError> {
    if format == "json" {
        format_json(job)
    } else {
        Ok(format_job_text(job))
    }
}

/// Relative store paths are taken from the workspace root.
fn resolve_store_path(workspace_root: &Path, store_path: &Path) -> PathBuf {
    if store_path.is_absolute() {
        store_path.to_path_buf()
    } else {
        workspace_root.join(store_path)
    }
}
