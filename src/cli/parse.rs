//! CLI parse: clap types for guardgen. No behavior; definitions only.

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// guardgen - LLM-driven evaluation suite generation for governed AI use cases
#[derive(Parser, Debug)]
#[command(name = "guardgen")]
#[command(about = "Generate evaluation suites for AI use cases from their assessments and guardrails")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds config/)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load use case data into the store
    Usecase {
        #[command(subcommand)]
        command: UseCaseCommands,
    },
    /// Create, start and follow generation jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Generate an evaluation directly, without a job record
    Generate {
        #[command(flatten)]
        target: GenerationArgs,
        /// Restrict domain passes to these areas (comma separated)
        #[arg(long, value_delimiter = ',')]
        focus: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Inspect stored evaluation artifacts
    Evaluation {
        #[command(subcommand)]
        command: EvaluationCommands,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Target use case and generation knobs shared by `job create` and `generate`.
#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    /// Use case id
    #[arg(long = "use-case")]
    pub use_case: String,
    /// Guardrail configuration id (defaults to the latest for the use case)
    #[arg(long)]
    pub guardrails: Option<String>,
    /// Generation strategy (comprehensive, focused, adaptive, rapid)
    #[arg(long)]
    pub strategy: Option<String>,
    /// Test intensity (light, standard, thorough)
    #[arg(long)]
    pub intensity: Option<String>,
    /// Use the multi-agent orchestrator instead of the staged engine
    #[arg(long)]
    pub orchestrator: bool,
}

#[derive(Subcommand, Debug)]
pub enum UseCaseCommands {
    /// Import a JSON bundle (use case, assessments, guardrails, evaluations, approvals)
    Import {
        /// Path to the bundle file
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Create a pending job (reuses an active one for the same use case)
    Create {
        #[command(flatten)]
        target: GenerationArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Start a pending job
    Start {
        job_id: String,
        /// Run inline and print the finished job instead of following progress
        #[arg(long)]
        sync: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show a job by id, or the latest job for a use case
    #[command(group(ArgGroup::new("job_target").required(true).args(["job_id", "use_case"])))]
    Status {
        job_id: Option<String>,
        #[arg(long = "use-case")]
        use_case: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Poll a job until it finishes or stalls
    Watch {
        job_id: String,
        /// Poll interval in milliseconds
        #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
        /// Report a stall after this many seconds without progress (default: job time limit)
        #[arg(long)]
        stall_after_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum EvaluationCommands {
    /// Show an artifact by id, or the latest generated one for a use case
    #[command(group(ArgGroup::new("evaluation_target").required(true).args(["id", "use_case"])))]
    Show {
        #[arg(long)]
        id: Option<String>,
        #[arg(long = "use-case")]
        use_case: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration with secrets redacted
    Show {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Validate the effective configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_needs_a_target() {
        assert!(Cli::try_parse_from(["guardgen", "job", "status"]).is_err());
        let cli = Cli::try_parse_from(["guardgen", "job", "status", "--use-case", "uc-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Job { command: JobCommands::Status { use_case: Some(_), .. } }
        ));
    }

    #[test]
    fn job_watch_rejects_a_zero_interval() {
        let zero = Cli::try_parse_from(["guardgen", "job", "watch", "job-1", "--interval-ms", "0"]);
        assert!(zero.is_err());
        let cli =
            Cli::try_parse_from(["guardgen", "job", "watch", "job-1", "--interval-ms", "250"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Job { command: JobCommands::Watch { interval_ms: 250, .. } }
        ));
    }

    #[test]
    fn generate_splits_focus_areas() {
        let cli = Cli::try_parse_from([
            "guardgen",
            "generate",
            "--use-case",
            "uc-1",
            "--focus",
            "safety,security",
            "--orchestrator",
        ])
        .unwrap();
        let Commands::Generate { target, focus, .. } = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(focus, vec!["safety", "security"]);
        assert!(target.orchestrator);
        assert!(target.strategy.is_none());
    }
}
