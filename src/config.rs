//! Configuration System
//!
//! Layered configuration, lowest to highest precedence: built-in defaults, the global file,
//! workspace files, then `GUARDGEN__*` environment variables (`GUARDGEN__PROVIDER__MODEL`
//! sets `provider.model`).

use crate::error::SetupError;
use crate::job::JobSettings;
use crate::logging::LoggingConfig;
use config::Environment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GuardgenConfig {
    /// Completion provider used by every generation pass
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "guardgen")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".guardgen/store"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Generation defaults and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    #[serde(default = "default_intensity")]
    pub default_intensity: String,

    /// Time limit for a job run
    #[serde(default = "default_job_time_limit")]
    pub job_time_limit_secs: u64,

    /// Time limit for direct generation
    #[serde(default = "default_direct_time_limit")]
    pub direct_time_limit_secs: u64,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Attempts per provider call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,

    /// Overrides the intensity's per-suite scenario cap
    #[serde(default)]
    pub max_tests_per_suite: Option<usize>,
}

fn default_strategy() -> String {
    "comprehensive".to_string()
}

fn default_intensity() -> String {
    "standard".to_string()
}

fn default_job_time_limit() -> u64 {
    300
}

fn default_direct_time_limit() -> u64 {
    60
}

fn default_tick_interval() -> u64 {
    12
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    1000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            default_intensity: default_intensity(),
            job_time_limit_secs: default_job_time_limit(),
            direct_time_limit_secs: default_direct_time_limit(),
            tick_interval_secs: default_tick_interval(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff(),
            max_tests_per_suite: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        crate::generation::GenerationStrategy::parse(&self.default_strategy, &self.default_intensity)
            .map_err(|e| e.to_string())?;
        if self.job_time_limit_secs == 0 || self.direct_time_limit_secs == 0 {
            return Err("Time limits must be positive".to_string());
        }
        if self.tick_interval_secs == 0 {
            return Err("Tick interval must be positive".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        if self.max_tests_per_suite == Some(0) {
            return Err("max_tests_per_suite must be positive".to_string());
        }
        Ok(())
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            time_limit: Duration::from_secs(self.job_time_limit_secs),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            max_tests_per_suite: self.max_tests_per_suite,
        }
    }

    pub fn direct_time_limit(&self) -> Duration {
        Duration::from_secs(self.direct_time_limit_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String),
    Storage(String),
    Generation(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GuardgenConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("Store path cannot be empty".to_string()));
        }
        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }
        if let Err(e) = crate::logging::validate(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold the errors into one `SetupError`.
    pub fn validated(self) -> Result<Self, SetupError> {
        self.validate().map_err(|errors| {
            let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SetupError::Invalid(lines.join("\n"))
        })?;
        Ok(self)
    }
}

/// Loads [`GuardgenConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(workspace_root: &Path) -> Result<GuardgenConfig, SetupError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let settings = builder.add_source(env_source()).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load a single file on top of the defaults, still honouring environment overrides.
    pub fn load_from_file(path: &Path) -> Result<GuardgenConfig, SetupError> {
        let settings = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path).required(true))
            .add_source(env_source())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    pub fn default() -> GuardgenConfig {
        GuardgenConfig::default()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("GUARDGEN")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
