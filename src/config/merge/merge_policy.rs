//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

use crate::config::StorageConfig;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    let store_path = StorageConfig::default().path;
    Config::builder()
        .set_default("storage.path", store_path.to_string_lossy().to_string())?
        .set_default("generation.default_strategy", "comprehensive")?
        .set_default("generation.default_intensity", "standard")?
        .set_default("generation.job_time_limit_secs", 300)?
        .set_default("generation.direct_time_limit_secs", 60)?
        .set_default("generation.tick_interval_secs", 12)
}
