use crate::config::EngineConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Environment prefix; nested keys use `__`, e.g. `SIGNAL_LIFECYCLE__COOLDOWN_SECS=120`.
pub const ENV_PREFIX: &str = "SIGNAL_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration from `config/Config.toml` and `SIGNAL_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load() -> Result<EngineConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads engine configuration from a specific TOML file.
    ///
    /// Missing files and missing keys fall back to defaults; environment
    /// variables override the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load_from(path: &str) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load engine configuration from {path}"))?;

        config.validate()?;
        tracing::debug!(path, "Loaded engine configuration");
        Ok(config)
    }
}
