//! File and environment backed processing settings.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. An optional settings file (format chosen by extension: yaml, json, toml)
//! 3. Environment variables prefixed `XQ__`, e.g. `XQ__POISON_THRESHOLD=3`
//!
//! Settings are plain serde data. They become validated options through
//! [`ProcessingSettings::processing_options`].

use crate::error::{SettingsError, ValidationError};
use crate::options::ProcessingOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Prefix of environment variables read by [`ProcessingSettings::load`]
pub const ENV_PREFIX: &str = "XQ";

/// Processing settings in their serialized form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Maximum message age in seconds, 0 disables the check
    pub time_window_secs: u64,

    /// Visibility timeout in seconds
    pub message_lease_secs: u64,

    /// Idle wait between empty polls in seconds
    pub poll_frequency_secs: u64,

    pub poison_threshold: u32,

    /// In-flight limit for parallel processing
    pub max_concurrency: usize,

    /// Messages per batch for batch processing
    pub batch_size: u32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            time_window_secs: 0,
            message_lease_secs: 60,
            poll_frequency_secs: 5,
            poison_threshold: 5,
            max_concurrency: 8,
            batch_size: 32,
        }
    }
}

impl ProcessingSettings {
    /// Load settings from an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, None)
    }

    /// Load settings, reading environment variables from `env` when given
    /// instead of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check every value without building options
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.processing_options(CancellationToken::new())?;

        if self.max_concurrency == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.batch_size == 0 {
            return Err(ValidationError::OutOfRange {
                field: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Build validated base options bound to `cancel`
    pub fn processing_options(
        &self,
        cancel: CancellationToken,
    ) -> Result<ProcessingOptions, ValidationError> {
        ProcessingOptions::new(
            Duration::from_secs(self.time_window_secs),
            Duration::from_secs(self.message_lease_secs),
            Duration::from_secs(self.poll_frequency_secs),
            self.poison_threshold,
            cancel,
        )
    }
}
