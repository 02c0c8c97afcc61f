//! Authorization configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use warden_types::UnitType;

use crate::error::Result;

/// Environment variable prefix, e.g. `WARDEN_STATUS_CONTEXT_WINDOW_SECS`.
pub const ENV_PREFIX: &str = "WARDEN";

/// One week, the default window for recent status contexts.
pub const DEFAULT_STATUS_CONTEXT_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Site-wide authorization settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Units disabled for every repository.
    pub disabled_units: Vec<UnitType>,
    /// Trailing window used to suggest required status check contexts.
    pub status_context_window_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            disabled_units: Vec::new(),
            status_context_window_secs: DEFAULT_STATUS_CONTEXT_WINDOW_SECS,
        }
    }
}

impl AuthConfig {
    /// Loads the configuration from an optional file and `WARDEN_*` environment variables.
    ///
    /// Environment variables override file values. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`AuthConfig::load`], reading `WARDEN_*` variables from `env`
    /// instead of the process environment when given.
    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .source(env)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("disabled_units"),
            )
            .build()?;
        let config: AuthConfig = settings.try_deserialize()?;

        tracing::debug!(
            disabled_units = ?config.disabled_units,
            status_context_window_secs = config.status_context_window_secs,
            "Loaded auth configuration"
        );

        Ok(config)
    }

    /// Window used by recent status context lookups.
    pub fn status_context_window(&self) -> Duration {
        Duration::from_secs(self.status_context_window_secs)
    }
}
