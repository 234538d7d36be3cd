#![forbid(unsafe_code)]

//! Manager configuration.
//!
//! Configuration is plain data: build it in code with the `with_*` methods,
//! read it from the environment with [`ManagerConfig::from_env`], or (with
//! the `config` feature) parse it from TOML.
//!
//! ```toml
//! completion_limit = 16
//! skip_unchanged = true
//! ```

use std::env;

/// Environment variable holding the completion pass limit.
pub const ENV_COMPLETION_LIMIT: &str = "TETHER_COMPLETION_LIMIT";
/// Environment variable toggling unchanged-entry skipping.
pub const ENV_SKIP_UNCHANGED: &str = "TETHER_SKIP_UNCHANGED";

/// Tuning knobs for a [`NexusManager`](crate::manager::NexusManager).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct ManagerConfig {
    /// Maximum number of completion passes, counting the final pass that
    /// confirms the fixed point. `None` leaves the loop bounded only by the
    /// number of reachable nexuses.
    pub completion_limit: Option<usize>,
    /// Drop entries equal to their nexus's current value before commit, so
    /// they are neither committed nor notified.
    pub skip_unchanged: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            completion_limit: None,
            skip_unchanged: true,
        }
    }
}

impl ManagerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap completion at `limit` passes. A limit of zero is treated as one.
    #[must_use]
    pub fn with_completion_limit(mut self, limit: usize) -> Self {
        self.completion_limit = Some(limit.max(1));
        self
    }

    /// Remove the completion pass cap.
    #[must_use]
    pub fn without_completion_limit(mut self) -> Self {
        self.completion_limit = None;
        self
    }

    /// Set whether unchanged entries are skipped at commit.
    #[must_use]
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Read configuration from `TETHER_COMPLETION_LIMIT` and
    /// `TETHER_SKIP_UNCHANGED`. Unset or unparsable variables keep their
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let limit = env::var(ENV_COMPLETION_LIMIT).ok();
        let skip = env::var(ENV_SKIP_UNCHANGED).ok();
        Self::from_env_values(limit.as_deref(), skip.as_deref())
    }

    fn from_env_values(limit: Option<&str>, skip: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(limit) = limit.and_then(|raw| raw.trim().parse::<usize>().ok()) {
            config = config.with_completion_limit(limit);
        }
        if let Some(skip) = skip.and_then(parse_flag) {
            config.skip_unchanged = skip;
        }
        config
    }

    /// Parse configuration from a TOML document.
    #[cfg(feature = "config")]
    pub fn from_toml_str(source: &str) -> Result<Self, crate::error::ConfigError> {
        let mut config: Self = toml::from_str(source)
            .map_err(|err| crate::error::ConfigError::Parse(err.to_string()))?;
        if let Some(limit) = config.completion_limit {
            config.completion_limit = Some(limit.max(1));
        }
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
