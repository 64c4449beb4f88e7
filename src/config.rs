//! Configuration loading via `ortho-config`.
//!
//! [`HangarConfig`] layers defaults, `hangar.toml`, `HANGAR_*` environment
//! variables and CLI flags, then converts the raw millisecond values into
//! the typed configs the controllers take.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::{ImageConfig, ProvisionConfig, TeardownConfig};
use crate::naming::{DEFAULT_PREFIX, GroupNamingConvention};
use crate::token::TokenTtl;

const CONFIG_FILE: &str = "hangar.toml";
const MIN_TIMEOUT_MS: u64 = 500;

/// Wait timings, token lifetimes, and naming for the lifecycle controllers.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HANGAR",
    discovery(
        app_name = "hangar",
        env_var = "HANGAR_CONFIG_PATH",
        config_file_name = "hangar.toml",
        dotfile_name = ".hangar.toml",
        project_file_name = "hangar.toml"
    )
)]
pub struct HangarConfig {
    /// How long provisioning waits for login details, in milliseconds.
    #[ortho_config(default = 1_200_000)]
    pub login_details_timeout_ms: u64,
    /// Spacing between login detail checks, in milliseconds.
    #[ortho_config(default = 10_000)]
    pub login_details_period_ms: u64,
    /// How long teardown waits for pending operations, in milliseconds.
    #[ortho_config(default = 180_000)]
    pub active_transactions_timeout_ms: u64,
    /// Spacing between pending operation checks, in milliseconds.
    #[ortho_config(default = 1_000)]
    pub active_transactions_period_ms: u64,
    /// How long image capture waits for availability, in milliseconds.
    #[ortho_config(default = 1_200_000)]
    pub image_available_timeout_ms: u64,
    /// Spacing between image availability checks, in milliseconds.
    #[ortho_config(default = 5_000)]
    pub image_available_period_ms: u64,
    /// Token cache lifetime in seconds. Defaults to 59 minutes.
    #[ortho_config(default = 3_540)]
    pub token_ttl_secs: u64,
    /// Backend session interval in seconds. When set, the token cache
    /// lifetime is derived from it instead of `token_ttl_secs`.
    pub token_session_interval_secs: Option<u64>,
    /// Prefix for generated resource names.
    #[ortho_config(default = DEFAULT_PREFIX.to_owned())]
    pub name_prefix: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn invalid(&self, problem: &str) -> ConfigError {
        ConfigError::InvalidValue(format!(
            "invalid {}: {problem}; set {} or {} in {CONFIG_FILE}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl HangarConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("hangar")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_timeout(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value <= MIN_TIMEOUT_MS {
            return Err(metadata.invalid(&format!(
                "{value} ms must be greater than {MIN_TIMEOUT_MS} ms"
            )));
        }
        Ok(())
    }

    fn require_non_zero(value: u64, unit: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(metadata.invalid(&format!("0 {unit} must be greater than zero")));
        }
        Ok(())
    }

    /// Checks that every wait is bounded and every period is non-zero. Error
    /// messages name the environment variable and TOML key to fix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            (
                self.login_details_timeout_ms,
                FieldMetadata::new(
                    "login details timeout",
                    "HANGAR_LOGIN_DETAILS_TIMEOUT_MS",
                    "login_details_timeout_ms",
                ),
            ),
            (
                self.active_transactions_timeout_ms,
                FieldMetadata::new(
                    "active transactions timeout",
                    "HANGAR_ACTIVE_TRANSACTIONS_TIMEOUT_MS",
                    "active_transactions_timeout_ms",
                ),
            ),
            (
                self.image_available_timeout_ms,
                FieldMetadata::new(
                    "image available timeout",
                    "HANGAR_IMAGE_AVAILABLE_TIMEOUT_MS",
                    "image_available_timeout_ms",
                ),
            ),
        ];
        for (value, metadata) in &timeouts {
            Self::require_timeout(*value, metadata)?;
        }

        let periods = [
            (
                self.login_details_period_ms,
                FieldMetadata::new(
                    "login details period",
                    "HANGAR_LOGIN_DETAILS_PERIOD_MS",
                    "login_details_period_ms",
                ),
            ),
            (
                self.active_transactions_period_ms,
                FieldMetadata::new(
                    "active transactions period",
                    "HANGAR_ACTIVE_TRANSACTIONS_PERIOD_MS",
                    "active_transactions_period_ms",
                ),
            ),
            (
                self.image_available_period_ms,
                FieldMetadata::new(
                    "image available period",
                    "HANGAR_IMAGE_AVAILABLE_PERIOD_MS",
                    "image_available_period_ms",
                ),
            ),
        ];
        for (value, metadata) in &periods {
            Self::require_non_zero(*value, "ms", metadata)?;
        }

        Self::require_non_zero(
            self.token_ttl_secs,
            "s",
            &FieldMetadata::new("token TTL", "HANGAR_TOKEN_TTL_SECS", "token_ttl_secs"),
        )?;
        if let Some(interval) = self.token_session_interval_secs {
            Self::require_non_zero(
                interval,
                "s",
                &FieldMetadata::new(
                    "token session interval",
                    "HANGAR_TOKEN_SESSION_INTERVAL_SECS",
                    "token_session_interval_secs",
                ),
            )?;
        }
        if self.name_prefix.trim().is_empty() {
            return Err(FieldMetadata::new(
                "resource name prefix",
                "HANGAR_NAME_PREFIX",
                "name_prefix",
            )
            .invalid("prefix must not be empty"));
        }
        Ok(())
    }

    /// Provisioning timings.
    #[must_use]
    pub const fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig::new(
            Duration::from_millis(self.login_details_timeout_ms),
            Duration::from_millis(self.login_details_period_ms),
        )
    }

    /// Teardown timings.
    #[must_use]
    pub const fn teardown_config(&self) -> TeardownConfig {
        TeardownConfig::new(
            Duration::from_millis(self.active_transactions_timeout_ms),
            Duration::from_millis(self.active_transactions_period_ms),
        )
    }

    /// Image capture timings.
    #[must_use]
    pub const fn image_config(&self) -> ImageConfig {
        ImageConfig {
            available_timeout: Duration::from_millis(self.image_available_timeout_ms),
            available_period: Duration::from_millis(self.image_available_period_ms),
        }
    }

    /// Token cache lifetime: derived from the session interval when one is
    /// configured, otherwise `token_ttl_secs`.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        match self.token_session_interval_secs {
            Some(interval) => TokenTtl::for_session_interval(Duration::from_secs(interval)),
            None => Duration::from_secs(self.token_ttl_secs),
        }
    }

    /// Naming convention using the configured prefix.
    #[must_use]
    pub fn naming(&self) -> GroupNamingConvention {
        GroupNamingConvention::new(self.name_prefix.as_str())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
