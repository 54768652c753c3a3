//! Engine configuration.
//!
//! Can be created through `serde::Deserialize` from various formats, or loaded from YAML with
//! [`Configuration::from_yaml`].

use std::time::Duration;

use displaydoc::Display;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const DEFAULT_HYDRATION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BATCH_SIZE: usize = 100;

fn default_hydration_timeout() -> Duration {
    DEFAULT_HYDRATION_TIMEOUT
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_randomized() -> bool {
    true
}

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The configuration for the engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Hydration calls
    pub hydration: Hydration,

    /// Calls issued for top-level fields
    pub services: Services,

    /// Aliases given to fields the engine injects into backend queries
    pub aliases: Aliases,
}

/// Configuration for hydration calls.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Hydration {
    /// Timeout applied to each hydration call unless its instruction sets one; defaults to 30s
    #[serde(with = "humantime_serde", default = "default_hydration_timeout")]
    #[schemars(with = "String", default = "default_hydration_timeout")]
    pub timeout: Duration,

    /// Upper bound on the number of inputs sent in one batch hydration call; defaults to 100
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for Hydration {
    fn default() -> Self {
        Self {
            timeout: default_hydration_timeout(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Configuration for top-level service calls.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Services {
    /// Timeout for a top-level service call in human-readable format; no timeout when unset
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub timeout: Option<Duration>,
}

/// Configuration for injected aliases.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Aliases {
    /// Append a random token, drawn once per operation, to every injected alias
    #[serde(default = "default_randomized")]
    pub randomized: bool,
}

impl Default for Aliases {
    fn default() -> Self {
        Self {
            randomized: default_randomized(),
        }
    }
}

impl Configuration {
    /// Parses a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration =
            serde_yaml::from_str(yaml).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// The JSON schema of the configuration.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Configuration)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.hydration.max_batch_size == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "hydration.max_batch_size must be greater than 0",
                error: "got 0".to_string(),
            });
        }
        if self.hydration.timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "hydration.timeout must be greater than 0",
                error: "got 0s".to_string(),
            });
        }
        Ok(())
    }
}
