//! Application configuration.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `IMGQ_`-prefixed environment variables with `__` separating nested
//! keys (`IMGQ_NETWORK__TIMEOUT=60`).

use crate::auth::{CredentialSet, RegistryCredential};
use crate::client::ClientConfig;
use crate::error::{ImgqError, Result};
use config::{Config as ConfigRs, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::path::Path;


const ENV_PREFIX: &str = "IMGQ";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub registries: Vec<Registry>,
}

impl Config {
    /// Parses a `Config` from a YAML string layered over the defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(s, FileFormat::Yaml));
        Self::from_builder(builder)
    }

    /// Loads a `Config` from an optional file, then the process environment.
    ///
    /// A given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Self::defaults()?;

        if let Some(p) = path {
            builder = builder.add_source(File::from(p).format(FileFormat::Yaml).required(true));
        }

        Self::from_builder(builder.add_source(env))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = ConfigRs::try_from(&Config::default()).map_err(|e| {
            ImgqError::configuration_with_source("Failed to build default configuration", e)
        })?;
        Ok(ConfigRs::builder().add_source(defaults))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| {
                ImgqError::configuration_with_source("Failed to deserialize configuration", e)
            })
    }

    /// Settings for [`crate::client::Client`].
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(self.network.timeout)
            .with_max_idle_per_host(self.network.max_idle_per_host)
    }

    /// Builds the host-keyed credential set from the `registries` section.
    ///
    /// # Errors
    ///
    /// Returns [`ImgqError::Configuration`] when an entry has no password or
    /// names an unset `password_env` variable.
    pub fn credentials(&self) -> Result<CredentialSet> {
        self.registries
            .iter()
            .map(|registry| {
                let password = registry.resolve_password()?;
                Ok(RegistryCredential::new(
                    registry.url.as_str(),
                    registry.username.as_str(),
                    password,
                ))
            })
            .collect()
    }
}

/// Output formatting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Output {
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub color: ColorChoice,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,

    Json,

    Yaml,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "yaml" | "yml" => OutputFormat::Yaml,
            _ => OutputFormat::Pretty,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    Auto,

    Always,

    Never,
}

impl From<&str> for ColorChoice {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "always" => ColorChoice::Always,
            "never" => ColorChoice::Never,
            _ => ColorChoice::Auto,
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    /// Request timeout in seconds.
    #[serde(default = "default_network_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            timeout: default_network_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_network_timeout() -> u64 {
    30
}

fn default_max_idle_per_host() -> usize {
    10
}

/// Credentials for one registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    pub url: String,

    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl Registry {
    fn resolve_password(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }

        match &self.password_env {
            Some(var) => std::env::var(var).map_err(|e| {
                ImgqError::configuration_with_source(
                    format!("Password variable '{var}' for registry '{}' is not set", self.url),
                    e,
                )
            }),
            None => Err(ImgqError::configuration(format!(
                "Registry '{}' has neither 'password' nor 'password_env'",
                self.url
            ))),
        }
    }
}
