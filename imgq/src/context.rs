//! Application context that holds resolved configuration
//!
//! The context is built following the precedence order:
//! 1. Default values
//! 2. Config file values
//! 3. `IMGQ_` environment variables
//! 4. CLI flags
//!
//! Once built, the context is passed as read-only throughout the application.

use libimgq::config::{ColorChoice, Config, OutputFormat};
use libimgq::{Imgq, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "IMGQ_CONFIG";

/// Application context with resolved configuration
#[derive(Debug)]
pub struct AppContext {
    /// Resolved configuration
    pub config: Config,
}

impl AppContext {
    /// Build context from the config file (if any) and the CLI overrides.
    pub fn build(config_path: Option<&Path>, cli_color: Option<ColorChoice>) -> Result<Self> {
        let mut config = Config::load(config_path)?;

        if let Some(color) = cli_color {
            config.output.color = color;
        }

        Ok(Self { config })
    }

    /// Output format used when a command gets no `--format` flag.
    pub fn default_format(&self) -> OutputFormat {
        self.config.output.format
    }

    /// Whether stderr messages should be colored.
    pub fn use_color(&self) -> bool {
        use_color(self.config.output.color)
    }

    /// Builds the query engine from the resolved configuration.
    pub fn engine(&self) -> Result<Imgq> {
        Imgq::builder().with_config(self.config.clone()).build()
    }
}

/// Resolves a color choice against stderr and `NO_COLOR`.
pub fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
    }
}

/// Picks the config file: the `--config` flag, then `$IMGQ_CONFIG`, then
/// `<config_dir>/imgq/config.yaml` when that file exists.
///
/// An explicit path is returned even if missing so that loading reports it.
pub fn config_path(
    flag: Option<PathBuf>,
    env_value: Option<String>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if flag.is_some() {
        return flag;
    }

    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(value));
    }

    config_dir
        .map(|dir| dir.join("imgq").join("config.yaml"))
        .filter(|path| path.is_file())
}

/// [`config_path`] with the process environment and platform config dir.
pub fn default_config_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    config_path(flag, std::env::var(CONFIG_ENV).ok(), dirs::config_dir())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
