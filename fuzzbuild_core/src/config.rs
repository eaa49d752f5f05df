use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Flag that makes the configure tool wipe an existing build directory.
pub const WIPE_FLAG: &str = "--wipe";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    #[serde(default = "default_configure_tool")]
    pub configure: Vec<String>,
    #[serde(default = "default_build_runner")]
    pub build: Vec<String>,
}

fn default_configure_tool() -> Vec<String> {
    vec!["meson".to_string()]
}

fn default_build_runner() -> Vec<String> {
    vec!["ninja".to_string()]
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            configure: default_configure_tool(),
            build: default_build_runner(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BaseSettings {
    #[serde(default = "default_configure_flags")]
    pub configure_flags: Vec<String>,
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

// gtest is noisy, so the warning level stays at 2.
pub fn default_configure_flags() -> Vec<String> {
    vec![
        "-Dwarning_level=2".to_string(),
        "-Ddefault_library=static".to_string(),
        WIPE_FLAG.to_string(),
    ]
}

pub fn default_targets() -> Vec<String> {
    vec!["tests/fuzz/fd-fuzz".to_string()]
}

impl Default for BaseSettings {
    fn default() -> Self {
        Self {
            configure_flags: default_configure_flags(),
            targets: default_targets(),
            working_dir: None,
        }
    }
}

/// Process-wide settings shared by every variant.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BaseConfiguration {
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub base: BaseSettings,
}

impl BaseConfiguration {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BaseConfiguration =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would break the per-variant build invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.configure.is_empty() {
            return Err(ConfigError::Invalid(
                "tools.configure must name a program".to_string(),
            ));
        }
        if self.tools.build.is_empty() {
            return Err(ConfigError::Invalid(
                "tools.build must name a program".to_string(),
            ));
        }
        if self.base.targets.is_empty() {
            return Err(ConfigError::Invalid(
                "base.targets must list at least one fuzz target".to_string(),
            ));
        }
        if !self.base.configure_flags.iter().any(|f| f == WIPE_FLAG) {
            return Err(ConfigError::Invalid(format!(
                "base.configure-flags must contain {WIPE_FLAG}"
            )));
        }
        Ok(())
    }
}
