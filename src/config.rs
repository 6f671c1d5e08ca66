//! Layered configuration.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`DEEPREPO_*`)
//! 3. Project file (`deeprepo.toml` at the workspace root)
//! 4. Defaults
//!
//! Every resolved value remembers where it came from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::lsp::{ClientOptions, LanguageProfile};
use crate::scanner::{ScanOptions, DEFAULT_EXCLUDE_DIRS};

/// Name of the project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "deeprepo.toml";

pub const ENV_LANGUAGE: &str = "DEEPREPO_LANGUAGE";
pub const ENV_SERVER_COMMAND: &str = "DEEPREPO_SERVER_COMMAND";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "DEEPREPO_REQUEST_TIMEOUT_MS";
pub const ENV_INIT_TIMEOUT_MS: &str = "DEEPREPO_INIT_TIMEOUT_MS";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(key: &str, value: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From deeprepo.toml.
    ProjectConfig = 1,
    /// From environment variable.
    EnvVar = 2,
    /// From CLI flag (highest precedence).
    CliFlag = 3,
}

/// A value and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    pub fn default_value(value: T) -> Self {
        ConfigValue::new(value, ConfigSource::Default)
    }
}

fn layer<T>(slot: &mut ConfigValue<T>, value: Option<T>, source: ConfigSource) {
    if let Some(value) = value {
        if source >= slot.source {
            *slot = ConfigValue::new(value, source);
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Contents of `deeprepo.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub language: Option<String>,
    pub server_command: Option<Vec<String>>,
    pub exclude_dirs: Option<Vec<String>>,
    pub request_timeout_ms: Option<u64>,
    pub init_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub include_nested: Option<bool>,
    pub tab_width: Option<usize>,
}

impl ProjectConfig {
    /// Load `deeprepo.toml` from `root`, or `None` if it does not exist.
    pub fn load(root: &Path) -> ConfigResult<Option<Self>> {
        let path = root.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Toml { path, source })?;
        Ok(Some(config))
    }
}

/// CLI configuration overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// --language flag.
    pub language: Option<String>,
    /// --server-command flag, already split.
    pub server_command: Option<Vec<String>>,
    /// --timeout-ms flag.
    pub request_timeout_ms: Option<u64>,
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Fully resolved settings for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub language: ConfigValue<String>,
    /// `None` means the language profile's default command.
    pub server_command: Option<ConfigValue<Vec<String>>>,
    pub exclude_dirs: ConfigValue<Vec<String>>,
    pub request_timeout_ms: ConfigValue<u64>,
    pub init_timeout_ms: ConfigValue<u64>,
    pub shutdown_grace_ms: ConfigValue<u64>,
    pub include_nested: ConfigValue<bool>,
    pub tab_width: ConfigValue<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            language: ConfigValue::default_value("python".to_string()),
            server_command: None,
            exclude_dirs: ConfigValue::default_value(
                DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            ),
            request_timeout_ms: ConfigValue::default_value(3000),
            init_timeout_ms: ConfigValue::default_value(30_000),
            shutdown_grace_ms: ConfigValue::default_value(500),
            include_nested: ConfigValue::default_value(false),
            tab_width: ConfigValue::default_value(4),
        }
    }
}

impl ScanConfig {
    /// Resolve from all sources using the process environment.
    pub fn resolve(workspace_root: &Path, cli: &CliOverrides) -> ConfigResult<Self> {
        Self::resolve_with_env(workspace_root, cli, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with_env<F>(workspace_root: &Path, cli: &CliOverrides, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ScanConfig::default();

        if let Some(project) = ProjectConfig::load(workspace_root)? {
            debug!(root = %workspace_root.display(), "applying {}", PROJECT_CONFIG_FILE);
            config.apply_project(project);
        }
        config.apply_env(env)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_project(&mut self, project: ProjectConfig) {
        let src = ConfigSource::ProjectConfig;
        layer(&mut self.language, project.language, src);
        if let Some(cmd) = project.server_command {
            self.server_command = Some(ConfigValue::new(cmd, src));
        }
        layer(&mut self.exclude_dirs, project.exclude_dirs, src);
        layer(&mut self.request_timeout_ms, project.request_timeout_ms, src);
        layer(&mut self.init_timeout_ms, project.init_timeout_ms, src);
        layer(&mut self.shutdown_grace_ms, project.shutdown_grace_ms, src);
        layer(&mut self.include_nested, project.include_nested, src);
        layer(&mut self.tab_width, project.tab_width, src);
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, env: F) -> ConfigResult<()> {
        let src = ConfigSource::EnvVar;
        layer(&mut self.language, env(ENV_LANGUAGE), src);

        if let Some(raw) = env(ENV_SERVER_COMMAND) {
            let cmd: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
            self.server_command = Some(ConfigValue::new(cmd, src));
        }

        let parse_ms = |key: &str| -> ConfigResult<Option<u64>> {
            match env(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| invalid(key, raw, "expected milliseconds")),
                None => Ok(None),
            }
        };
        let request = parse_ms(ENV_REQUEST_TIMEOUT_MS)?;
        let init = parse_ms(ENV_INIT_TIMEOUT_MS)?;
        layer(&mut self.request_timeout_ms, request, src);
        layer(&mut self.init_timeout_ms, init, src);
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliOverrides) {
        let src = ConfigSource::CliFlag;
        layer(&mut self.language, cli.language.clone(), src);
        if let Some(cmd) = &cli.server_command {
            self.server_command = Some(ConfigValue::new(cmd.clone(), src));
        }
        layer(&mut self.request_timeout_ms, cli.request_timeout_ms, src);
    }

    fn validate(&self) -> ConfigResult<()> {
        if LanguageProfile::for_language(&self.language.value).is_none() {
            return Err(invalid("language", self.language.value.clone(), "unsupported language"));
        }
        if let Some(cmd) = &self.server_command {
            if cmd.value.is_empty() {
                return Err(invalid("server_command", "", "command is empty"));
            }
        }
        for (key, value) in [
            ("request_timeout_ms", self.request_timeout_ms.value),
            ("init_timeout_ms", self.init_timeout_ms.value),
        ] {
            if value == 0 {
                return Err(invalid(key, "0", "must be positive"));
            }
        }
        if !(1..=16).contains(&self.tab_width.value) {
            return Err(invalid(
                "tab_width",
                self.tab_width.value.to_string(),
                "must be between 1 and 16",
            ));
        }
        Ok(())
    }

    /// The language profile with configured overrides applied.
    pub fn profile(&self) -> ConfigResult<LanguageProfile> {
        let mut profile = LanguageProfile::for_language(&self.language.value)
            .ok_or_else(|| invalid("language", self.language.value.clone(), "unsupported language"))?;
        profile.tab_width = self.tab_width.value;
        Ok(profile)
    }

    /// Launch command: configured, else the profile default.
    pub fn command(&self, profile: &LanguageProfile) -> Vec<String> {
        match &self.server_command {
            Some(cmd) => cmd.value.clone(),
            None => profile.server_command.clone(),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_millis(self.request_timeout_ms.value),
            init_timeout: Duration::from_millis(self.init_timeout_ms.value),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms.value),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            exclude_dirs: self.exclude_dirs.value.clone(),
            include_nested: self.include_nested.value,
        }
    }
}
