//! Configuration file management for evolver.
//!
//! Provides a TOML-based config file at `~/.config/evolver/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use evolver_core::client::ClientConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub claude: ClaudeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSection {
    /// Agent binary, looked up on `$PATH` unless it contains a slash.
    pub binary: String,
    /// Primary model. Empty leaves the choice to the agent.
    pub model: String,
    /// Capacity fallback model. Empty disables the fallback.
    pub fallback_model: String,
    pub timeout_secs: u64,
    /// Pass `--verbose` to streaming runs.
    pub stream_verbose: bool,
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            binary: ClientConfig::DEFAULT_BINARY.to_string(),
            model: ClientConfig::DEFAULT_MODEL.to_string(),
            fallback_model: ClientConfig::DEFAULT_FALLBACK_MODEL.to_string(),
            timeout_secs: ClientConfig::DEFAULT_TIMEOUT.as_secs(),
            stream_verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format {other:?} (expected \"console\" or \"json\")"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the evolver config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/evolver` or `~/.config/evolver`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("evolver");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("evolver")
}

/// Return the path to the evolver config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` defers to the rest of the chain.
#[derive(Debug, Default)]
pub struct Overrides {
    pub binary: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct EvolverConfig {
    pub client: ClientConfig,
    pub logging: LoggingSection,
}

impl EvolverConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Binary: `--binary` > `EVOLVER_CLAUDE_BINARY` > `claude.binary` > `claude`
    /// - Model: `--model` > `EVOLVER_MODEL` > `claude.model` > default model
    /// - Fallback: `EVOLVER_FALLBACK_MODEL` > `claude.fallback_model` > default fallback
    /// - Timeout: `--timeout` > `EVOLVER_TIMEOUT_SECS` > `claude.timeout_secs` > 300
    /// - Stream `--verbose`: `claude.stream_verbose` > off
    /// - Logging: `EVOLVER_LOG_LEVEL` / `EVOLVER_LOG_FORMAT` > `[logging]` > info / console
    ///
    /// A missing config file is fine; an unreadable or malformed one is an error.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file_config = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };
        let ConfigFile {
            claude: file_claude,
            logging: file_logging,
        } = file_config;

        let binary = overrides
            .binary
            .clone()
            .or_else(|| env("EVOLVER_CLAUDE_BINARY"))
            .unwrap_or(file_claude.binary);
        let model = overrides
            .model
            .clone()
            .or_else(|| env("EVOLVER_MODEL"))
            .unwrap_or(file_claude.model);
        let fallback_model = env("EVOLVER_FALLBACK_MODEL").unwrap_or(file_claude.fallback_model);

        let timeout_secs = match (overrides.timeout_secs, env("EVOLVER_TIMEOUT_SECS")) {
            (Some(secs), _) => secs,
            (None, Some(raw)) => raw
                .parse::<u64>()
                .with_context(|| format!("EVOLVER_TIMEOUT_SECS is not a number: {raw:?}"))?,
            (None, None) => file_claude.timeout_secs,
        };
        if timeout_secs == 0 {
            bail!("agent timeout must be at least one second");
        }

        let level = env("EVOLVER_LOG_LEVEL").unwrap_or(file_logging.level);
        let format = match env("EVOLVER_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().context("invalid EVOLVER_LOG_FORMAT")?,
            None => file_logging.format,
        };

        Ok(Self {
            client: ClientConfig {
                binary,
                model: non_empty(model),
                fallback_model: non_empty(fallback_model),
                timeout: Duration::from_secs(timeout_secs),
                verbose_stream: file_claude.stream_verbose,
            },
            logging: LoggingSection { level, format },
        })
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
