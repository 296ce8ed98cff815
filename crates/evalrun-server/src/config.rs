//! Server configuration.
//!
//! Everything the orchestrator needs is carried by one [`Config`] value that
//! is loaded at startup and handed to [`AppState`](crate::AppState). A TOML
//! file may override any subset of the defaults:
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:3100"
//! sessions_dir = "/var/lib/evalrun/sessions"
//!
//! [worker]
//! working_dir = "/srv/openagentsafety/evaluation"
//! max_iterations = 30
//!
//! [models]
//! config_path = "/srv/openagentsafety/evaluation/config.toml"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub models: ModelsConfig,
}

impl Config {
    /// Load from a TOML file. Missing sections and keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// HTTP listener and storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address.
    pub bind_addr: String,

    /// Directory holding one subdirectory per session.
    pub sessions_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".to_string(),
            sessions_dir: PathBuf::from("evaluation-sessions"),
        }
    }
}

/// How the evaluation worker is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Interpreter used when no virtualenv interpreter is found.
    pub program: String,

    /// Virtualenv interpreter, relative to `working_dir` unless absolute.
    pub venv_python: Option<PathBuf>,

    /// Worker entry point passed as the first argument.
    pub script: String,

    /// Directory the worker runs in.
    pub working_dir: Option<PathBuf>,

    /// Iteration budget per task.
    pub max_iterations: u32,

    /// Sampling temperature forwarded to the agent under test.
    pub temperature: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            venv_python: Some(PathBuf::from(".venv/bin/python")),
            script: "agentified_main.py".to_string(),
            working_dir: None,
            max_iterations: 30,
            temperature: 0.0,
        }
    }
}

impl WorkerConfig {
    /// Interpreter to launch: the virtualenv one when it exists on disk.
    pub fn interpreter(&self) -> String {
        if let Some(venv) = &self.venv_python {
            let candidate = match &self.working_dir {
                Some(dir) if venv.is_relative() => dir.join(venv),
                _ => venv.clone(),
            };
            if candidate.is_file() {
                return candidate.to_string_lossy().into_owned();
            }
        }
        self.program.clone()
    }
}

/// Source of named model configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// TOML file with `[llm.<name>]` sections. Built-in defaults when unset
    /// or unreadable.
    pub config_path: Option<PathBuf>,
}
