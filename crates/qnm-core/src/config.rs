use crate::error::Error;
use crate::pkg::GraphOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`GraphOptions::max_depth`].
pub const MAX_DEPTH_ENV: &str = "QNM_MAX_DEPTH";

/// Runtime configuration for the qnm CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Graph construction options.
    #[serde(default)]
    pub graph: GraphOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            graph: GraphOptions::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Default config with environment overrides applied.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(MAX_DEPTH_ENV) {
            config.graph.max_depth = parse_max_depth(&value)?;
        }
        Ok(config)
    }

    /// Set working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set the maximum `node_modules` nesting depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.graph.max_depth = max_depth;
        self
    }
}

fn parse_max_depth(value: &str) -> Result<usize, Error> {
    value.trim().parse().map_err(|_| Error::InvalidEnv {
        var: MAX_DEPTH_ENV.to_string(),
        value: value.to_string(),
    })
}
