//! Client configuration: where the graph server lives and which endpoints
//! the coordinators post to.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ClientConfig::host`].
pub const ENV_HOST: &str = "REXBATCH_HOST";
/// Environment variable overriding [`ClientConfig::port`].
pub const ENV_PORT: &str = "REXBATCH_PORT";
/// Environment variable overriding [`ClientConfig::graph`].
pub const ENV_GRAPH: &str = "REXBATCH_GRAPH";

/// Connection and endpoint settings for one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ClientConfig {
    /// URL scheme, `http` or `https`.
    pub scheme: String,
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Graph name on the server.
    pub graph: String,
    /// Path prefix in front of the graph name.
    pub path_base: String,
    /// Vertex creation endpoint, relative to the graph.
    pub vertex_path: String,
    /// Batch transaction endpoint, relative to the graph.
    pub batch_path: String,
    /// Per-request timeout applied by the HTTP transport.
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            host: "localhost".into(),
            port: 8182,
            graph: "tinkergraph".into(),
            path_base: "/graphs/".into(),
            vertex_path: "/vertices".into(),
            batch_path: "/tp/batch/tx".into(),
            timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from `explicit`, or from the default location
    /// when no path is given. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.map(Path::to_path_buf).or_else(default_config_path);
        match path {
            Some(path) if path.exists() => Self::read_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and parses a TOML file.
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `REXBATCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            self.port = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_PORT,
                value: raw.clone(),
            })?;
        }
        if let Some(graph) = lookup(ENV_GRAPH) {
            self.graph = graph;
        }
        Ok(())
    }

    /// Checks that the settings can address a graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty".into()));
        }
        if self.graph.trim().is_empty() {
            return Err(ConfigError::Invalid("graph cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be > 0".into()));
        }
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "scheme must be http or https, got '{}'",
                self.scheme
            )));
        }
        Ok(())
    }

    /// URL every endpoint path is appended to, e.g.
    /// `http://localhost:8182/graphs/tinkergraph`.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}{}",
            self.scheme, self.host, self.port, self.path_base, self.graph
        )
    }
}

/// Default configuration file, `<config dir>/rexbatch/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rexbatch").join("config.toml"))
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ClientConfig`].
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {name}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// Settings are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "ConfigRead",
            ConfigError::Parse { .. } => "ConfigParse",
            ConfigError::InvalidEnv { .. } => "InvalidEnv",
            ConfigError::Invalid(_) => "InvalidConfig",
        }
    }
}
