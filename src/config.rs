use serde::Deserialize;
use std::path::{Path, PathBuf};

/// When to measure end-to-end page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadTrigger {
    /// No page-load measurement.
    #[default]
    None,
    /// Measure once the server reports ready.
    OnStartUp,
    /// Measure once dependency prebundling finishes.
    OnPrebundle,
}

/// Top-level configuration loaded from vitemark.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct VitemarkConfig {
    pub vite: ViteConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ViteConfig {
    /// Dev-server executable.
    pub command: String,
    /// Arguments the server is started with. The default enables the debug
    /// scopes the milestone patterns depend on.
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between the last milestone and teardown, letting the final
    /// status line settle.
    pub grace_delay_ms: u64,
    pub page_load_timeout_secs: u64,
}

impl Default for ViteConfig {
    fn default() -> Self {
        Self {
            command: "vite".to_string(),
            args: vec!["--debug".to_string(), "deps,config,esbuild".to_string()],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: 1000,
            page_load_timeout_secs: 30,
        }
    }
}

/// Immutable inputs for one measurement run: CLI options merged over the
/// config file.
#[derive(Debug)]
pub struct RunConfig {
    /// Forwarded to the dev server to bypass its dependency cache.
    pub force: bool,
    pub load_trigger: LoadTrigger,
    pub vite: ViteConfig,
    pub session: SessionConfig,
}

/// Errors loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load(path: &Path) -> Result<VitemarkConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(VitemarkConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
