use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;

/// Tunables for one runtime context. Every field has a default, so an empty
/// TOML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Nested calls allowed before a script faults with a stack overflow
    /// (R007). Script calls grow the native stack on demand, so any depth is
    /// safe on the embedder's thread.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Buffer `print` output for `take_output` instead of writing to stdout.
    #[serde(default = "default_false")]
    pub capture_output: bool,

    /// Open the base, `math` and `string` libraries on creation.
    #[serde(default = "default_true")]
    pub open_stdlib: bool,

    /// Run a collection before an allocation that would push heap usage
    /// past this many bytes.
    #[serde(default)]
    pub gc_threshold: Option<usize>,
}

fn default_max_call_depth() -> usize { 200 }
fn default_true() -> bool { true }
fn default_false() -> bool { false }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
            capture_output: false,
            open_stdlib: true,
            gc_threshold: None,
        }
    }
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }
}
