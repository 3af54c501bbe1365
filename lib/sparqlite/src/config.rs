//! Connection settings.

use serde::{Deserialize, Serialize};
use sparqlite_engine::EvaluationOptions;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a [`Connection`](crate::Connection) behaves.
///
/// The options can be built in code with the `with_*` setters or read from TOML, where every
/// field is optional:
///
/// ```toml
/// read_only = false
/// statement_cache_capacity = 250
/// write_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Updates and batches fail with [`SparqlError::ReadOnly`](crate::SparqlError::ReadOnly).
    pub read_only: bool,
    /// Inserted blank nodes stay blank nodes instead of being skolemized into `urn:bnode:` IRIs.
    pub anonymous_blank_nodes: bool,
    /// The default graph of queries is the union of all graphs.
    pub union_default_graph: bool,
    /// Capacity of the compiled statement caches, 0 disables caching.
    pub statement_cache_capacity: usize,
    /// Maximum wait for the write slot, `None` waits forever.
    pub write_timeout_ms: Option<u64>,
    /// Flush the journal of on-disk stores to the disk at each commit.
    pub sync_on_commit: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            anonymous_blank_nodes: false,
            union_default_graph: true,
            statement_cache_capacity: 100,
            write_timeout_ms: None,
            sync_on_commit: true,
        }
    }
}

impl ConnectionOptions {
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_anonymous_blank_nodes(mut self, anonymous_blank_nodes: bool) -> Self {
        self.anonymous_blank_nodes = anonymous_blank_nodes;
        self
    }

    pub fn with_union_default_graph(mut self, union_default_graph: bool) -> Self {
        self.union_default_graph = union_default_graph;
        self
    }

    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout_ms =
            timeout.map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_sync_on_commit(mut self, sync_on_commit: bool) -> Self {
        self.sync_on_commit = sync_on_commit;
        self
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn evaluation_options(&self) -> EvaluationOptions {
        EvaluationOptions {
            union_default_graph: self.union_default_graph,
            anonymous_blank_nodes: self.anonymous_blank_nodes,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Where the data of a [`Connection`](crate::Connection) lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreLocation {
    /// An ephemeral store dropped with the connection.
    #[default]
    Memory,
    /// A store persisted in the given directory.
    Path(PathBuf),
}

impl From<PathBuf> for StoreLocation {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for StoreLocation {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Option<PathBuf>> for StoreLocation {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Memory, Self::Path)
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read the configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize the configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
