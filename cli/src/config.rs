//! `chainsync.yaml` loading and command-line overrides.
//!
//! ```yaml
//! node:
//!   url: http://localhost:8545
//! elasticsearch:
//!   url: http://localhost:9200
//!   legacy_types: false
//! cursor:
//!   backend: file
//!   path: ./chainsync-cursor.json
//! sync:
//!   id: mainnet
//!   chain: ethereum
//!   start_height: 0
//!   batch_size: 50
//! log:
//!   level: info
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainsync_core::sync::SyncConfig;
use chainsync_search::ElasticConfig;

use crate::logging::LogConfig;

/// Everything the binary needs to assemble a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub elasticsearch: ElasticConfig,
    pub cursor: CursorConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint of the node.
    pub url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub backend: CursorBackend,
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            backend: CursorBackend::File,
            path: PathBuf::from("./chainsync-cursor.json"),
        }
    }
}

/// Values given on the command line or through `CHAINSYNC_*` variables.
/// `None` keeps whatever the file (or the default) says.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub es_url: Option<String>,
    pub cursor_path: Option<PathBuf>,
    pub sync_id: Option<String>,
    pub chain: Option<String>,
    pub start_height: Option<u64>,
    pub stop_at: Option<u64>,
    pub batch_size: Option<u64>,
    pub log_level: Option<String>,
    pub log_json: bool,
}

impl AppConfig {
    /// Read `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                Self::from_yaml(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply(&mut self, o: Overrides) {
        if let Some(url) = o.rpc_url {
            self.node.url = url;
        }
        if let Some(url) = o.es_url {
            self.elasticsearch.url = url;
        }
        if let Some(path) = o.cursor_path {
            self.cursor.path = path;
        }
        if let Some(id) = o.sync_id {
            self.sync.id = id;
        }
        if let Some(chain) = o.chain {
            self.sync.chain = chain;
        }
        if let Some(h) = o.start_height {
            self.sync.start_height = h;
        }
        if o.stop_at.is_some() {
            self.sync.stop_at = o.stop_at;
        }
        if let Some(n) = o.batch_size {
            self.sync.batch_size = n;
        }
        if let Some(level) = o.log_level {
            self.log.level = level;
        }
        if o.log_json {
            self.log.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_all_defaults() {
        let cfg = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg.node.url, "http://localhost:8545");
        assert_eq!(cfg.elasticsearch.url, "http://localhost:9200");
        assert_eq!(cfg.cursor.backend, CursorBackend::File);
        assert_eq!(cfg.sync.batch_size, 50);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn parses_full_file() {
        let cfg = AppConfig::from_yaml(
            r#"
node:
  url: http://geth:8545
elasticsearch:
  url: http://es:9200
  legacy_types: true
  username: elastic
cursor:
  backend: sqlite
  path: /var/lib/chainsync/cursor.db
sync:
  id: mainnet-es
  start_height: 19000000
  stop_at: 19001000
  max_reorg_depth: 64
  retry:
    max_retries: 3
log:
  level: debug
  json: true
"#,
        )
        .unwrap();

        assert_eq!(cfg.node.url, "http://geth:8545");
        assert!(cfg.elasticsearch.legacy_types);
        assert_eq!(cfg.elasticsearch.username.as_deref(), Some("elastic"));
        assert_eq!(cfg.cursor.backend, CursorBackend::Sqlite);
        assert_eq!(cfg.sync.id, "mainnet-es");
        assert_eq!(cfg.sync.stop_at, Some(19_001_000));
        assert_eq!(cfg.sync.max_reorg_depth, 64);
        assert_eq!(cfg.sync.retry.max_retries, 3);
        // untouched fields keep their defaults
        assert_eq!(cfg.sync.lag_threshold, 6);
        assert!(cfg.log.json);
    }

    #[test]
    fn overrides_win_over_file() {
        let mut cfg = AppConfig::from_yaml("sync:\n  start_height: 10\n  batch_size: 5\n").unwrap();
        cfg.apply(Overrides {
            rpc_url: Some("http://other:8545".into()),
            start_height: Some(42),
            log_json: true,
            ..Default::default()
        });
        assert_eq!(cfg.node.url, "http://other:8545");
        assert_eq!(cfg.sync.start_height, 42);
        assert_eq!(cfg.sync.batch_size, 5);
        assert!(cfg.log.json);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainsync.yaml");
        std::fs::write(&path, "sync:\n  chain: sepolia\n").unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.sync.chain, "sepolia");

        assert!(AppConfig::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn unknown_cursor_backend_is_rejected() {
        assert!(AppConfig::from_yaml("cursor:\n  backend: redis\n").is_err());
    }
}
