//! Environment-driven configuration, built once per process and threaded
//! explicitly through the orchestrator rather than held as global state.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphStoreConfig {
    pub uri: String,
    pub batch_size: usize,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            batch_size: 5000,
        }
    }
}

impl GraphStoreConfig {
    fn from_env() -> Self {
        let uri = match env::var("MEMGRAPH_URI") {
            Ok(v) if !v.is_empty() => v,
            _ => {
                let host = env::var("MEMGRAPH_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("MEMGRAPH_PORT").unwrap_or_else(|_| "7687".to_string());
                format!("bolt://{host}:{port}")
            }
        };
        let batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);
        Self { uri, batch_size }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatusSinkConfig {
    pub mode_online: bool,
    pub backend_url: String,
    pub internal_token: Option<String>,
    pub offline_out_dir: PathBuf,
}

impl Default for StatusSinkConfig {
    fn default() -> Self {
        Self {
            mode_online: false,
            backend_url: "http://localhost:3000".to_string(),
            internal_token: None,
            offline_out_dir: PathBuf::from(".offline_out"),
        }
    }
}

impl StatusSinkConfig {
    fn from_env() -> Self {
        let mode_online = matches!(env::var("BACKEND_MODE").as_deref(), Ok("online"));
        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let internal_token = env::var("INTERNAL_API_TOKEN").ok().filter(|v| !v.is_empty());
        let offline_out_dir = env::var("OFFLINE_OUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".offline_out"));
        Self {
            mode_online,
            backend_url,
            internal_token,
            offline_out_dir,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalkConfig {
    pub max_commits: usize,
    pub workers: usize,
    pub shallow_clone: bool,
    pub large_diff_cutoff: u64,
    pub progress_every: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_commits: 0,
            workers: num_cpus::get().min(8).max(1),
            shallow_clone: false,
            large_diff_cutoff: 200_000,
            progress_every: 20,
        }
    }
}

impl WalkConfig {
    fn from_env() -> Self {
        let default_workers = num_cpus::get().min(8).max(1);
        Self {
            max_commits: env_usize("WALK_MAX_COMMITS", 0),
            workers: env_usize("WALK_WORKERS", default_workers),
            shallow_clone: env_bool("SHALLOW_CLONE", false),
            large_diff_cutoff: env_u64("LARGE_DIFF_CUTOFF", 200_000),
            progress_every: env_u64("PROGRESS_EVERY", 20),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub graph: GraphStoreConfig,
    pub status: StatusSinkConfig,
    pub walk: WalkConfig,
    pub anomaly_tz: String,
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph: GraphStoreConfig::default(),
            status: StatusSinkConfig::default(),
            walk: WalkConfig::default(),
            anomaly_tz: "UTC".to_string(),
            export_dir: PathBuf::from("exports"),
        }
    }
}

impl Config {
    /// Build configuration from process environment variables, falling back
    /// to the documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            graph: GraphStoreConfig::from_env(),
            status: StatusSinkConfig::from_env(),
            walk: WalkConfig::from_env(),
            anomaly_tz: env::var("ANOMALY_TZ").unwrap_or_else(|_| "UTC".to_string()),
            export_dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("exports")),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !matches!(v.as_str(), "0" | "false" | "False" | ""),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_graph_uri() {
        assert_eq!(GraphStoreConfig::default().uri, "bolt://localhost:7687");
    }

    #[test]
    fn default_walk_workers_bounded() {
        assert!(WalkConfig::default().workers <= 8);
        assert!(WalkConfig::default().workers >= 1);
    }

    #[test]
    fn status_sink_defaults_offline() {
        assert!(!StatusSinkConfig::default().mode_online);
    }
}
