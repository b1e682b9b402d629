//! Status reporting back to the caller that triggered an ingest: either a
//! live HTTP PATCH, or an offline JSON file drop, selected once at startup
//! by `BACKEND_MODE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::StatusSinkConfig;
use crate::errors::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusValue {
    Queued,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl StatusValue {
    fn as_str(self) -> &'static str {
        match self {
            StatusValue::Queued => "queued",
            StatusValue::InProgress => "in_progress",
            StatusValue::Completed => "completed",
            StatusValue::Skipped => "skipped",
            StatusValue::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

impl StatusPayload {
    pub fn new(status: StatusValue, message: impl Into<String>) -> Self {
        Self {
            status: status.as_str(),
            message: message.into(),
            started_at: None,
            finished_at: None,
            commit_id: None,
        }
    }

    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_id = Some(sha.into());
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, task_id: &str, payload: StatusPayload);
}

pub struct HttpStatusSink {
    client: reqwest::Client,
    backend_url: String,
    internal_token: Option<String>,
}

impl HttpStatusSink {
    pub fn new(config: &StatusSinkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_url: config.backend_url.clone(),
            internal_token: config.internal_token.clone(),
        }
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn report(&self, task_id: &str, payload: StatusPayload) {
        let url = format!("{}/graph/build/{}/status", self.backend_url, task_id);
        let mut req = self.client.patch(&url).json(&payload);
        if let Some(token) = &self.internal_token {
            req = req.header("x-internal-token", token.as_str());
        }
        if let Err(e) = req.send().await {
            warn!(task_id, error = %e, "status sink HTTP report failed");
        }
    }
}

pub struct OfflineStatusSink {
    out_dir: std::path::PathBuf,
}

impl OfflineStatusSink {
    pub fn new(config: &StatusSinkConfig) -> Self {
        Self {
            out_dir: config.offline_out_dir.clone(),
        }
    }

    fn path_for(&self, task_id: &str) -> std::path::PathBuf {
        self.out_dir.join("task_status").join(format!("{task_id}.json"))
    }
}

#[async_trait]
impl StatusSink for OfflineStatusSink {
    async fn report(&self, task_id: &str, payload: StatusPayload) {
        let path = self.path_for(task_id);
        if let Err(e) = write_offline(&path, &payload).await {
            warn!(task_id, error = %e, "status sink offline write failed");
        }
    }
}

async fn write_offline(path: &std::path::Path, payload: &StatusPayload) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(payload)
        .map_err(|e| IngestError::StatusSink(e.to_string()))?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

pub fn build_status_sink(config: &StatusSinkConfig) -> Box<dyn StatusSink> {
    if config.mode_online {
        Box::new(HttpStatusSink::new(config))
    } else {
        Box::new(OfflineStatusSink::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_sink_writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StatusSinkConfig {
            mode_online: false,
            backend_url: String::new(),
            internal_token: None,
            offline_out_dir: dir.path().to_path_buf(),
        };
        let sink = OfflineStatusSink::new(&config);
        sink.report("task-1", StatusPayload::new(StatusValue::Completed, "done")).await;

        let path = dir.path().join("task_status").join("task-1.json");
        let body = tokio::fs::read_to_string(path).await.unwrap();
        assert!(body.contains("\"completed\""));
    }

    #[test]
    fn build_status_sink_selects_offline_by_default() {
        let config = StatusSinkConfig::default();
        let sink = build_status_sink(&config);
        // exercised via trait object construction only; behavior covered above.
        drop(sink);
    }
}
