//! Trigger API: a thin `axum` router that accepts a build request, clones
//! the target repository into a scratch directory if needed, and spawns
//! the orchestrator in the background. Peripheral glue, not core ingestion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::IngestError;
use crate::git::GitDriver;
use crate::graph::GraphStore;
use crate::orchestrator::{IngestRequest, Orchestrator};
use crate::parse::ExtractionEngine;
use crate::status::StatusSink;

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub repo_id: String,
    pub task_id: String,
    pub branch: Option<String>,
    pub repo_path: Option<String>,
    pub start_sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct BuildAccepted {
    status: &'static str,
    #[serde(rename = "taskId")]
    task_id: String,
    repo: String,
    branch: String,
}

pub struct AppState {
    pub store: Arc<dyn GraphStore>,
    pub status: Arc<dyn StatusSink>,
    pub extraction: ExtractionEngine,
    pub config: Config,
    /// `(repo_id, branch)` pairs with a build currently in flight, guarding
    /// against two overlapping triggers clobbering the same cursor.
    pub in_flight: DashSet<(String, String)>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/internal/build", post(trigger_build))
        .with_state(state)
}

async fn trigger_build(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildRequest>,
) -> impl IntoResponse {
    let branch = req.branch.clone().unwrap_or_else(|| "main".to_string());
    let repo = req.repo_id.clone();
    let task_id = req.task_id.clone();

    if !state.in_flight.insert((repo.clone(), branch.clone())) {
        return (
            StatusCode::CONFLICT,
            Json(BuildAccepted {
                status: "already_in_progress",
                task_id,
                repo,
                branch,
            }),
        );
    }

    let accepted = BuildAccepted {
        status: "queued",
        task_id: task_id.clone(),
        repo: repo.clone(),
        branch: branch.clone(),
    };

    tokio::spawn(async move {
        if let Err(e) = run_triggered_build(state.clone(), req, branch.clone()).await {
            error!(task_id = %task_id, error = %e, "triggered build failed");
        }
        let _ = state.in_flight.remove(&(repo, branch));
    });

    (StatusCode::ACCEPTED, Json(accepted))
}

async fn run_triggered_build(
    state: Arc<AppState>,
    req: BuildRequest,
    branch: String,
) -> Result<(), IngestError> {
    let (repo_path, scratch) = match req.repo_path {
        Some(path) => (PathBuf::from(path), None),
        None => {
            let scratch = tempfile::tempdir().map_err(IngestError::from)?;
            clone_repo(&req.repo_id, scratch.path(), state.config.walk.shallow_clone).await?;
            let path = scratch.path().to_path_buf();
            (path, Some(scratch))
        }
    };

    GitDriver::mark_safe(&repo_path)?;

    let orchestrator = Orchestrator::new(
        state.store.clone(),
        state.status.clone(),
        state.extraction.clone(),
        state.config.clone(),
    );
    orchestrator
        .run(IngestRequest {
            repo_id: req.repo_id,
            branch,
            repo_path,
            start_sha: req.start_sha,
            task_id: req.task_id,
        })
        .await;

    // `TempDir`'s drop performs best-effort recursive cleanup; retried
    // manually here for Windows-style transient lock failures.
    if let Some(dir) = scratch {
        cleanup_robust(dir.path()).await;
    }
    Ok(())
}

async fn clone_repo(repo_id: &str, dest: &Path, shallow: bool) -> Result<(), IngestError> {
    let mut cmd = Command::new("gh");
    cmd.arg("repo").arg("clone").arg(repo_id).arg(dest);
    if shallow {
        cmd.arg("--").arg("--depth").arg("1");
    }
    let output = cmd
        .output()
        .await
        .map_err(|e| IngestError::git(format!("gh repo clone failed to spawn: {e}")))?;
    if !output.status.success() {
        return Err(IngestError::git(format!(
            "gh repo clone {repo_id} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Best-effort recursive directory removal that tolerates read-only files
/// and transient lock errors (common on Windows runners) by retrying a
/// handful of times with a short backoff before giving up.
async fn cleanup_robust(path: &Path) {
    for attempt in 0..5 {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => return,
            Err(e) if attempt == 4 => {
                warn!(path = %path.display(), error = %e, "scratch cleanup failed after retries");
                return;
            }
            Err(_) => {
                tokio::time::sleep(std::time::Duration::from_millis(100 * (attempt + 1))).await;
            }
        }
    }
}

pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_deserializes_minimal_payload() {
        let json = r#"{"repo_id":"owner/name","task_id":"t1"}"#;
        let req: BuildRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.repo_id, "owner/name");
        assert!(req.branch.is_none());
    }
}
