//! The `GraphStore` protocol: an async trait both the Bolt-backed production
//! store and the in-memory test double implement, mirroring the teacher's
//! `RepositoryAccess`/`AuthenticationService` pattern of a narrow async trait
//! with identity-keyed operations.

mod bolt;
mod memory;

pub use bolt::BoltGraphStore;
pub use memory::MemoryGraphStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::IngestError;
use crate::git::{CommitMeta, FileStatus};
use crate::lang::Language;
use crate::manifest::ManifestDependency;
use crate::parse::{Call, Symbol};

#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
    pub additions: u64,
    pub deletions: u64,
    pub old_path: Option<String>,
}

impl FileChange {
    pub fn lines_changed(&self) -> u64 {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommitRollup {
    pub files_changed: u32,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub lines_changed: u64,
    pub hour: u32,
    pub dow: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyResult {
    pub z_files: f64,
    pub z_lines: f64,
    pub off_hours: bool,
    pub anomaly_score: f64,
    pub flags: Vec<String>,
}

/// One prior commit's shape, as read back for the anomaly window.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPoint {
    pub files_changed: u32,
    pub lines_changed: u64,
    pub hour: u32,
}

#[derive(Debug, Clone)]
pub enum ImportTarget {
    File(String),
    Module,
}

#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub module: String,
    pub member: Option<String>,
    pub alias: Option<String>,
    pub target: ImportTarget,
}

impl ResolvedImport {
    pub fn resolved(&self) -> bool {
        matches!(self.target, ImportTarget::File(_))
    }
}

/// Identity key for a `Symbol` node: `file_path::name::kind`.
pub fn symbol_key(file_path: &str, name: &str, kind: &str) -> String {
    format!("{file_path}::{name}::{kind}")
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn ensure_indexes(&self) -> Result<(), IngestError>;

    async fn upsert_repo_branch(&self, repo_id: &str, branch: &str) -> Result<(), IngestError>;

    async fn get_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
    ) -> Result<Option<(String, i64)>, IngestError>;

    async fn set_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
        sha: &str,
        committed_at: i64,
    ) -> Result<(), IngestError>;

    async fn link_commit(
        &self,
        repo_id: &str,
        branch: &str,
        meta: &CommitMeta,
        changes: &[FileChange],
        anomaly_tz: &str,
    ) -> Result<CommitRollup, IngestError>;

    async fn link_file_touch(
        &self,
        repo_id: &str,
        branch: &str,
        sha: &str,
        change: &FileChange,
    ) -> Result<(), IngestError>;

    async fn upsert_symbols(
        &self,
        file_path: &str,
        lang: Language,
        symbols: &[Symbol],
    ) -> Result<(), IngestError>;

    /// Records calls observed in `file_path` at `sha` and immediately wires
    /// the intra-file edges: every symbol declared in the file is connected
    /// as caller to any same-file symbol whose name matches a call name.
    async fn upsert_calls_intra_file(
        &self,
        file_path: &str,
        sha: &str,
        calls: &[Call],
    ) -> Result<(), IngestError>;

    /// Resolves `calls` (the same call list just passed to
    /// `upsert_calls_intra_file` for `file_path`) against symbols declared in
    /// files `file_path` `IMPORTS` with `resolved=true`. The caller side
    /// stays imprecise (every symbol declared in `file_path` is connected),
    /// but the target side must match the call's name.
    async fn resolve_crossfile_calls(&self, file_path: &str, calls: &[Call]) -> Result<(), IngestError>;

    async fn upsert_imports(
        &self,
        file_path: &str,
        imports: &[ResolvedImport],
    ) -> Result<(), IngestError>;

    async fn upsert_dependencies(
        &self,
        repo_id: &str,
        sha: &str,
        committed_at: i64,
        deps: &[ManifestDependency],
    ) -> Result<(), IngestError>;

    async fn link_repo_package(&self, repo_id: &str, name: &str) -> Result<(), IngestError>;

    /// `lines_by_symbol` maps a symbol's `(name, kind)` key to the
    /// additional lines-changed delta to accumulate for this commit.
    async fn touch_symbol(
        &self,
        sha: &str,
        file_path: &str,
        lines_by_symbol: &HashMap<String, u32>,
    ) -> Result<(), IngestError>;

    async fn inc_contributor_file_touch(
        &self,
        contributor_key: &str,
        contributor_name: &str,
        contributor_email: &str,
        file_path: &str,
        touched_at: i64,
    ) -> Result<(), IngestError>;

    /// Up to `k` prior commits by `author_key` on `branch`, strictly earlier
    /// than `before_committed_at`.
    async fn anomaly_window(
        &self,
        repo_id: &str,
        branch: &str,
        author_key: &str,
        before_committed_at: i64,
        k: usize,
    ) -> Result<Vec<HistoryPoint>, IngestError>;

    async fn write_anomaly(&self, sha: &str, result: &AnomalyResult) -> Result<(), IngestError>;
}
