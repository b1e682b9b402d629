//! In-process `GraphStore` test double backed by plain maps behind a
//! `std::sync::Mutex`. Exercises exactly the same identity-merge semantics
//! as the Bolt-backed store so integration tests can assert on invariants
//! without a live graph server.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use super::{
    symbol_key, AnomalyResult, CommitRollup, FileChange, GraphStore, HistoryPoint, ImportTarget,
    ResolvedImport,
};
use crate::errors::IngestError;
use crate::git::CommitMeta;
use crate::lang::Language;
use crate::manifest::{semver_major_bump, ManifestDependency};
use crate::parse::{Call, Symbol};

#[derive(Debug, Clone, Default)]
struct CommitRecord {
    repo_id: String,
    branch: String,
    committed_at: i64,
    author_key: String,
    rollup: CommitRollup,
}

#[derive(Debug, Clone)]
struct SymbolRecord {
    file_path: String,
    name: String,
    kind: &'static str,
}

/// A `(Commit)-[TOUCHED]->(File)` edge. Re-ingesting the same commit SETs
/// these fields (idempotent), unlike `TOUCHED_SYMBOL.lines_changed` or
/// `Contributor-TOUCHED.count`, which accumulate.
#[derive(Debug, Clone)]
pub struct TouchedEdge {
    pub status: crate::git::FileStatus,
    pub additions: u64,
    pub deletions: u64,
    pub old_path: Option<String>,
}

/// A `(Commit)-[UPDATES_DEP]->(Dependency)` edge.
#[derive(Debug, Clone)]
pub struct DependencyUpdate {
    pub sha: String,
    pub committed_at: i64,
    pub version: String,
    pub prev_version: String,
    pub is_major_bump: bool,
}

#[derive(Debug, Default)]
struct State {
    branch_cursor: HashMap<(String, String), (String, i64)>,
    commits: HashMap<String, CommitRecord>,
    /// repo_id -> branch -> list of (committed_at, sha) for window queries.
    branch_history: HashMap<(String, String), Vec<(i64, String, String)>>,
    symbols: HashMap<String, SymbolRecord>,
    /// file_path -> symbol keys declared in that file.
    file_symbols: HashMap<String, Vec<String>>,
    /// file_path -> imports recorded.
    file_imports: HashMap<String, Vec<ResolvedImport>>,
    /// symbol_key -> caller_key -> at_line (CALLS edges, deduped per pair).
    calls_edges: HashMap<String, Vec<(String, String)>>,
    /// (sha, path) -> TOUCHED edge.
    touched: HashMap<(String, String), TouchedEdge>,
    dependencies: HashMap<(String, String), Vec<DependencyUpdate>>,
    repo_packages: HashMap<String, String>,
    touched_symbol: HashMap<(String, String), u32>,
    contributor_touch: HashMap<(String, String), (u32, i64)>,
    anomalies: HashMap<String, AnomalyResult>,
}

pub struct MemoryGraphStore {
    state: Mutex<State>,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Test/inspection accessor: the set of `TOUCHED` edges recorded for `sha`.
    pub fn touched_for_commit(&self, sha: &str) -> Vec<(String, TouchedEdge)> {
        let state = self.state.lock().unwrap();
        state
            .touched
            .iter()
            .filter(|((s, _), _)| s == sha)
            .map(|((_, path), edge)| (path.clone(), edge.clone()))
            .collect()
    }

    pub fn commit_rollup(&self, sha: &str) -> Option<CommitRollup> {
        let state = self.state.lock().unwrap();
        state.commits.get(sha).map(|c| c.rollup.clone())
    }

    pub fn branch_cursor_sync(&self, repo_id: &str, branch: &str) -> Option<(String, i64)> {
        let state = self.state.lock().unwrap();
        state.branch_cursor.get(&(repo_id.to_string(), branch.to_string())).cloned()
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len()
    }

    /// Test/inspection accessor: callers connected to `target_file::target_name::target_kind`.
    pub fn calls_into(&self, target_file: &str, target_name: &str, target_kind: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let key = symbol_key(target_file, target_name, target_kind);
        state
            .calls_edges
            .get(&key)
            .map(|edges| edges.iter().map(|(caller, _)| caller.clone()).collect())
            .unwrap_or_default()
    }

    pub fn imports_for_file(&self, file_path: &str) -> Vec<ResolvedImport> {
        let state = self.state.lock().unwrap();
        state.file_imports.get(file_path).cloned().unwrap_or_default()
    }

    pub fn dependency_history(&self, ecosystem: &str, name: &str) -> Vec<DependencyUpdate> {
        let state = self.state.lock().unwrap();
        state
            .dependencies
            .get(&(ecosystem.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn repo_package(&self, repo_id: &str) -> Option<String> {
        self.state.lock().unwrap().repo_packages.get(repo_id).cloned()
    }

    pub fn touched_symbol_lines(&self, full_key: &str) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state
            .touched_symbol
            .iter()
            .find(|((_, k), _)| k == full_key)
            .map(|(_, v)| *v)
    }

    pub fn contributor_touch_count(&self, contributor_key: &str, file_path: &str) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state
            .contributor_touch
            .get(&(contributor_key.to_string(), file_path.to_string()))
            .map(|(count, _)| *count)
    }

    pub fn anomaly_for(&self, sha: &str) -> Option<AnomalyResult> {
        self.state.lock().unwrap().anomalies.get(sha).cloned()
    }
}

fn derive_hour_dow(committed_at: i64, tz_name: &str) -> (u32, u32) {
    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let utc = Utc.timestamp_opt(committed_at, 0).single().unwrap_or_default();
    let local = utc.with_timezone(&tz);
    (local.hour(), utc.weekday().num_days_from_monday())
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ensure_indexes(&self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn upsert_repo_branch(&self, _repo_id: &str, _branch: &str) -> Result<(), IngestError> {
        Ok(())
    }

    async fn get_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
    ) -> Result<Option<(String, i64)>, IngestError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .branch_cursor
            .get(&(repo_id.to_string(), branch.to_string()))
            .cloned())
    }

    async fn set_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
        sha: &str,
        committed_at: i64,
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state.branch_cursor.insert(
            (repo_id.to_string(), branch.to_string()),
            (sha.to_string(), committed_at),
        );
        Ok(())
    }

    async fn link_commit(
        &self,
        repo_id: &str,
        branch: &str,
        meta: &CommitMeta,
        changes: &[FileChange],
        anomaly_tz: &str,
    ) -> Result<CommitRollup, IngestError> {
        let lines_added: u64 = changes.iter().map(|c| c.additions).sum();
        let lines_deleted: u64 = changes.iter().map(|c| c.deletions).sum();
        let (hour, dow) = derive_hour_dow(meta.committed_at, anomaly_tz);
        let rollup = CommitRollup {
            files_changed: changes.len() as u32,
            lines_added,
            lines_deleted,
            lines_changed: lines_added + lines_deleted,
            hour,
            dow,
        };

        let author_key = if meta.author_email.is_empty() {
            meta.author_name.clone()
        } else {
            meta.author_email.clone()
        };

        let mut state = self.state.lock().unwrap();
        state.commits.insert(
            meta.sha.clone(),
            CommitRecord {
                repo_id: repo_id.to_string(),
                branch: branch.to_string(),
                committed_at: meta.committed_at,
                author_key: author_key.clone(),
                rollup: rollup.clone(),
            },
        );
        state
            .branch_history
            .entry((repo_id.to_string(), branch.to_string()))
            .or_default()
            .push((meta.committed_at, meta.sha.clone(), author_key));
        Ok(rollup)
    }

    async fn link_file_touch(
        &self,
        _repo_id: &str,
        _branch: &str,
        sha: &str,
        change: &FileChange,
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state.touched.insert(
            (sha.to_string(), change.path.clone()),
            TouchedEdge {
                status: change.status,
                additions: change.additions,
                deletions: change.deletions,
                old_path: change.old_path.clone(),
            },
        );
        Ok(())
    }

    async fn upsert_symbols(
        &self,
        file_path: &str,
        _lang: Language,
        symbols: &[Symbol],
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        for sym in symbols {
            let key = symbol_key(file_path, &sym.name, sym.kind.as_str());
            state.symbols.entry(key.clone()).or_insert(SymbolRecord {
                file_path: file_path.to_string(),
                name: sym.name.clone(),
                kind: sym.kind.as_str(),
            });
            let list = state.file_symbols.entry(file_path.to_string()).or_default();
            if !list.contains(&key) {
                list.push(key);
            }
        }
        Ok(())
    }

    async fn upsert_calls_intra_file(
        &self,
        file_path: &str,
        _sha: &str,
        calls: &[Call],
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        let callers = state
            .file_symbols
            .get(file_path)
            .cloned()
            .unwrap_or_default();
        let targets_in_file: Vec<String> = state
            .symbols
            .iter()
            .filter(|(_, rec)| rec.file_path == file_path)
            .map(|(k, _)| k.clone())
            .collect();

        for call in calls {
            for target_key in &targets_in_file {
                let rec = &state.symbols[target_key];
                if rec.name != call.name {
                    continue;
                }
                for caller_key in &callers {
                    let edge = state.calls_edges.entry(target_key.clone()).or_default();
                    let pair = (caller_key.clone(), call.start_line.to_string());
                    if !edge.contains(&pair) {
                        edge.push(pair);
                    }
                }
            }
        }
        Ok(())
    }

    async fn resolve_crossfile_calls(&self, file_path: &str, calls: &[Call]) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        let callers = state
            .file_symbols
            .get(file_path)
            .cloned()
            .unwrap_or_default();
        let imported_files: Vec<String> = state
            .file_imports
            .get(file_path)
            .map(|imports| {
                imports
                    .iter()
                    .filter_map(|i| match &i.target {
                        ImportTarget::File(f) => Some(f.clone()),
                        ImportTarget::Module => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        for call in calls {
            for target_file in &imported_files {
                let targets: Vec<String> = state
                    .symbols
                    .iter()
                    .filter(|(_, rec)| &rec.file_path == target_file && rec.name == call.name)
                    .map(|(k, _)| k.clone())
                    .collect();
                for target_key in targets {
                    for caller_key in &callers {
                        let edge = state.calls_edges.entry(target_key.clone()).or_default();
                        let pair = (caller_key.clone(), call.start_line.to_string());
                        if !edge.contains(&pair) {
                            edge.push(pair);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn upsert_imports(
        &self,
        file_path: &str,
        imports: &[ResolvedImport],
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state
            .file_imports
            .entry(file_path.to_string())
            .or_default()
            .extend(imports.iter().cloned());
        Ok(())
    }

    async fn upsert_dependencies(
        &self,
        repo_id: &str,
        sha: &str,
        committed_at: i64,
        deps: &[ManifestDependency],
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        for dep in deps {
            let key = (dep.ecosystem.to_string(), dep.name.clone());
            let history = state.dependencies.entry(key).or_default();
            let prev_version = history
                .iter()
                .filter(|u| u.committed_at < committed_at)
                .max_by_key(|u| u.committed_at)
                .map(|u| u.version.clone())
                .unwrap_or_default();
            let is_major_bump = semver_major_bump(&prev_version, &dep.version).unwrap_or(false);
            history.push(DependencyUpdate {
                sha: sha.to_string(),
                committed_at,
                version: dep.version.clone(),
                prev_version,
                is_major_bump,
            });
        }
        Ok(())
    }

    async fn link_repo_package(&self, repo_id: &str, name: &str) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state.repo_packages.insert(repo_id.to_string(), name.to_string());
        Ok(())
    }

    async fn touch_symbol(
        &self,
        sha: &str,
        file_path: &str,
        lines_by_symbol: &HashMap<String, u32>,
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        for (sym_key_suffix, delta) in lines_by_symbol {
            let full_key = format!("{file_path}::{sym_key_suffix}");
            let entry = state
                .touched_symbol
                .entry((sha.to_string(), full_key))
                .or_insert(0);
            *entry += delta;
        }
        Ok(())
    }

    async fn inc_contributor_file_touch(
        &self,
        contributor_key: &str,
        _contributor_name: &str,
        _contributor_email: &str,
        file_path: &str,
        touched_at: i64,
    ) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .contributor_touch
            .entry((contributor_key.to_string(), file_path.to_string()))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(touched_at);
        Ok(())
    }

    async fn anomaly_window(
        &self,
        repo_id: &str,
        branch: &str,
        author_key: &str,
        before_committed_at: i64,
        k: usize,
    ) -> Result<Vec<HistoryPoint>, IngestError> {
        let state = self.state.lock().unwrap();
        let mut history: Vec<&(i64, String, String)> = state
            .branch_history
            .get(&(repo_id.to_string(), branch.to_string()))
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        history.retain(|(t, _, author)| *t < before_committed_at && author == author_key);
        history.sort_by_key(|(t, _, _)| std::cmp::Reverse(*t));
        history.truncate(k);

        Ok(history
            .into_iter()
            .filter_map(|(_, sha, _)| state.commits.get(sha))
            .map(|rec| HistoryPoint {
                files_changed: rec.rollup.files_changed,
                lines_changed: rec.rollup.lines_changed,
                hour: rec.rollup.hour,
            })
            .collect())
    }

    async fn write_anomaly(&self, sha: &str, result: &AnomalyResult) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state.anomalies.insert(sha.to_string(), result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::SymbolKind;

    fn meta(sha: &str, committed_at: i64) -> CommitMeta {
        CommitMeta {
            sha: sha.to_string(),
            authored_at: committed_at,
            author_name: "Ada".to_string(),
            author_email: "ada@example.com".to_string(),
            committed_at,
            subject: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn branch_cursor_round_trips() {
        let store = MemoryGraphStore::new();
        assert!(store.get_branch_cursor("r", "main").await.unwrap().is_none());
        store.set_branch_cursor("r", "main", "abc", 100).await.unwrap();
        let cursor = store.get_branch_cursor("r", "main").await.unwrap();
        assert_eq!(cursor, Some(("abc".to_string(), 100)));
    }

    #[tokio::test]
    async fn link_commit_computes_rollup() {
        let store = MemoryGraphStore::new();
        let changes = vec![FileChange {
            path: "a.py".to_string(),
            status: crate::git::FileStatus::Modified,
            additions: 10,
            deletions: 5,
            old_path: None,
        }];
        let rollup = store
            .link_commit("r", "main", &meta("abc", 1_700_000_000), &changes, "UTC")
            .await
            .unwrap();
        assert_eq!(rollup.files_changed, 1);
        assert_eq!(rollup.lines_changed, 15);
    }

    #[tokio::test]
    async fn intra_file_call_links_matching_symbol() {
        let store = MemoryGraphStore::new();
        let symbols = vec![
            Symbol { kind: SymbolKind::Function, name: "foo".to_string(), start_line: 1, end_line: 3 },
            Symbol { kind: SymbolKind::Function, name: "bar".to_string(), start_line: 5, end_line: 7 },
        ];
        store.upsert_symbols("a.py", Language::Python, &symbols).await.unwrap();
        let calls = vec![Call { name: "bar".to_string(), start_line: 2, end_line: 2 }];
        store.upsert_calls_intra_file("a.py", "abc", &calls).await.unwrap();

        let state = store.state.lock().unwrap();
        let bar_key = symbol_key("a.py", "bar", "Function");
        assert!(state.calls_edges.get(&bar_key).is_some());
    }

    #[tokio::test]
    async fn anomaly_window_filters_by_author_and_time() {
        let store = MemoryGraphStore::new();
        for (sha, t) in [("c1", 100), ("c2", 200), ("c3", 300)] {
            let changes = vec![];
            store.link_commit("r", "main", &meta(sha, t), &changes, "UTC").await.unwrap();
        }
        let window = store
            .anomaly_window("r", "main", "ada@example.com", 300, 200)
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
    }
}
