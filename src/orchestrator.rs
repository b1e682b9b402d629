//! Top-level per-branch ingest procedure: walks commits oldest-first from
//! the stored (or overridden) cursor, projecting each into the graph and
//! scoring it for anomaly, advancing the cursor only after a commit's
//! projection fully succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::anomaly;
use crate::config::Config;
use crate::errors::IngestError;
use crate::git::{FileStatus, GitDriver};
use crate::graph::{FileChange, GraphStore, ImportTarget, ResolvedImport};
use crate::imports;
use crate::lang::{Language, LanguageRegistry};
use crate::manifest;
use crate::parse::{ExtractionEngine, ParseOutcome, Symbol};
use crate::status::{StatusPayload, StatusSink, StatusValue};

pub struct IngestRequest {
    pub repo_id: String,
    pub branch: String,
    pub repo_path: std::path::PathBuf,
    pub start_sha: Option<String>,
    pub task_id: String,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    status: Arc<dyn StatusSink>,
    extraction: ExtractionEngine,
    config: Config,
    /// Bounded pool that runs the heavy per-file work (blob reads, parsing,
    /// import resolution) for one commit's changed files concurrently.
    /// Sized from `config.walk.workers` (`WALK_WORKERS`).
    parse_pool: Arc<rayon::ThreadPool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        status: Arc<dyn StatusSink>,
        extraction: ExtractionEngine,
        config: Config,
    ) -> Self {
        let parse_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.walk.workers.max(1))
            .thread_name(|i| format!("repograph-parse-{i}"))
            .build()
            .expect("failed to build parse worker pool");
        Self {
            store,
            status,
            extraction,
            config,
            parse_pool: Arc::new(parse_pool),
        }
    }

    pub async fn run(&self, req: IngestRequest) {
        self.status
            .report(&req.task_id, StatusPayload::new(StatusValue::InProgress, "starting ingest"))
            .await;

        match self.run_inner(&req).await {
            Ok(0) => {
                self.status
                    .report(&req.task_id, StatusPayload::new(StatusValue::Completed, "no new commits"))
                    .await;
            }
            Ok(n) => {
                self.status
                    .report(
                        &req.task_id,
                        StatusPayload::new(StatusValue::Completed, format!("ingested {n} commits")),
                    )
                    .await;
            }
            Err(e) => {
                error!(repo_id = %req.repo_id, branch = %req.branch, error = %e, "ingest aborted");
                self.status
                    .report(&req.task_id, StatusPayload::new(StatusValue::Failed, e.to_string()))
                    .await;
            }
        }
    }

    async fn run_inner(&self, req: &IngestRequest) -> Result<usize, IngestError> {
        let git = GitDriver::new(&req.repo_path);
        if !GitDriver::is_repo(&req.repo_path) {
            return Err(IngestError::InvalidInput(format!(
                "{} is not a git repository",
                req.repo_path.display()
            )));
        }

        self.store.ensure_indexes().await?;
        self.store.upsert_repo_branch(&req.repo_id, &req.branch).await?;

        let start_exclusive = match &req.start_sha {
            Some(sha) => Some(sha.clone()),
            None => self
                .store
                .get_branch_cursor(&req.repo_id, &req.branch)
                .await?
                .map(|(sha, _)| sha),
        };

        let commits = git.commits_since(
            &req.branch,
            start_exclusive.as_deref(),
            self.config.walk.max_commits,
        )?;
        if commits.is_empty() {
            return Ok(0);
        }

        let mut ingested = 0usize;
        for (idx, sha) in commits.iter().enumerate() {
            match self.ingest_one_commit(&git, req, sha).await {
                Ok(()) => {
                    ingested += 1;
                }
                Err(e) => {
                    warn!(sha, repo_id = %req.repo_id, branch = %req.branch, error = %e, "skipping commit after failure");
                    continue;
                }
            }

            if (idx + 1) as u64 % self.config.walk.progress_every.max(1) == 0 {
                self.status
                    .report(
                        &req.task_id,
                        StatusPayload::new(
                            StatusValue::InProgress,
                            format!("ingested {}/{} commits", idx + 1, commits.len()),
                        )
                        .with_commit(sha),
                    )
                    .await;
            }
        }

        Ok(ingested)
    }

    async fn ingest_one_commit(
        &self,
        git: &GitDriver,
        req: &IngestRequest,
        sha: &str,
    ) -> Result<(), IngestError> {
        let meta = git.commit_meta(sha)?;
        let numstat = git.numstat(sha)?;
        let name_status = git.name_status(sha, 50)?;

        let mut changes: Vec<FileChange> = Vec::new();
        for (path, entry) in &name_status {
            let (additions, deletions) = numstat.get(path).copied().unwrap_or((0, 0));
            changes.push(FileChange {
                path: path.clone(),
                status: entry.status,
                additions,
                deletions,
                old_path: entry.old_path.clone(),
            });
        }
        for (path, (additions, deletions)) in &numstat {
            if !name_status.contains_key(path) {
                changes.push(FileChange {
                    path: path.clone(),
                    status: FileStatus::Modified,
                    additions: *additions,
                    deletions: *deletions,
                    old_path: None,
                });
            }
        }

        self.store
            .link_commit(&req.repo_id, &req.branch, &meta, &changes, &self.config.anomaly_tz)
            .await?;

        let heavy_results = self.compute_heavy_results(git, sha, &changes).await?;
        let file_writes = changes
            .iter()
            .zip(heavy_results)
            .map(|(change, heavy)| self.ingest_one_file(req, sha, &meta, change, heavy));
        futures::future::join_all(file_writes).await;

        let author_key = if meta.author_email.is_empty() {
            meta.author_name.clone()
        } else {
            meta.author_email.clone()
        };
        let history = self
            .store
            .anomaly_window(&req.repo_id, &req.branch, &author_key, meta.committed_at, 200)
            .await?;
        let files_changed = changes.len() as u32;
        let lines_changed: u64 = changes.iter().map(|c| c.lines_changed()).sum();
        let (hour, _) = {
            use chrono::{TimeZone, Timelike};
            let tz: chrono_tz::Tz = self.config.anomaly_tz.parse().unwrap_or(chrono_tz::UTC);
            let local = Utc
                .timestamp_opt(meta.committed_at, 0)
                .single()
                .unwrap_or_default()
                .with_timezone(&tz);
            (local.hour(), 0u32)
        };
        let result = anomaly::score_commit(files_changed, lines_changed, hour, &history, None);
        self.store.write_anomaly(sha, &result).await?;

        self.store
            .set_branch_cursor(&req.repo_id, &req.branch, sha, meta.committed_at)
            .await?;

        info!(sha, repo_id = %req.repo_id, branch = %req.branch, "commit ingested");
        Ok(())
    }

    /// Computes the heavy, CPU/IO-bound per-file work for every changed file
    /// in a commit concurrently, via a bounded `rayon` pool. Bridged from
    /// async code with `spawn_blocking` since none of this work is async.
    async fn compute_heavy_results(
        &self,
        git: &GitDriver,
        sha: &str,
        changes: &[FileChange],
    ) -> Result<Vec<HeavyFileResult>, IngestError> {
        let git = git.clone();
        let extraction = self.extraction.clone();
        let config = self.config.clone();
        let sha = sha.to_string();
        let changes = changes.to_vec();
        let pool = self.parse_pool.clone();

        tokio::task::spawn_blocking(move || {
            pool.install(|| {
                changes
                    .par_iter()
                    .map(|change| compute_heavy_for_change(&git, &extraction, &config, &sha, change))
                    .collect()
            })
        })
        .await
        .map_err(|e| IngestError::Other(format!("parse worker pool task panicked: {e}")))
    }

    async fn ingest_one_file(
        &self,
        req: &IngestRequest,
        sha: &str,
        meta: &crate::git::CommitMeta,
        change: &FileChange,
        heavy: HeavyFileResult,
    ) {
        if let Err(e) = self
            .store
            .link_file_touch(&req.repo_id, &req.branch, sha, change)
            .await
        {
            warn!(path = %change.path, error = %e, "link_file_touch failed");
            return;
        }

        if !heavy.manifest_deps.is_empty() {
            if let Err(e) = self
                .store
                .upsert_dependencies(&req.repo_id, sha, meta.committed_at, &heavy.manifest_deps)
                .await
            {
                warn!(path = %change.path, error = %e, "upsert_dependencies failed");
            }
        }
        if let Some(name) = &heavy.manifest_self_name {
            if let Err(e) = self.store.link_repo_package(&req.repo_id, name).await {
                warn!(error = %e, "link_repo_package failed");
            }
        }

        if let Some(lang) = heavy.lang {
            if !heavy.resolved_imports.is_empty() {
                if let Err(e) = self.store.upsert_imports(&change.path, &heavy.resolved_imports).await {
                    warn!(path = %change.path, error = %e, "upsert_imports failed");
                }
            }
            if let Some(outcome) = heavy.parse_outcome {
                self.link_symbols_and_calls(sha, change, lang, outcome, &heavy.added_line_ranges)
                    .await;
            }
        }

        let contributor_key = if meta.author_email.is_empty() {
            meta.author_name.clone()
        } else {
            meta.author_email.clone()
        };
        if let Err(e) = self
            .store
            .inc_contributor_file_touch(
                &contributor_key,
                &meta.author_name,
                &meta.author_email,
                &change.path,
                meta.committed_at,
            )
            .await
        {
            warn!(path = %change.path, error = %e, "inc_contributor_file_touch failed");
        }
    }

    async fn link_symbols_and_calls(
        &self,
        sha: &str,
        change: &FileChange,
        lang: Language,
        outcome: ParseOutcome,
        ranges: &[(u32, u32)],
    ) {
        if let Err(e) = self.store.upsert_symbols(&change.path, lang, &outcome.symbols).await {
            warn!(path = %change.path, error = %e, "upsert_symbols failed");
            return;
        }
        if let Err(e) = self
            .store
            .upsert_calls_intra_file(&change.path, sha, &outcome.calls)
            .await
        {
            warn!(path = %change.path, error = %e, "upsert_calls_intra_file failed");
        }
        if let Err(e) = self
            .store
            .resolve_crossfile_calls(&change.path, &outcome.calls)
            .await
        {
            warn!(path = %change.path, error = %e, "resolve_crossfile_calls failed");
        }

        let lines_by_symbol = churn_by_symbol(&outcome.symbols, ranges);
        if !lines_by_symbol.is_empty() {
            if let Err(e) = self.store.touch_symbol(sha, &change.path, &lines_by_symbol).await {
                warn!(path = %change.path, error = %e, "touch_symbol failed");
            }
        }
    }
}

/// Per-file work independent of every other file in the same commit:
/// manifest parsing, import resolution, symbol/call extraction, and diff
/// hunk parsing. Computed off the async runtime by the `parse_pool`.
struct HeavyFileResult {
    manifest_deps: Vec<manifest::ManifestDependency>,
    manifest_self_name: Option<String>,
    lang: Option<Language>,
    resolved_imports: Vec<ResolvedImport>,
    parse_outcome: Option<ParseOutcome>,
    added_line_ranges: Vec<(u32, u32)>,
}

fn compute_heavy_for_change(
    git: &GitDriver,
    extraction: &ExtractionEngine,
    config: &Config,
    sha: &str,
    change: &FileChange,
) -> HeavyFileResult {
    let mut result = HeavyFileResult {
        manifest_deps: Vec::new(),
        manifest_self_name: None,
        lang: None,
        resolved_imports: Vec::new(),
        parse_outcome: None,
        added_line_ranges: Vec::new(),
    };

    let basename = change.path.rsplit('/').next().unwrap_or(&change.path);
    if manifest::is_manifest_filename(basename) {
        if let Ok(Some(blob)) = git.file_at(sha, &change.path) {
            result.manifest_deps = manifest::parse_manifest(basename, &blob);
            if basename == "package.json" {
                result.manifest_self_name = manifest::package_json_self_name(&blob);
            }
        }
    }

    let Some(lang) = LanguageRegistry::language_for_path(&change.path) else {
        return result;
    };
    result.lang = Some(lang);
    let is_code = LanguageRegistry::is_code_path(&change.path);

    if change.status != FileStatus::Deleted && is_code {
        if let Ok(Some(blob)) = git.file_at(sha, &change.path) {
            let import_specs = extraction.extract_imports(lang, &blob);
            result.resolved_imports = import_specs
                .into_iter()
                .map(|spec| {
                    let target =
                        imports::resolve_local_module_path(git, &change.path, &spec.module, lang, sha)
                            .map(ImportTarget::File)
                            .unwrap_or(ImportTarget::Module);
                    ResolvedImport {
                        module: spec.module,
                        member: spec.member,
                        alias: spec.alias,
                        target,
                    }
                })
                .collect();

            let too_large = change.lines_changed() > config.walk.large_diff_cutoff;
            if !too_large {
                let outcome = extraction.extract_symbols(lang, &blob);
                if !outcome.is_empty() {
                    result.added_line_ranges = git.added_line_ranges(sha, &change.path).unwrap_or_default();
                    result.parse_outcome = Some(outcome);
                }
            }
        }
    }

    result
}

/// Maps `name::kind` to the total overlap length between each symbol's
/// line span and the commit's added/changed line ranges.
fn churn_by_symbol(symbols: &[Symbol], ranges: &[(u32, u32)]) -> HashMap<String, u32> {
    let mut out = HashMap::new();
    for sym in symbols {
        let mut total = 0u32;
        for range in ranges {
            total += crate::git::ranges_overlap((sym.start_line, sym.end_line), *range);
        }
        if total > 0 {
            out.insert(format!("{}::{}", sym.name, sym.kind.as_str()), total);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn churn_attributes_overlap_to_symbol() {
        let symbols = vec![Symbol {
            kind: crate::parse::SymbolKind::Function,
            name: "foo".to_string(),
            start_line: 10,
            end_line: 20,
        }];
        let ranges = vec![(15, 25)];
        let result = churn_by_symbol(&symbols, &ranges);
        assert_eq!(result.get("foo::Function"), Some(&6));
    }

    #[test]
    fn churn_skips_symbols_with_no_overlap() {
        let symbols = vec![Symbol {
            kind: crate::parse::SymbolKind::Function,
            name: "foo".to_string(),
            start_line: 1,
            end_line: 5,
        }];
        let ranges = vec![(10, 20)];
        assert!(churn_by_symbol(&symbols, &ranges).is_empty());
    }
}
