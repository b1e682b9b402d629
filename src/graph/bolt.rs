//! Bolt-backed `GraphStore`, speaking to Memgraph/Neo4j over `neo4rs`.
//! Writes are batched in groups of `batch_size` via `UNWIND` and retried
//! with bounded exponential backoff on transient transport errors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use neo4rs::{query, Graph, Row};
use tracing::{debug, warn};

use super::{
    symbol_key, AnomalyResult, CommitRollup, FileChange, GraphStore, HistoryPoint, ImportTarget,
    ResolvedImport,
};
use crate::config::GraphStoreConfig;
use crate::errors::IngestError;
use crate::git::CommitMeta;
use crate::lang::Language;
use crate::manifest::ManifestDependency;
use crate::parse::{Call, Symbol};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 200;

pub struct BoltGraphStore {
    graph: Graph,
    batch_size: usize,
}

impl BoltGraphStore {
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self, IngestError> {
        let graph = Graph::new(&config.uri, "", "")
            .await
            .map_err(|e| IngestError::graph(format!("connect to {}: {e}", config.uri)))?;
        Ok(Self {
            graph,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn run_with_retry(&self, q: neo4rs::Query) -> Result<(), IngestError> {
        let mut attempt = 0;
        let mut delay = BASE_DELAY_MS;
        loop {
            attempt += 1;
            match self.graph.run(q.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(IngestError::GraphStoreRetriesExhausted {
                        attempts: attempt,
                        source_msg: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "graph write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn rows(&self, q: neo4rs::Query) -> Result<Vec<Row>, IngestError> {
        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| IngestError::graph(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| IngestError::graph(e.to_string()))?
        {
            out.push(row);
        }
        Ok(out)
    }
}

fn derive_hour_dow(committed_at: i64, tz_name: &str) -> (u32, u32) {
    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let utc: DateTime<Utc> = Utc.timestamp_opt(committed_at, 0).single().unwrap_or_default();
    let local = utc.with_timezone(&tz);
    (local.hour(), utc.weekday().num_days_from_monday())
}

#[async_trait]
impl GraphStore for BoltGraphStore {
    async fn ensure_indexes(&self) -> Result<(), IngestError> {
        let statements = [
            "CREATE INDEX ON :Repo(id)",
            "CREATE INDEX ON :Branch(id)",
            "CREATE INDEX ON :Commit(sha)",
            "CREATE INDEX ON :Contributor(key)",
            "CREATE INDEX ON :File(path)",
            "CREATE INDEX ON :Symbol(key)",
            "CREATE INDEX ON :Dependency(ecosystem, name)",
        ];
        for stmt in statements {
            if let Err(e) = self.graph.run(query(stmt)).await {
                debug!(stmt, error = %e, "index creation skipped (likely already exists)");
            }
        }
        Ok(())
    }

    async fn upsert_repo_branch(&self, repo_id: &str, branch: &str) -> Result<(), IngestError> {
        let branch_id = format!("{repo_id}#{branch}");
        let q = query(
            "MERGE (r:Repo {id: $repo_id}) \
             MERGE (b:Branch {id: $branch_id}) SET b.name = $branch \
             MERGE (r)-[:HAS_BRANCH]->(b)",
        )
        .param("repo_id", repo_id)
        .param("branch_id", branch_id)
        .param("branch", branch);
        self.run_with_retry(q).await
    }

    async fn get_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
    ) -> Result<Option<(String, i64)>, IngestError> {
        let branch_id = format!("{repo_id}#{branch}");
        let q = query("MATCH (b:Branch {id: $branch_id}) RETURN b.last_sha AS sha, b.last_time AS t")
            .param("branch_id", branch_id);
        let rows = self.rows(q).await?;
        let Some(row) = rows.first() else { return Ok(None) };
        let sha: Option<String> = row.get("sha").ok();
        let t: Option<i64> = row.get("t").ok();
        Ok(match (sha, t) {
            (Some(sha), Some(t)) if !sha.is_empty() => Some((sha, t)),
            _ => None,
        })
    }

    async fn set_branch_cursor(
        &self,
        repo_id: &str,
        branch: &str,
        sha: &str,
        committed_at: i64,
    ) -> Result<(), IngestError> {
        let branch_id = format!("{repo_id}#{branch}");
        let q = query(
            "MATCH (b:Branch {id: $branch_id}) SET b.last_sha = $sha, b.last_time = $t",
        )
        .param("branch_id", branch_id)
        .param("sha", sha)
        .param("t", committed_at);
        self.run_with_retry(q).await
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
        let branch_id = format!("{repo_id}#{branch}");

        let q = query(
            "MATCH (b:Branch {id: $branch_id}) \
             MERGE (c:Commit {sha: $sha}) \
             SET c.authored_at = $authored_at, c.committed_at = $committed_at, \
                 c.message = $message, c.files_changed = $files_changed, \
                 c.lines_added = $lines_added, c.lines_deleted = $lines_deleted, \
                 c.lines_changed = $lines_changed, c.hour = $hour, c.dow = $dow \
             MERGE (b)-[:HAS_COMMIT]->(c) \
             MERGE (a:Contributor {key: $author_key}) SET a.name = $author_name, a.email = $author_email \
             MERGE (a)-[:AUTHORED]->(c)",
        )
        .param("branch_id", branch_id)
        .param("sha", meta.sha.as_str())
        .param("authored_at", meta.authored_at)
        .param("committed_at", meta.committed_at)
        .param("message", meta.subject.as_str())
        .param("files_changed", rollup.files_changed as i64)
        .param("lines_added", rollup.lines_added as i64)
        .param("lines_deleted", rollup.lines_deleted as i64)
        .param("lines_changed", rollup.lines_changed as i64)
        .param("hour", hour as i64)
        .param("dow", dow as i64)
        .param("author_key", author_key)
        .param("author_name", meta.author_name.as_str())
        .param("author_email", meta.author_email.as_str());

        self.run_with_retry(q).await?;
        Ok(rollup)
    }

    async fn link_file_touch(
        &self,
        repo_id: &str,
        branch: &str,
        sha: &str,
        change: &FileChange,
    ) -> Result<(), IngestError> {
        let ext = crate::utils::extension_of(&change.path);
        let is_code = crate::lang::LanguageRegistry::is_code_path(&change.path);
        let q = query(
            "MATCH (c:Commit {sha: $sha}) \
             MERGE (f:File {path: $path}) SET f.repo_id = $repo_id, f.branch = $branch, f.ext = $ext, f.is_code = $is_code \
             MERGE (c)-[t:TOUCHED]->(f) \
             SET t.status = $status, t.additions = $additions, t.deletions = $deletions, t.old_path = $old_path",
        )
        .param("sha", sha)
        .param("path", change.path.as_str())
        .param("repo_id", repo_id)
        .param("branch", branch)
        .param("ext", ext)
        .param("is_code", is_code)
        .param("status", change.status.as_str())
        .param("additions", change.additions as i64)
        .param("deletions", change.deletions as i64)
        .param("old_path", change.old_path.clone().unwrap_or_default());
        self.run_with_retry(q).await
    }

    async fn upsert_symbols(
        &self,
        file_path: &str,
        lang: Language,
        symbols: &[Symbol],
    ) -> Result<(), IngestError> {
        for chunk in symbols.chunks(self.batch_size) {
            let rows: Vec<HashMap<String, neo4rs::BoltType>> = chunk
                .iter()
                .map(|s| {
                    let mut m = HashMap::new();
                    m.insert("key".to_string(), symbol_key(file_path, &s.name, s.kind.as_str()).into());
                    m.insert("name".to_string(), s.name.clone().into());
                    m.insert("kind".to_string(), s.kind.as_str().into());
                    m.insert("start_line".to_string(), (s.start_line as i64).into());
                    m.insert("end_line".to_string(), (s.end_line as i64).into());
                    m
                })
                .collect();
            let q = query(
                "MATCH (f:File {path: $path}) \
                 UNWIND $rows AS row \
                 MERGE (s:Symbol {key: row.key}) \
                 SET s.name = row.name, s.kind = row.kind, s.lang = $lang, \
                     s.start_line = row.start_line, s.end_line = row.end_line \
                 MERGE (f)-[:DECLARES]->(s)",
            )
            .param("path", file_path)
            .param("lang", lang.name())
            .param("rows", rows);
            self.run_with_retry(q).await?;
        }
        Ok(())
    }

    async fn upsert_calls_intra_file(
        &self,
        file_path: &str,
        _sha: &str,
        calls: &[Call],
    ) -> Result<(), IngestError> {
        for call in calls {
            let q = query(
                "MATCH (f:File {path: $path})-[:DECLARES]->(caller:Symbol) \
                 MATCH (f)-[:DECLARES]->(target:Symbol {name: $name}) \
                 MERGE (caller)-[r:CALLS]->(target) SET r.at_line = $at_line",
            )
            .param("path", file_path)
            .param("name", call.name.as_str())
            .param("at_line", call.start_line as i64);
            self.run_with_retry(q).await?;
        }
        Ok(())
    }

    async fn resolve_crossfile_calls(&self, file_path: &str, calls: &[Call]) -> Result<(), IngestError> {
        for call in calls {
            let q = query(
                "MATCH (f:File {path: $path})-[:IMPORTS {resolved: true}]->(f2:File) \
                 MATCH (f)-[:DECLARES]->(caller:Symbol) \
                 MATCH (f2)-[:DECLARES]->(target:Symbol {name: $name}) \
                 MERGE (caller)-[r:CALLS]->(target) SET r.at_line = $at_line",
            )
            .param("path", file_path)
            .param("name", call.name.as_str())
            .param("at_line", call.start_line as i64);
            self.run_with_retry(q).await?;
        }
        Ok(())
    }

    async fn upsert_imports(
        &self,
        file_path: &str,
        imports: &[ResolvedImport],
    ) -> Result<(), IngestError> {
        for imp in imports {
            match &imp.target {
                ImportTarget::File(target_path) => {
                    let q = query(
                        "MATCH (f:File {path: $path}) \
                         MERGE (t:File {path: $target}) \
                         MERGE (f)-[r:IMPORTS]->(t) \
                         SET r.module = $module, r.member = $member, r.alias = $alias, r.resolved = true",
                    )
                    .param("path", file_path)
                    .param("target", target_path.as_str())
                    .param("module", imp.module.as_str())
                    .param("member", imp.member.clone().unwrap_or_default())
                    .param("alias", imp.alias.clone().unwrap_or_default());
                    self.run_with_retry(q).await?;
                }
                ImportTarget::Module => {
                    let q = query(
                        "MATCH (f:File {path: $path}) \
                         MERGE (m:Module {spec: $module}) \
                         MERGE (f)-[r:IMPORTS]->(m) \
                         SET r.module = $module, r.member = $member, r.alias = $alias, r.resolved = false",
                    )
                    .param("path", file_path)
                    .param("module", imp.module.as_str())
                    .param("member", imp.member.clone().unwrap_or_default())
                    .param("alias", imp.alias.clone().unwrap_or_default());
                    self.run_with_retry(q).await?;
                }
            }
        }
        Ok(())
    }

    async fn upsert_dependencies(
        &self,
        repo_id: &str,
        sha: &str,
        committed_at: i64,
        deps: &[ManifestDependency],
    ) -> Result<(), IngestError> {
        for dep in deps {
            let prev_q = query(
                "MATCH (:Dependency {ecosystem: $ecosystem, name: $name})<-[:UPDATES_DEP]-(prevc:Commit) \
                 WHERE prevc.committed_at < $committed_at \
                 RETURN prevc.version AS version ORDER BY prevc.committed_at DESC LIMIT 1",
            )
            .param("ecosystem", dep.ecosystem)
            .param("name", dep.name.as_str())
            .param("committed_at", committed_at);
            let prev_version = self
                .rows(prev_q)
                .await?
                .first()
                .and_then(|row| row.get::<String>("version").ok())
                .unwrap_or_default();
            let is_major = crate::manifest::semver_major_bump(&prev_version, &dep.version).unwrap_or(false);

            let q = query(
                "MATCH (c:Commit {sha: $sha}) \
                 MERGE (d:Dependency {ecosystem: $ecosystem, name: $name}) \
                 MERGE (c)-[r:UPDATES_DEP]->(d) \
                 SET r.version = $version, r.prev_version = $prev_version, r.is_major_bump = $is_major",
            )
            .param("sha", sha)
            .param("ecosystem", dep.ecosystem)
            .param("name", dep.name.as_str())
            .param("version", dep.version.as_str())
            .param("prev_version", prev_version)
            .param("is_major", is_major);
            self.run_with_retry(q).await?;
        }
        Ok(())
    }

    async fn link_repo_package(&self, repo_id: &str, name: &str) -> Result<(), IngestError> {
        let q = query(
            "MATCH (r:Repo {id: $repo_id}) \
             MERGE (d:Dependency {ecosystem: 'npm', name: $name}) \
             MERGE (d)-[:HAS_REPO]->(r)",
        )
        .param("repo_id", repo_id)
        .param("name", name);
        self.run_with_retry(q).await
    }

    async fn touch_symbol(
        &self,
        sha: &str,
        file_path: &str,
        lines_by_symbol: &HashMap<String, u32>,
    ) -> Result<(), IngestError> {
        for (suffix, delta) in lines_by_symbol {
            let key = format!("{file_path}::{suffix}");
            let q = query(
                "MATCH (c:Commit {sha: $sha}) MATCH (s:Symbol {key: $key}) \
                 MERGE (c)-[t:TOUCHED_SYMBOL]->(s) \
                 SET t.lines_changed = coalesce(t.lines_changed, 0) + $delta",
            )
            .param("sha", sha)
            .param("key", key)
            .param("delta", *delta as i64);
            self.run_with_retry(q).await?;
        }
        Ok(())
    }

    async fn inc_contributor_file_touch(
        &self,
        contributor_key: &str,
        contributor_name: &str,
        contributor_email: &str,
        file_path: &str,
        touched_at: i64,
    ) -> Result<(), IngestError> {
        let q = query(
            "MERGE (a:Contributor {key: $key}) SET a.name = $name, a.email = $email \
             MERGE (f:File {path: $path}) \
             MERGE (a)-[t:TOUCHED]->(f) \
             SET t.count = coalesce(t.count, 0) + 1, \
                 t.last_touched_at = CASE WHEN coalesce(t.last_touched_at, 0) < $touched_at THEN $touched_at ELSE t.last_touched_at END",
        )
        .param("key", contributor_key)
        .param("name", contributor_name)
        .param("email", contributor_email)
        .param("path", file_path)
        .param("touched_at", touched_at);
        self.run_with_retry(q).await
    }

    async fn anomaly_window(
        &self,
        repo_id: &str,
        branch: &str,
        author_key: &str,
        before_committed_at: i64,
        k: usize,
    ) -> Result<Vec<HistoryPoint>, IngestError> {
        let branch_id = format!("{repo_id}#{branch}");
        let q = query(
            "MATCH (b:Branch {id: $branch_id})-[:HAS_COMMIT]->(c:Commit)<-[:AUTHORED]-(a:Contributor {key: $author_key}) \
             WHERE c.committed_at < $before \
             RETURN c.files_changed AS files_changed, c.lines_changed AS lines_changed, c.hour AS hour \
             ORDER BY c.committed_at DESC LIMIT $k",
        )
        .param("branch_id", branch_id)
        .param("author_key", author_key)
        .param("before", before_committed_at)
        .param("k", k as i64);

        let rows = self.rows(q).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let files_changed: i64 = row.get("files_changed").ok()?;
                let lines_changed: i64 = row.get("lines_changed").ok()?;
                let hour: i64 = row.get("hour").ok()?;
                Some(HistoryPoint {
                    files_changed: files_changed.max(0) as u32,
                    lines_changed: lines_changed.max(0) as u64,
                    hour: hour.max(0) as u32,
                })
            })
            .collect())
    }

    async fn write_anomaly(&self, sha: &str, result: &AnomalyResult) -> Result<(), IngestError> {
        let q = query(
            "MATCH (c:Commit {sha: $sha}) \
             SET c.z_files = $z_files, c.z_lines = $z_lines, c.off_hours = $off_hours, \
                 c.anomaly_score = $anomaly_score, c.anomaly_flags = $flags",
        )
        .param("sha", sha)
        .param("z_files", result.z_files)
        .param("z_lines", result.z_lines)
        .param("off_hours", result.off_hours)
        .param("anomaly_score", result.anomaly_score)
        .param("flags", result.flags.clone());
        self.run_with_retry(q).await
    }
}
