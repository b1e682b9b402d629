//! Thin typed wrapper over the system `git` binary: commit enumeration,
//! per-commit metadata/numstat/name-status, hunk-range parsing, and blob
//! retrieval at a specific commit.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output};

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::IngestError;
use crate::utils::decode_lossy;

#[derive(Debug, Clone, Default)]
pub struct CommitMeta {
    pub sha: String,
    pub authored_at: i64,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: i64,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
            FileStatus::Renamed => "R",
        }
    }

    fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => FileStatus::Added,
            Some('D') => FileStatus::Deleted,
            Some('R') => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NameStatusEntry {
    pub status: FileStatus,
    pub old_path: Option<String>,
}

fn hunk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap())
}

#[derive(Clone)]
pub struct GitDriver {
    repo_path: std::path::PathBuf,
}

impl GitDriver {
    pub fn new(repo_path: impl AsRef<Path>) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }

    pub fn is_repo(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(".git").exists()
    }

    pub fn mark_safe(path: impl AsRef<Path>) -> Result<(), IngestError> {
        run(&[
            "config",
            "--global",
            "--add",
            "safe.directory",
            &path.as_ref().to_string_lossy(),
        ])
        .map(|_| ())
    }

    fn run(&self, args: &[&str]) -> Result<Output, IngestError> {
        let mut full = vec!["-C", self.repo_path.to_str().unwrap_or(".")];
        full.extend_from_slice(args);
        run(&full)
    }

    /// Like `run`, but for callers with no legitimate "missing" outcome to
    /// fall back to: a non-zero exit is always a hard failure here, unlike
    /// `resolve`/`file_at`/`file_exists_at`, which interpret it as a sentinel.
    fn run_checked(&self, args: &[&str]) -> Result<Output, IngestError> {
        let out = self.run(args)?;
        if out.status.success() {
            Ok(out)
        } else {
            Err(IngestError::git(format!(
                "git {args:?} exited with {}: {}",
                out.status,
                decode_lossy(&out.stderr).trim()
            )))
        }
    }

    fn stdout_lines(&self, args: &[&str]) -> Result<Vec<String>, IngestError> {
        let out = self.run_checked(args)?;
        Ok(decode_lossy(&out.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }

    pub fn resolve(&self, rev: &str) -> Result<Option<String>, IngestError> {
        match self.run(&["rev-parse", rev]) {
            Ok(out) if out.status.success() => {
                let sha = decode_lossy(&out.stdout).trim().to_string();
                Ok(if sha.is_empty() { None } else { Some(sha) })
            }
            _ => Ok(None),
        }
    }

    /// Oldest-first list of commits on `branch`. `start_exclusive` narrows to
    /// `(start..branch]`; `max` of 0 means unbounded.
    pub fn commits_since(
        &self,
        branch: &str,
        start_exclusive: Option<&str>,
        max: usize,
    ) -> Result<Vec<String>, IngestError> {
        let range = match start_exclusive {
            Some(sha) => format!("{sha}..{branch}"),
            None => branch.to_string(),
        };
        let mut args = vec!["rev-list".to_string(), "--reverse".to_string()];
        if max > 0 {
            args.push(format!("--max-count={max}"));
        }
        args.push(range);
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        Ok(self
            .stdout_lines(&arg_refs)?
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect())
    }

    pub fn commit_meta(&self, sha: &str) -> Result<CommitMeta, IngestError> {
        let fmt = "%H%n%at%n%an%n%ae%n%ct%n%s";
        let out = self.run_checked(&["show", "-s", &format!("--format={fmt}"), sha])?;
        let text = decode_lossy(&out.stdout);
        let mut lines = text.lines();
        let sha = lines.next().unwrap_or_default().to_string();
        let authored_at = lines.next().unwrap_or("0").parse().unwrap_or(0);
        let author_name = lines.next().unwrap_or_default().to_string();
        let author_email = lines.next().unwrap_or_default().to_string();
        let committed_at = lines.next().unwrap_or("0").parse().unwrap_or(0);
        let subject = lines.next().unwrap_or_default().to_string();
        Ok(CommitMeta {
            sha,
            authored_at,
            author_name,
            author_email,
            committed_at,
            subject,
        })
    }

    pub fn numstat(&self, sha: &str) -> Result<HashMap<String, (u64, u64)>, IngestError> {
        let out = self.run_checked(&["show", "--numstat", "--format=", sha])?;
        let mut result = HashMap::new();
        for line in decode_lossy(&out.stdout).lines() {
            let parts: Vec<&str> = line.splitn(3, '\t').collect();
            if parts.len() < 3 {
                continue;
            }
            let adds = parts[0].parse().unwrap_or(0);
            let dels = parts[1].parse().unwrap_or(0);
            result.insert(parts[2].trim().to_string(), (adds, dels));
        }
        Ok(result)
    }

    pub fn name_status(
        &self,
        sha: &str,
        rename_threshold: u8,
    ) -> Result<HashMap<String, NameStatusEntry>, IngestError> {
        let m_flag = format!("-M{rename_threshold}%");
        let c_flag = format!("-C{rename_threshold}%");
        let out = self.run_checked(&[
            "show",
            "--name-status",
            &m_flag,
            &c_flag,
            "--format=",
            sha,
        ])?;
        let mut result = HashMap::new();
        for line in decode_lossy(&out.stdout).lines() {
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            let code = parts[0];
            if code.starts_with('R') {
                if parts.len() >= 3 {
                    result.insert(
                        parts[2].trim().to_string(),
                        NameStatusEntry {
                            status: FileStatus::Renamed,
                            old_path: Some(parts[1].trim().to_string()),
                        },
                    );
                }
            } else if parts.len() >= 2 {
                result.insert(
                    parts[1].trim().to_string(),
                    NameStatusEntry {
                        status: FileStatus::from_code(code),
                        old_path: None,
                    },
                );
            }
        }
        Ok(result)
    }

    /// 1-based inclusive `(start, end)` line ranges for added/changed lines
    /// in the new-file side of `path` at `sha`, parsed from a zero-context
    /// unified diff's hunk headers.
    pub fn added_line_ranges(&self, sha: &str, path: &str) -> Result<Vec<(u32, u32)>, IngestError> {
        let out = self.run_checked(&["show", "--unified=0", "--format=", sha, "--", path])?;
        let mut ranges = Vec::new();
        for line in decode_lossy(&out.stdout).lines() {
            if !line.starts_with("@@") {
                continue;
            }
            if let Some(caps) = hunk_re().captures(line) {
                let new_start: u32 = caps.get(3).unwrap().as_str().parse().unwrap_or(0);
                let new_count: u32 = caps
                    .get(4)
                    .map(|m| m.as_str())
                    .unwrap_or("1")
                    .parse()
                    .unwrap_or(1);
                if new_count == 0 || new_start == 0 {
                    continue;
                }
                ranges.push((new_start, new_start + new_count - 1));
            }
        }
        Ok(ranges)
    }

    pub fn file_at(&self, sha: &str, path: &str) -> Result<Option<Vec<u8>>, IngestError> {
        let spec = format!("{sha}:{path}");
        let out = self.run(&["show", &spec])?;
        if out.status.success() {
            Ok(Some(out.stdout))
        } else {
            Ok(None)
        }
    }

    pub fn file_exists_at(&self, sha: &str, path: &str) -> bool {
        let spec = format!("{sha}:{path}");
        matches!(self.run(&["cat-file", "-e", &spec]), Ok(o) if o.status.success())
    }
}

fn run(args: &[&str]) -> Result<Output, IngestError> {
    Command::new("git")
        .args(args)
        .output()
        .map_err(|e| IngestError::git(format!("failed to spawn git {args:?}: {e}")))
}

/// Overlap length (>= 0) between two inclusive 1-based line ranges.
pub fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> u32 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    end.saturating_sub(start).saturating_add(if end >= start { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hunk_header() {
        let line = "@@ -10,3 +20,5 @@ fn foo() {";
        let caps = hunk_re().captures(line).unwrap();
        assert_eq!(&caps[3], "20");
        assert_eq!(&caps[4], "5");
    }

    #[test]
    fn ranges_overlap_computes_intersection() {
        assert_eq!(ranges_overlap((1, 10), (5, 15)), 6);
        assert_eq!(ranges_overlap((1, 3), (4, 6)), 0);
        assert_eq!(ranges_overlap((1, 1), (1, 1)), 1);
    }

    #[test]
    fn file_status_from_code_prefixes() {
        assert_eq!(FileStatus::from_code("A"), FileStatus::Added);
        assert_eq!(FileStatus::from_code("R100"), FileStatus::Renamed);
        assert_eq!(FileStatus::from_code("M"), FileStatus::Modified);
    }

    quickcheck::quickcheck! {
        fn ranges_overlap_is_commutative(a_start: u16, a_len: u16, b_start: u16, b_len: u16) -> bool {
            let a = (a_start as u32 + 1, a_start as u32 + 1 + a_len as u32);
            let b = (b_start as u32 + 1, b_start as u32 + 1 + b_len as u32);
            ranges_overlap(a, b) == ranges_overlap(b, a)
        }

        fn ranges_overlap_never_exceeds_shorter_span(a_start: u16, a_len: u16, b_start: u16, b_len: u16) -> bool {
            let a = (a_start as u32 + 1, a_start as u32 + 1 + a_len as u32);
            let b = (b_start as u32 + 1, b_start as u32 + 1 + b_len as u32);
            ranges_overlap(a, b) <= (a_len as u32 + 1).min(b_len as u32 + 1)
        }
    }
}
