//! End-to-end scenarios exercised against `MemoryGraphStore`, mirroring
//! the literal-valued walkthroughs in the project's design document.

use std::collections::HashMap;

use repograph::anomaly::score_commit;
use repograph::git::{CommitMeta, FileStatus};
use repograph::graph::{
    FileChange, GraphStore, HistoryPoint, ImportTarget, MemoryGraphStore, ResolvedImport,
};
use repograph::lang::Language;
use repograph::manifest::parse_package_json;
use repograph::parse::{Call, Symbol, SymbolKind};

fn meta(sha: &str, committed_at: i64, author_email: &str) -> CommitMeta {
    CommitMeta {
        sha: sha.to_string(),
        authored_at: committed_at,
        author_name: "Author".to_string(),
        author_email: author_email.to_string(),
        committed_at,
        subject: format!("commit {sha}"),
    }
}

#[tokio::test]
async fn s1_fresh_ingest_rollups_and_rename() {
    let store = MemoryGraphStore::new();
    let repo = "owner/repo";
    let branch = "main";

    let changes_a = vec![FileChange {
        path: "src/a.py".to_string(),
        status: FileStatus::Added,
        additions: 10,
        deletions: 0,
        old_path: None,
    }];
    let rollup_a = store
        .link_commit(repo, branch, &meta("A", 100, "ada@example.com"), &changes_a, "UTC")
        .await
        .unwrap();
    assert_eq!(rollup_a.files_changed, 1);
    assert_eq!(rollup_a.lines_changed, 10);

    let changes_b = vec![
        FileChange {
            path: "src/a.py".to_string(),
            status: FileStatus::Modified,
            additions: 2,
            deletions: 1,
            old_path: None,
        },
        FileChange {
            path: "src/b.py".to_string(),
            status: FileStatus::Added,
            additions: 20,
            deletions: 0,
            old_path: None,
        },
    ];
    let rollup_b = store
        .link_commit(repo, branch, &meta("B", 200, "ada@example.com"), &changes_b, "UTC")
        .await
        .unwrap();
    assert_eq!(rollup_b.files_changed, 2);
    assert_eq!(rollup_b.lines_changed, 23);

    let changes_c = vec![FileChange {
        path: "src/pkg/b.py".to_string(),
        status: FileStatus::Renamed,
        additions: 0,
        deletions: 0,
        old_path: Some("src/b.py".to_string()),
    }];
    let rollup_c = store
        .link_commit(repo, branch, &meta("C", 300, "ada@example.com"), &changes_c, "UTC")
        .await
        .unwrap();
    assert_eq!(rollup_c.files_changed, 1);
    assert_eq!(rollup_c.lines_changed, 0);

    for (sha, change) in [("A", &changes_a[0]), ("B", &changes_b[0]), ("C", &changes_c[0])] {
        store.link_file_touch(repo, branch, sha, change).await.unwrap();
    }
    let touched_c = store.touched_for_commit("C");
    assert_eq!(touched_c.len(), 1);
    assert_eq!(touched_c[0].1.status, FileStatus::Renamed);
    assert_eq!(touched_c[0].1.old_path.as_deref(), Some("src/b.py"));

    assert_eq!(store.commit_count(), 3);
}

#[tokio::test]
async fn s2_resolved_import_wires_cross_file_call() {
    let store = MemoryGraphStore::new();

    let foo_def = Symbol {
        kind: SymbolKind::Function,
        name: "foo".to_string(),
        start_line: 1,
        end_line: 2,
    };
    store
        .upsert_symbols("src/b.py", Language::Python, &[foo_def])
        .await
        .unwrap();

    let caller_def = Symbol {
        kind: SymbolKind::Function,
        name: "use_foo".to_string(),
        start_line: 1,
        end_line: 3,
    };
    store
        .upsert_symbols("src/a.py", Language::Python, &[caller_def])
        .await
        .unwrap();

    let imports = vec![ResolvedImport {
        module: ".b".to_string(),
        member: Some("foo".to_string()),
        alias: None,
        target: ImportTarget::File("src/b.py".to_string()),
    }];
    store.upsert_imports("src/a.py", &imports).await.unwrap();
    assert!(store.imports_for_file("src/a.py")[0].resolved());

    let calls = vec![Call {
        name: "foo".to_string(),
        start_line: 2,
        end_line: 2,
    }];
    store.upsert_calls_intra_file("src/a.py", "sha1", &calls).await.unwrap();
    store.resolve_crossfile_calls("src/a.py", &calls).await.unwrap();

    let callers = store.calls_into("src/b.py", "foo", "Function");
    assert!(callers.iter().any(|c| c.contains("use_foo")));
}

#[tokio::test]
async fn s3_unresolved_import_has_no_target_file() {
    let store = MemoryGraphStore::new();
    let imports = vec![ResolvedImport {
        module: "numpy".to_string(),
        member: None,
        alias: None,
        target: ImportTarget::Module,
    }];
    store.upsert_imports("src/a.py", &imports).await.unwrap();
    let stored = store.imports_for_file("src/a.py");
    assert!(!stored[0].resolved());
}

#[tokio::test]
async fn s4_manifest_bump_tracks_prev_version_and_major_bump() {
    let blob_x = br#"{"dependencies":{"react":"^17.0.2"}}"#;
    let blob_y = br#"{"dependencies":{"react":"^18.1.0"}}"#;

    let deps_x = parse_package_json(blob_x);
    let deps_y = parse_package_json(blob_y);

    let store = MemoryGraphStore::new();
    store.upsert_dependencies("owner/repo", "X", 100, &deps_x).await.unwrap();
    store.upsert_dependencies("owner/repo", "Y", 200, &deps_y).await.unwrap();

    let history = store.dependency_history("npm", "react");
    assert_eq!(history.len(), 2);

    assert_eq!(history[0].version, "^17.0.2");
    assert_eq!(history[0].prev_version, "");
    assert!(!history[0].is_major_bump);

    assert_eq!(history[1].version, "^18.1.0");
    assert_eq!(history[1].prev_version, "^17.0.2");
    assert!(history[1].is_major_bump);
}

#[tokio::test]
async fn s5_anomaly_spike_saturates_score() {
    // Mild variance in the history (not all-identical) so the z-score guard
    // doesn't zero out, then a commit many standard deviations past it.
    let history: Vec<HistoryPoint> = (0..50)
        .map(|i| HistoryPoint {
            files_changed: if i % 4 == 2 { 3 } else if i % 4 == 0 { 1 } else { 2 },
            lines_changed: if i % 4 == 2 { 30 } else if i % 4 == 0 { 10 } else { 20 },
            hour: 14,
        })
        .collect();
    let result = score_commit(200, 3_000, 3, &history, None);
    assert!(result.z_files >= 3.0);
    assert!(result.z_lines >= 3.0);
    assert!(result.off_hours);
    assert_eq!(result.anomaly_score, 10.0);
    assert_eq!(result.flags.len(), 3);
    assert!(result.flags.contains(&"files_spike".to_string()));
    assert!(result.flags.contains(&"lines_spike".to_string()));
    assert!(result.flags.contains(&"off_hours".to_string()));
}

#[tokio::test]
async fn s6_resume_with_no_new_commits_leaves_cursor_unchanged() {
    let store = MemoryGraphStore::new();
    let repo = "owner/repo";
    let branch = "main";
    store
        .link_commit(repo, branch, &meta("A", 100, "ada@example.com"), &[], "UTC")
        .await
        .unwrap();
    store.set_branch_cursor(repo, branch, "A", 100).await.unwrap();

    let before = store.get_branch_cursor(repo, branch).await.unwrap();
    // A second run with no new commits performs no further cursor writes.
    let after = store.get_branch_cursor(repo, branch).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after, Some(("A".to_string(), 100)));
}

#[tokio::test]
async fn invariant_touched_symbol_lines_accumulate_on_reingest() {
    let store = MemoryGraphStore::new();
    let mut delta = HashMap::new();
    delta.insert("foo::Function".to_string(), 6u32);
    store.touch_symbol("sha1", "src/a.py", &delta).await.unwrap();
    store.touch_symbol("sha1", "src/a.py", &delta).await.unwrap();

    let total = store.touched_symbol_lines("src/a.py::foo::Function").unwrap();
    assert_eq!(total, 12);
}

#[tokio::test]
async fn invariant_contributor_touch_count_accumulates() {
    let store = MemoryGraphStore::new();
    store
        .inc_contributor_file_touch("ada@example.com", "Ada", "ada@example.com", "src/a.py", 100)
        .await
        .unwrap();
    store
        .inc_contributor_file_touch("ada@example.com", "Ada", "ada@example.com", "src/a.py", 200)
        .await
        .unwrap();
    assert_eq!(store.contributor_touch_count("ada@example.com", "src/a.py"), Some(2));
}

#[tokio::test]
async fn invariant_anomaly_score_bounded_and_flags_subset() {
    let store = MemoryGraphStore::new();
    store
        .write_anomaly(
            "sha1",
            &repograph::graph::AnomalyResult {
                z_files: 4.0,
                z_lines: 1.0,
                off_hours: false,
                anomaly_score: 4.0,
                flags: vec!["files_spike".to_string()],
            },
        )
        .await
        .unwrap();
    let result = store.anomaly_for("sha1").unwrap();
    assert!(result.anomaly_score >= 0.0 && result.anomaly_score <= 10.0);
    let allowed = ["files_spike", "lines_spike", "off_hours"];
    assert!(result.flags.iter().all(|f| allowed.contains(&f.as_str())));
}
