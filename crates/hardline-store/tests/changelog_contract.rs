//! Behavior both change log implementations share.

use camino::Utf8PathBuf;
use hardline_store::{ChangeLog, MemoryChangeLog, SqliteChangeLog, StoreError};
use hardline_test_util::changes::{at, change, in_snapshot, snapshot, state};
use hardline_types::{FailureKind, Operation, PolicyId};

fn logs() -> (tempfile::TempDir, Vec<(&'static str, Box<dyn ChangeLog>)>) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("changelog.db")).expect("utf8");
    let sqlite = SqliteChangeLog::open(&path).expect("open sqlite");
    let logs: Vec<(&'static str, Box<dyn ChangeLog>)> = vec![
        ("sqlite", Box::new(sqlite)),
        ("memory", Box::new(MemoryChangeLog::new())),
    ];
    (dir, logs)
}

#[test]
fn changes_come_back_ordered_by_time_then_insertion() {
    let (_dir, logs) = logs();
    for (name, log) in logs {
        log.save_changes(&[
            change("c3", "p", Operation::Apply, at(120), "a", "b"),
            change("c1", "p", Operation::Apply, at(60), "a", "b"),
        ])
        .expect("save");
        log.save_changes(&[change("c2", "q", Operation::Apply, at(60), "x", "y")])
            .expect("save");

        let ids: Vec<String> = log
            .all_changes()
            .expect("list")
            .into_iter()
            .map(|c| c.change_id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"], "{name}");

        let for_p: Vec<String> = log
            .changes_for_policy(&PolicyId::new("p"))
            .expect("list")
            .into_iter()
            .map(|c| c.change_id)
            .collect();
        assert_eq!(for_p, vec!["c1", "c3"], "{name}");
    }
}

#[test]
fn records_round_trip_every_field() {
    let (_dir, logs) = logs();
    for (name, log) in logs {
        let mut failed = in_snapshot(
            change("c1", "svc-002", Operation::Revert, at(5), "x", "y"),
            "snap-1",
        );
        failed.success = false;
        failed.new_state = None;
        failed.failure_kind = Some(FailureKind::Authorization);
        failed.error_message = Some("access denied: DiagTrack".to_string());
        log.save_changes(std::slice::from_ref(&failed)).expect("save");

        assert_eq!(log.all_changes().expect("list"), vec![failed.clone()], "{name}");
        assert_eq!(
            log.changes_by_snapshot("snap-1").expect("list"),
            vec![failed],
            "{name}"
        );
        assert!(log.changes_by_snapshot("other").expect("list").is_empty());
    }
}

#[test]
fn snapshots_list_newest_first_and_states_are_opt_in() {
    let (_dir, logs) = logs();
    for (name, log) in logs {
        log.create_snapshot(&snapshot(
            "s1",
            at(0),
            vec![state("tel-001", false, Some("(not present)"))],
        ))
        .expect("create");
        log.create_snapshot(&snapshot(
            "s2",
            at(60),
            vec![
                state("tel-001", true, Some("0")),
                state("svc-001", false, None),
            ],
        ))
        .expect("create");

        let listed: Vec<String> = log
            .list_snapshots()
            .expect("list")
            .into_iter()
            .map(|s| s.snapshot_id)
            .collect();
        assert_eq!(listed, vec!["s2", "s1"], "{name}");

        let header = log.latest_snapshot(false).expect("latest").expect("some");
        assert_eq!(header.snapshot_id, "s2");
        assert!(header.states.is_empty(), "{name}");

        let full = log.latest_snapshot(true).expect("latest").expect("some");
        let ids: Vec<&str> = full.states.iter().map(|s| s.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["svc-001", "tel-001"], "{name}");
        assert_eq!(full.system.windows_build, 22631);

        let s1 = log.snapshot("s1").expect("get").expect("some");
        assert_eq!(s1.states.len(), 1, "{name}");
        assert!(log.snapshot("missing").expect("get").is_none());
    }
}

#[test]
fn policy_states_upsert_into_existing_snapshots_only() {
    let (_dir, logs) = logs();
    for (name, log) in logs {
        log.create_snapshot(&snapshot("s1", at(0), vec![state("a", false, None)]))
            .expect("create");
        log.save_snapshot_policy_states("s1", &[state("a", true, Some("1")), state("b", false, None)])
            .expect("save states");
        let s1 = log.snapshot("s1").expect("get").expect("some");
        assert_eq!(
            s1.states,
            vec![state("a", true, Some("1")), state("b", false, None)],
            "{name}"
        );

        let err = log
            .save_snapshot_policy_states("nope", &[state("a", true, None)])
            .expect_err("unknown snapshot");
        assert!(matches!(err, StoreError::UnknownSnapshot(_)), "{name}: {err}");
    }
}

#[test]
fn sqlite_log_survives_reopen() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("changelog.db")).expect("utf8");
    {
        let log = SqliteChangeLog::open(&path).expect("open");
        log.save_changes(&[change("c1", "p", Operation::Apply, at(0), "a", "b")])
            .expect("save");
        log.create_snapshot(&snapshot("s1", at(0), vec![state("p", false, None)]))
            .expect("snapshot");
    }
    let log = SqliteChangeLog::open(&path).expect("reopen");
    assert_eq!(log.all_changes().expect("list").len(), 1);
    assert!(log.snapshot("s1").expect("get").is_some());
}

#[test]
fn memory_log_write_failures_leave_reads_working() {
    let log = MemoryChangeLog::new();
    log.save_changes(&[change("c1", "p", Operation::Apply, at(0), "a", "b")])
        .expect("save");
    log.fail_writes(true);
    assert!(matches!(
        log.save_changes(&[change("c2", "p", Operation::Apply, at(1), "a", "b")]),
        Err(StoreError::Unavailable(_))
    ));
    assert!(log.create_snapshot(&snapshot("s1", at(0), Vec::new())).is_err());
    assert_eq!(log.all_changes().expect("list").len(), 1);
}
