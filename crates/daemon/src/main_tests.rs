// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn small_log_is_left_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("daemon.log");
    std::fs::write(&log, b"short").unwrap();

    rotate_log_if_needed(&log);
    assert!(log.exists());
    assert!(!tmp.path().join("daemon.log.1").exists());
}

#[test]
fn oversized_log_rotates_and_shifts() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("daemon.log");
    let payload = vec![b'x'; (MAX_LOG_SIZE + 1) as usize];
    std::fs::write(&log, &payload).unwrap();
    std::fs::write(tmp.path().join("daemon.log.1"), b"old-1").unwrap();
    std::fs::write(tmp.path().join("daemon.log.2"), b"old-2").unwrap();

    rotate_log_if_needed(&log);

    assert!(!log.exists(), "current log rotated away");
    assert_eq!(
        std::fs::read(tmp.path().join("daemon.log.1")).unwrap(),
        payload
    );
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("daemon.log.2")).unwrap(),
        "old-1"
    );
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("daemon.log.3")).unwrap(),
        "old-2"
    );
}

#[test]
fn missing_log_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    rotate_log_if_needed(&tmp.path().join("daemon.log"));
}
