// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Read;
use std::os::fd::AsRawFd;

#[test]
fn create_makes_unique_dirs_under_root() {
    let root = tempfile::tempdir().unwrap();
    let a = RunDir::create(root.path()).unwrap();
    let b = RunDir::create(root.path()).unwrap();
    assert!(a.path().is_dir());
    assert!(b.path().is_dir());
    assert_ne!(a.path(), b.path());
}

#[test]
fn stdin_file_is_unlinked_but_fd_stays_readable() {
    let root = tempfile::tempdir().unwrap();
    let dir = RunDir::create(root.path()).unwrap();

    let fd = dir.stdin_fd(Some(b"blob for the child")).unwrap().unwrap();
    assert!(
        !dir.path().join("stdin").exists(),
        "stdin path must not outlive the open"
    );

    let mut file = std::fs::File::from(fd);
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "blob for the child");
}

#[test]
fn no_stdin_blob_means_no_fd() {
    let root = tempfile::tempdir().unwrap();
    let dir = RunDir::create(root.path()).unwrap();
    assert!(dir.stdin_fd(None).unwrap().is_none());
}

#[test]
fn out_is_exclusive_create() {
    let root = tempfile::tempdir().unwrap();
    let mut dir = RunDir::create(root.path()).unwrap();

    let out = dir.open_out().unwrap();
    assert!(out.as_raw_fd() >= 0);
    assert!(dir.out_path().is_some());

    let err = dir.open_out().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
}

#[test]
fn pid_file_holds_decimal_pid_and_newline() {
    let root = tempfile::tempdir().unwrap();
    let mut dir = RunDir::create(root.path()).unwrap();
    dir.write_pid(4242).unwrap();
    let contents = std::fs::read_to_string(dir.path().join("pid")).unwrap();
    assert_eq!(contents, "4242\n");
}

#[test]
fn clean_removes_everything_and_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let mut dir = RunDir::create(root.path()).unwrap();
    dir.open_out().unwrap();
    dir.write_pid(1).unwrap();
    let path = dir.path().to_path_buf();

    dir.clean();
    assert!(!path.exists());

    dir.clean(); // second invocation must not blow up
    assert!(!path.exists());
}

#[test]
fn clean_sweeps_a_leftover_stdin_file() {
    // A start that dies between stdin creation and exec leaves the blob
    // behind; clean has to pick it up.
    let root = tempfile::tempdir().unwrap();
    let mut dir = RunDir::create(root.path()).unwrap();
    std::fs::write(dir.path().join("stdin"), b"orphan").unwrap();
    let path = dir.path().to_path_buf();
    dir.clean();
    assert!(!path.exists());
}

#[test]
fn read_output_returns_written_bytes() {
    let root = tempfile::tempdir().unwrap();
    let mut dir = RunDir::create(root.path()).unwrap();
    {
        use std::io::Write;
        let mut out = dir.open_out().unwrap();
        out.write_all(b"captured").unwrap();
    }
    assert_eq!(dir.read_output().unwrap(), b"captured");
}
