// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run workspace directory.
//!
//! Holds at most three files: `stdin` (transient; unlinked as soon as the
//! child holds the open fd), `out` (merged stdout+stderr), and `pid`. One
//! run writes it; everyone else reads it only after the run is terminal.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Scratch directory for one run.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    out_path: Option<PathBuf>,
    pid_path: Option<PathBuf>,
}

impl RunDir {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("run-").tempdir_in(root)?;
        Ok(Self {
            path: dir.keep(),
            out_path: None,
            pid_path: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Produce the child's stdin fd.
    ///
    /// `None` means no redirection. Otherwise the blob is written to
    /// `<dir>/stdin`, opened read-only, and the path unlinked immediately:
    /// the child inherits the open fd and the name never outlives this call.
    pub fn stdin_fd(&self, blob: Option<&[u8]>) -> io::Result<Option<OwnedFd>> {
        let Some(blob) = blob else {
            return Ok(None);
        };
        let path = self.path.join("stdin");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o400)
                .open(&path)?;
            file.write_all(blob)?;
        }
        let file = File::open(&path)?;
        fs::remove_file(&path)?;
        Ok(Some(OwnedFd::from(file)))
    }

    /// Create `<dir>/out` for the merged output stream. Exclusive create:
    /// a second open for the same run is a bug, not a retry.
    pub fn open_out(&mut self) -> io::Result<File> {
        let path = self.path.join("out");
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o400)
            .open(&path)?;
        self.out_path = Some(path);
        Ok(file)
    }

    pub fn out_path(&self) -> Option<&Path> {
        self.out_path.as_deref()
    }

    /// Record the child pid as `<pid>\n`.
    pub fn write_pid(&mut self, pid: i32) -> io::Result<()> {
        let path = self.path.join("pid");
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o400)
            .open(&path)?;
        writeln!(file, "{pid}")?;
        self.pid_path = Some(path);
        Ok(())
    }

    /// Read the captured output, if any was produced.
    pub fn read_output(&self) -> io::Result<Vec<u8>> {
        match &self.out_path {
            Some(path) => fs::read(path),
            None => Ok(Vec::new()),
        }
    }

    /// Remove the workspace. Safe to call more than once; a partially
    /// populated directory is removed as far as possible.
    pub fn clean(&mut self) {
        if let Some(path) = self.out_path.take() {
            let _ = fs::remove_file(path);
        }
        if let Some(path) = self.pid_path.take() {
            let _ = fs::remove_file(path);
        }
        // A start that failed between stdin creation and exec leaves the
        // stdin file behind; sweep it too.
        let _ = fs::remove_file(self.path.join("stdin"));
        let _ = fs::remove_dir(&self.path);
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
