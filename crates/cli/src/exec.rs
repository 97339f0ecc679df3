// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-shot program runner.
//!
//! `tempo exec PROG.JSON` resolves the program spec, runs it to completion
//! in a fresh scratch directory, and prints a JSON report of where its
//! output landed and how it died. Useful for running a job's program by
//! hand, outside the daemon.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tempo_core::{ProgramSpec, ResourceUsage};
use tempo_engine::{launch_split, status};

/// Final report, printed as JSON on stdout.
#[derive(Debug, Serialize)]
pub struct ExecReport {
    pub pid: i32,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
    pub argv: Vec<String>,
    pub combine_stderr: bool,
    pub stdout_path: String,
    /// Absent when stderr is merged into stdout.
    pub stderr_path: Option<String>,
    /// Raw wait status.
    pub status: i32,
    /// Present iff the child exited normally.
    pub return_code: Option<i32>,
    /// Signal name iff the child was killed by a signal.
    pub signal: Option<String>,
    pub rusage: ResourceUsage,
}

pub fn execute(path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("could not open program spec {}", path.display()))?;
    let spec: ProgramSpec = serde_json::from_reader(file)
        .with_context(|| format!("invalid program spec {}", path.display()))?;
    let report = run_to_completion(&spec)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Start the program, block until it terminates, and report.
pub fn run_to_completion(spec: &ProgramSpec) -> Result<ExecReport> {
    let program = spec.resolve()?;

    let prog_dir = tempfile::Builder::new()
        .prefix("tempo-")
        .tempdir()
        .context("could not create program directory")?
        .keep();
    let stdout_path = prog_dir.join("stdout");
    let stderr_path = (!program.combine_stderr).then(|| prog_dir.join("stderr"));

    let stdin = std::fs::File::open("/dev/null")?;
    let stdout = OpenOptions::new()
        .write(true)
        .create(true)
        .mode(0o600)
        .open(&stdout_path)?;
    let stderr = match &stderr_path {
        Some(path) => Some(
            OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o600)
                .open(path)?,
        ),
        None => None,
    };
    let stderr_fd = stderr
        .as_ref()
        .map(|f| f.as_raw_fd())
        .unwrap_or_else(|| stdout.as_raw_fd());

    let pid = launch_split(
        &program.argv,
        &program.cwd,
        Some(&program.env),
        stdin.as_raw_fd(),
        stdout.as_raw_fd(),
        stderr_fd,
    )?;

    // Block until the child terminates.
    let mut wait_status: libc::c_int = 0;
    // SAFETY: wait4 fills the two out-params.
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut wait_status, 0, &mut rusage) };
        if rc == pid.as_raw() {
            break;
        }
        let err = std::io::Error::last_os_error();
        if rc < 0 && err.kind() == std::io::ErrorKind::Interrupted {
            continue;
        }
        bail!("wait4 failed: {err}");
    }

    Ok(ExecReport {
        pid: pid.as_raw(),
        cwd: program.cwd.display().to_string(),
        env: program.env.clone(),
        argv: program.argv.clone(),
        combine_stderr: program.combine_stderr,
        stdout_path: stdout_path.display().to_string(),
        stderr_path: stderr_path.map(|p| p.display().to_string()),
        status: wait_status,
        return_code: status::exit_code(wait_status),
        signal: status::signal_name(wait_status),
        rusage: status::convert_rusage(&rusage),
    })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
