// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wait-status decoding shared by the supervisor and the single-shot runner.

use tempo_core::run::{round_seconds, ResourceUsage};

/// Exit code, present iff the child exited normally.
pub fn exit_code(status: i32) -> Option<i32> {
    if libc::WIFEXITED(status) {
        Some(libc::WEXITSTATUS(status))
    } else {
        None
    }
}

/// Terminating signal name (e.g. "SIGTERM"), present iff signaled.
pub fn signal_name(status: i32) -> Option<String> {
    if libc::WIFSIGNALED(status) {
        match nix::sys::signal::Signal::try_from(libc::WTERMSIG(status)) {
            Ok(sig) => Some(sig.as_str().to_string()),
            Err(_) => Some(format!("SIG{}", libc::WTERMSIG(status))),
        }
    } else {
        None
    }
}

/// True iff the status is a terminal disposition (exit or fatal signal),
/// as opposed to a stop/continue report.
pub fn is_terminal(status: i32) -> bool {
    libc::WIFEXITED(status) || libc::WIFSIGNALED(status)
}

/// The one success criterion: normal exit with code zero.
pub fn is_success(status: i32) -> bool {
    exit_code(status) == Some(0)
}

/// Convert an OS rusage snapshot taken at reap time.
pub fn convert_rusage(ru: &libc::rusage) -> ResourceUsage {
    let seconds =
        |tv: libc::timeval| round_seconds(tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6);
    ResourceUsage {
        ru_utime: seconds(ru.ru_utime),
        ru_stime: seconds(ru.ru_stime),
        ru_maxrss: ru.ru_maxrss as i64,
        ru_minflt: ru.ru_minflt as i64,
        ru_majflt: ru.ru_majflt as i64,
        ru_inblock: ru.ru_inblock as i64,
        ru_oublock: ru.ru_oublock as i64,
        ru_nvcsw: ru.ru_nvcsw as i64,
        ru_nivcsw: ru.ru_nivcsw as i64,
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
