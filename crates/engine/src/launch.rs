// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fork/exec process launcher.
//!
//! The child and parent share a pipe whose write end is close-on-exec. A
//! successful exec closes it and the parent reads EOF; a failing child
//! writes a framed record `"OSError:<hex-errno>:<message>"` and exits, so
//! exec-time failures (absent executable, bad working directory, permission)
//! surface as typed errors in the parent instead of a child that dies
//! silently. The `noexec` message marks a chdir failure, which would
//! otherwise be indistinguishable from exec ENOENT.

use crate::error::LaunchError;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{self, ForkResult, Pid};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

/// Exec-error records larger than this are treated as malformed.
pub const MAX_ERR_RECORD: usize = 1 << 20;

/// Start `argv` as a child process.
///
/// `argv[0]` is the executable; PATH resolution is the OS's business. `env`
/// of `None` inherits the parent environment unchanged. `stdin_fd` of `-1`
/// leaves stdin alone; `out_fd` is dup'd onto both stdout and stderr, so the
/// caller gets a merged stream. The child starts a new session, has signal
/// dispositions restored to defaults, and keeps no file descriptors beyond
/// stdio and the (close-on-exec) error pipe.
pub fn launch(
    argv: &[String],
    cwd: &Path,
    env: Option<&BTreeMap<String, String>>,
    stdin_fd: RawFd,
    out_fd: RawFd,
) -> Result<Pid, LaunchError> {
    launch_split(argv, cwd, env, stdin_fd, out_fd, out_fd)
}

/// [`launch`] with stdout and stderr on separate descriptors (they may also
/// be the same fd, which is exactly what [`launch`] does).
pub fn launch_split(
    argv: &[String],
    cwd: &Path,
    env: Option<&BTreeMap<String, String>>,
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    stderr_fd: RawFd,
) -> Result<Pid, LaunchError> {
    if argv.is_empty() {
        return Err(LaunchError::Os {
            errno: libc::EINVAL,
            message: "empty argv".to_string(),
        });
    }
    if let Some(env) = env {
        for key in env.keys() {
            if key.contains('=') {
                return Err(LaunchError::IllegalEnvKey { key: key.clone() });
            }
        }
    }

    // Everything the child touches is materialised before the fork; the
    // child itself makes only async-signal-safe calls.
    let exe = CString::new(argv[0].as_str())?;
    let args = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let cwd_c = CString::new(cwd.as_os_str().as_encoded_bytes())?;
    let env_c = env
        .map(|env| {
            env.iter()
                .map(|(k, v)| CString::new(format!("{k}={v}")))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let argv_ptrs: Vec<*const libc::c_char> = args
        .iter()
        .map(|c| c.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();
    let envp_ptrs: Option<Vec<*const libc::c_char>> = env_c.as_ref().map(|env| {
        env.iter()
            .map(|c| c.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect()
    });

    let (err_read, err_write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Sys)?;

    // SAFETY: the child branch calls only async-signal-safe functions and
    // never returns; all heap data it reads was allocated pre-fork.
    match unsafe { unistd::fork() }.map_err(LaunchError::Sys)? {
        ForkResult::Child => child_after_fork(
            exe.as_ptr(),
            argv_ptrs.as_ptr(),
            envp_ptrs.as_ref().map(|p| p.as_ptr()),
            cwd_c.as_ptr(),
            stdin_fd,
            stdout_fd,
            stderr_fd,
            err_write.as_raw_fd(),
        ),
        ForkResult::Parent { child } => {
            drop(err_write);
            read_exec_result(err_read, child, argv, cwd)
        }
    }
}

/// Child side of the fork. Never returns.
#[allow(clippy::too_many_arguments)]
fn child_after_fork(
    exe: *const libc::c_char,
    argv: *const *const libc::c_char,
    envp: Option<*const *const libc::c_char>,
    cwd: *const libc::c_char,
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    stderr_fd: RawFd,
    err_fd: RawFd,
) -> ! {
    unsafe {
        // New session: detach from the supervisor's controlling terminal.
        libc::setsid();

        // Restore default signal dispositions and clear the mask.
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigprocmask(libc::SIG_SETMASK, &set, std::ptr::null_mut());
        for sig in 1..32 {
            if sig != libc::SIGKILL && sig != libc::SIGSTOP {
                libc::signal(sig, libc::SIG_DFL);
            }
        }

        // chdir before exec; reported with the noexec marker so the parent
        // blames the directory, not the executable.
        if libc::chdir(cwd) != 0 {
            emit_exec_error(err_fd, Errno::last_raw(), true);
        }

        if stdin_fd >= 0 && libc::dup2(stdin_fd, 0) < 0 {
            emit_exec_error(err_fd, Errno::last_raw(), false);
        }
        if libc::dup2(stdout_fd, 1) < 0 || libc::dup2(stderr_fd, 2) < 0 {
            emit_exec_error(err_fd, Errno::last_raw(), false);
        }

        // Close everything but stdio and the error pipe.
        close_all_except(err_fd);

        match envp {
            Some(envp) => {
                libc::execve(exe, argv, envp);
            }
            None => {
                libc::execv(exe, argv);
            }
        }
        emit_exec_error(err_fd, Errno::last_raw(), false)
    }
}

/// Close all fds >= 3 except `keep`, with close_range(2).
unsafe fn close_all_except(keep: RawFd) {
    let keep = keep as libc::c_uint;
    if keep > 3 {
        libc::syscall(libc::SYS_close_range, 3 as libc::c_uint, keep - 1, 0 as libc::c_int);
    }
    libc::syscall(
        libc::SYS_close_range,
        keep + 1,
        libc::c_uint::MAX,
        0 as libc::c_int,
    );
}

/// Write the framed exec-error record and exit. Allocation-free: the child
/// may share a heap with threads that held locks at fork time.
fn emit_exec_error(fd: RawFd, errno: i32, noexec: bool) -> ! {
    let mut buf = [0u8; 64];
    let mut n = 0;
    for b in b"OSError:" {
        buf[n] = *b;
        n += 1;
    }
    n += write_hex(&mut buf[n..], errno as u32);
    buf[n] = b':';
    n += 1;
    if noexec {
        for b in b"noexec" {
            buf[n] = *b;
            n += 1;
        }
    }
    unsafe {
        libc::write(fd, buf.as_ptr().cast(), n);
        libc::_exit(127);
    }
}

fn write_hex(buf: &mut [u8], mut val: u32) -> usize {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut tmp = [0u8; 8];
    let mut i = 0;
    loop {
        tmp[i] = DIGITS[(val & 0xf) as usize];
        i += 1;
        val >>= 4;
        if val == 0 {
            break;
        }
    }
    for (j, digit) in tmp[..i].iter().rev().enumerate() {
        buf[j] = *digit;
    }
    i
}

/// Parent side: read the error pipe to EOF and decide what happened.
fn read_exec_result(
    err_read: OwnedFd,
    child: Pid,
    argv: &[String],
    cwd: &Path,
) -> Result<Pid, LaunchError> {
    let mut record = Vec::new();
    let mut pipe = std::fs::File::from(err_read);
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                record.extend_from_slice(&buf[..n]);
                if record.len() > MAX_ERR_RECORD {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LaunchError::Pipe(e)),
        }
    }

    if record.is_empty() {
        // Write end closed by a successful exec.
        return Ok(child);
    }

    // The exec failed; collect the corpse so it doesn't linger as a zombie.
    let _ = nix::sys::wait::waitpid(child, None);

    if record.len() > MAX_ERR_RECORD {
        return Err(LaunchError::BadErrorRecord {
            raw: format!("{} bytes", record.len()),
        });
    }
    Err(parse_exec_error(&record, argv, cwd))
}

fn parse_exec_error(record: &[u8], argv: &[String], cwd: &Path) -> LaunchError {
    let text = String::from_utf8_lossy(record);
    let mut parts = text.splitn(3, ':');
    let (Some(_name), Some(hex), Some(message)) = (parts.next(), parts.next(), parts.next())
    else {
        return LaunchError::BadErrorRecord {
            raw: text.into_owned(),
        };
    };
    let Ok(errno) = i32::from_str_radix(hex, 16) else {
        return LaunchError::BadErrorRecord {
            raw: text.into_owned(),
        };
    };
    if errno == 0 {
        return LaunchError::BadErrorRecord {
            raw: text.into_owned(),
        };
    }

    let noexec = message == "noexec";
    match errno {
        libc::ENOENT => {
            let path = if noexec {
                cwd.display().to_string()
            } else {
                argv[0].clone()
            };
            LaunchError::FileNotFound { path }
        }
        libc::EACCES => LaunchError::PermissionDenied {
            path: argv[0].clone(),
        },
        _ => LaunchError::Os {
            errno,
            message: Errno::from_raw(errno).desc().to_string(),
        },
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
