// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Program specification.
//!
//! A program is described by a JSON document carrying exactly one of `argv`
//! (an argument vector) or `cmd` (a bash command string). Either way the
//! child is started under a fresh login shell with a whitelisted environment,
//! so jobs behave the same from the service and from a terminal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variables passed through to the child.
pub const ENV_WHITELIST: &[&str] = &["HOME", "LANG", "LOGNAME", "SHELL", "TMPDIR", "USER"];

/// Program specification as written by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgramSpec {
    /// Argument vector; element 0 is the executable path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argv: Option<Vec<String>>,
    /// Bash command string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    /// Initial working directory; defaults to `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Merge stderr into stdout (single-shot runner only; supervised runs
    /// always capture a merged stream).
    #[serde(default)]
    pub combine_stderr: bool,
    /// Reserved: remote execution host. Non-null is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Invalid program specification. These fail before any process is forked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("neither cmd nor argv given")]
    NoProgram,
    #[error("both cmd and argv given")]
    AmbiguousProgram,
    #[error("argv must not be empty")]
    EmptyArgv,
    #[error("remote host execution is reserved: {0}")]
    RemoteHost(String),
}

/// A resolved program, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Exec argument vector (`/bin/bash -l -c <cmd>`).
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    /// Whitelisted environment for the child.
    pub env: BTreeMap<String, String>,
    pub combine_stderr: bool,
}

impl ProgramSpec {
    /// Convenience constructor for an argv program.
    pub fn from_argv(argv: Vec<String>) -> Self {
        Self {
            argv: Some(argv),
            ..Self::default()
        }
    }

    /// Resolve the spec into an executable [`Program`].
    pub fn resolve(&self) -> Result<Program, SpecError> {
        if let Some(host) = &self.host {
            return Err(SpecError::RemoteHost(host.clone()));
        }

        let cmd = match (&self.cmd, &self.argv) {
            (Some(_), Some(_)) => return Err(SpecError::AmbiguousProgram),
            (None, None) => return Err(SpecError::NoProgram),
            (Some(cmd), None) => cmd.clone(),
            (None, Some(argv)) => {
                if argv.is_empty() {
                    return Err(SpecError::EmptyArgv);
                }
                let quoted: Vec<String> = argv.iter().map(|a| sh_quote(a)).collect();
                format!("exec {}", quoted.join(" "))
            }
        };

        // Invoke the command in a fresh login shell.
        let argv = vec![
            "/bin/bash".to_string(),
            "-l".to_string(),
            "-c".to_string(),
            cmd,
        ];

        Ok(Program {
            argv,
            cwd: PathBuf::from(self.cwd.as_deref().unwrap_or("/")),
            env: whitelist_env(std::env::vars()),
            combine_stderr: self.combine_stderr,
        })
    }
}

/// Filter an environment down to [`ENV_WHITELIST`].
pub fn whitelist_env(vars: impl Iterator<Item = (String, String)>) -> BTreeMap<String, String> {
    vars.filter(|(k, _)| ENV_WHITELIST.contains(&k.as_str()))
        .collect()
}

/// Quote a string for POSIX shell word splitting.
///
/// Safe words pass through; anything else is single-quoted, with embedded
/// single quotes spelled `'\''`.
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c))
    {
        return s.to_string();
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
#[path = "program_tests.rs"]
mod tests;
