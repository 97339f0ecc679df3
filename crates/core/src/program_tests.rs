// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn argv_program_resolves_to_exec_under_bash() {
    let spec = ProgramSpec::from_argv(vec!["/bin/echo".into(), "hello world".into()]);
    let prog = spec.resolve().unwrap();
    assert_eq!(prog.argv[0], "/bin/bash");
    assert_eq!(prog.argv[1], "-l");
    assert_eq!(prog.argv[2], "-c");
    assert_eq!(prog.argv[3], "exec /bin/echo 'hello world'");
    assert_eq!(prog.cwd, std::path::PathBuf::from("/"));
    assert!(!prog.combine_stderr);
}

#[test]
fn cmd_program_passes_through() {
    let spec = ProgramSpec {
        cmd: Some("echo hi | wc -c".into()),
        cwd: Some("/tmp".into()),
        ..ProgramSpec::default()
    };
    let prog = spec.resolve().unwrap();
    assert_eq!(prog.argv[3], "echo hi | wc -c");
    assert_eq!(prog.cwd, std::path::PathBuf::from("/tmp"));
}

#[test]
fn both_argv_and_cmd_is_an_error() {
    let spec = ProgramSpec {
        argv: Some(vec!["/bin/true".into()]),
        cmd: Some("true".into()),
        ..ProgramSpec::default()
    };
    assert_eq!(spec.resolve().unwrap_err(), SpecError::AmbiguousProgram);
}

#[test]
fn neither_argv_nor_cmd_is_an_error() {
    assert_eq!(
        ProgramSpec::default().resolve().unwrap_err(),
        SpecError::NoProgram
    );
}

#[test]
fn empty_argv_is_an_error() {
    let spec = ProgramSpec::from_argv(vec![]);
    assert_eq!(spec.resolve().unwrap_err(), SpecError::EmptyArgv);
}

#[test]
fn non_null_host_is_reserved() {
    let spec = ProgramSpec {
        argv: Some(vec!["/bin/true".into()]),
        host: Some("worker-3".into()),
        ..ProgramSpec::default()
    };
    assert!(matches!(
        spec.resolve().unwrap_err(),
        SpecError::RemoteHost(h) if h == "worker-3"
    ));
}

#[test]
fn whitelist_keeps_only_known_variables() {
    let env = whitelist_env(
        [
            ("HOME".to_string(), "/home/op".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("USER".to_string(), "op".to_string()),
            ("SECRET_TOKEN".to_string(), "x".to_string()),
        ]
        .into_iter(),
    );
    assert_eq!(env.get("HOME").map(String::as_str), Some("/home/op"));
    assert_eq!(env.get("USER").map(String::as_str), Some("op"));
    assert!(!env.contains_key("PATH"));
    assert!(!env.contains_key("SECRET_TOKEN"));
}

#[parameterized(
    plain = { "abc", "abc" },
    path = { "/bin/echo", "/bin/echo" },
    space = { "a b", "'a b'" },
    empty = { "", "''" },
    dollar = { "$HOME", "'$HOME'" },
    quote = { "it's", "'it'\\''s'" },
)]
fn sh_quote_cases(input: &str, expected: &str) {
    assert_eq!(sh_quote(input), expected);
}

#[test]
fn spec_json_round_trip() {
    let json = r#"{"argv": ["/bin/sleep", "5"], "cwd": "/var/tmp", "combine_stderr": true}"#;
    let spec: ProgramSpec = serde_json::from_str(json).unwrap();
    assert_eq!(
        spec.argv.as_deref(),
        Some(&["/bin/sleep".to_string(), "5".to_string()][..])
    );
    assert!(spec.combine_stderr);
    assert!(spec.host.is_none());

    let back = serde_json::to_value(&spec).unwrap();
    assert!(back.get("cmd").is_none(), "absent fields stay absent");
}
