// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tempo: operator CLI for the tempo daemon, plus the single-shot `exec`
//! program runner.

mod client;
mod exec;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempo_core::{parse_duration, Clock, JobId, ProgramSpec, RunId, SystemClock, Timestamp};
use tempo_daemon::protocol::{Request, Response};

use crate::client::Client;

#[derive(Parser)]
#[command(name = "tempo", version, about = "job scheduling and run supervision")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program spec JSON document to completion and print the result
    Exec {
        /// Path to the program spec (PROG.JSON)
        path: PathBuf,
    },

    /// List the job catalogue
    Jobs,

    /// List runs
    Runs {
        #[arg(long)]
        job_id: Option<String>,
        /// Window start, epoch milliseconds (inclusive)
        #[arg(long)]
        since: Option<u64>,
        /// Window end, epoch milliseconds (exclusive)
        #[arg(long)]
        until: Option<u64>,
    },

    /// Show one run
    Run { run_id: String },

    /// Print a run's captured output bytes
    Output { run_id: String },

    /// Print a run's state
    State { run_id: String },

    /// Cancel a scheduled run
    Cancel { run_id: String },

    /// Start a scheduled run now
    Start { run_id: String },

    /// Rerun a terminal run
    Rerun { run_id: String },

    /// Schedule a program as a new run
    Schedule {
        /// When to run: "now", "+<duration>" (e.g. +30s, +5m), or epoch ms
        #[arg(long, default_value = "now")]
        at: String,
        /// Job id to record the run under (generated when absent)
        #[arg(long)]
        job_id: Option<String>,
        /// Program argv
        #[arg(trailing_var_arg = true, required = true)]
        argv: Vec<String>,
    },

    /// Stream live run updates as JSON envelopes
    Watch {
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long)]
        since: Option<u64>,
    },

    /// Ask the daemon to shut down
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Exec { path } => exec::execute(&path),

        Command::Jobs => {
            let response = Client::from_env()?.request(&Request::Jobs).await?;
            match response {
                Response::Jobs { jobs } => {
                    println!("{}", serde_json::to_string_pretty(&jobs)?);
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Runs {
            job_id,
            since,
            until,
        } => {
            let request = Request::Runs {
                job_id: job_id.map(JobId::new),
                run_id: None,
                since: since.map(Timestamp::from_millis),
                until: until.map(Timestamp::from_millis),
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::Runs { envelope } => {
                    client::print_run_table(&envelope);
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Run { run_id } => {
            let request = Request::Run {
                run_id: RunId::new(run_id),
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::Runs { envelope } => {
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Output { run_id } => {
            let request = Request::Output {
                run_id: RunId::new(run_id),
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::Output { bytes } => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::State { run_id } => {
            let request = Request::State {
                run_id: RunId::new(run_id),
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::State { state } => {
                    println!("{state}");
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Cancel { run_id } => {
            let request = Request::Cancel {
                run_id: RunId::new(run_id),
            };
            expect_ok(Client::from_env()?.request(&request).await?)
        }

        Command::Start { run_id } => {
            let request = Request::Start {
                run_id: RunId::new(run_id),
            };
            expect_ok(Client::from_env()?.request(&request).await?)
        }

        Command::Rerun { run_id } => {
            let request = Request::Rerun {
                run_id: RunId::new(run_id),
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::Runs { envelope } => {
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Schedule { at, job_id, argv } => {
            let request = Request::Schedule {
                job_id: job_id.map(JobId::new),
                program: ProgramSpec::from_argv(argv),
                args: BTreeMap::new(),
                time: parse_at(&at)?,
            };
            let response = Client::from_env()?.request(&request).await?;
            match response {
                Response::Runs { envelope } => {
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                    Ok(())
                }
                other => unexpected(other),
            }
        }

        Command::Watch { job_id, since } => {
            let request = Request::Watch {
                job_id: job_id.map(JobId::new),
                run_id: None,
                since: since.map(Timestamp::from_millis),
            };
            Client::from_env()?
                .watch(&request, |envelope| {
                    match serde_json::to_string(&envelope) {
                        Ok(json) => println!("{json}"),
                        Err(e) => eprintln!("bad envelope: {e}"),
                    }
                })
                .await
        }

        Command::Shutdown => {
            let response = Client::from_env()?.request(&Request::Shutdown).await?;
            match response {
                Response::ShuttingDown => Ok(()),
                other => unexpected(other),
            }
        }
    }
}

/// Parse the --at argument: "now", "+<duration>", or raw epoch milliseconds.
fn parse_at(at: &str) -> Result<Option<Timestamp>> {
    if at == "now" {
        return Ok(None);
    }
    if let Some(rest) = at.strip_prefix('+') {
        let offset = parse_duration(rest).map_err(|e| anyhow::anyhow!(e))?;
        return Ok(Some(SystemClock.now() + offset));
    }
    let ms: u64 = at
        .parse()
        .with_context(|| format!("invalid --at value: {at:?}"))?;
    Ok(Some(Timestamp::from_millis(ms)))
}

/// Map conflict and error responses onto CLI failures.
fn expect_ok(response: Response) -> Result<()> {
    match response {
        Response::Ok => Ok(()),
        other => unexpected(other),
    }
}

fn unexpected<T>(response: Response) -> Result<T> {
    match response {
        Response::Conflict { error, state } => match state {
            Some(state) => bail!("{error} (state: {state})"),
            None => bail!("{error}"),
        },
        Response::Error { message } => bail!("{message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
