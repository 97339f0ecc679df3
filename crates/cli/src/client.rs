// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client for the daemon's control protocol.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tempo_core::{format_elapsed, Clock, SystemClock};
use tempo_daemon::protocol::{Request, Response, RunEnvelope};
use tempo_daemon::wire::{self, FrameError, IO_TIMEOUT};
use tempo_daemon::Config;
use tokio::net::UnixStream;

/// Connects to the daemon socket, one connection per request.
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    /// Resolve the socket path the daemon would use in this environment.
    pub fn from_env() -> Result<Self> {
        let config = Config::load().context("could not resolve daemon state dir")?;
        Ok(Self {
            socket_path: config.socket_path,
        })
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "could not connect to daemon at {} (is tempod running?)",
                    self.socket_path.display()
                )
            })
    }

    /// Send one request and read its response.
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();
        wire::send_timeout(&mut writer, request, IO_TIMEOUT).await?;
        let response = wire::recv_timeout(&mut reader, IO_TIMEOUT).await?;
        Ok(response)
    }

    /// Send a `Watch` request and hand every streamed envelope to `on_frame`
    /// until the daemon closes the connection.
    pub async fn watch(
        &self,
        request: &Request,
        mut on_frame: impl FnMut(RunEnvelope),
    ) -> Result<()> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();
        wire::send_timeout(&mut writer, request, IO_TIMEOUT).await?;
        loop {
            // No timeout here: a quiet feed is just a quiet feed.
            match wire::recv::<Response, _>(&mut reader).await {
                Ok(Response::Runs { envelope }) => on_frame(envelope),
                Ok(Response::Error { message }) => anyhow::bail!("{message}"),
                Ok(other) => anyhow::bail!("unexpected watch frame: {other:?}"),
                Err(FrameError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Print an envelope as a compact table, newest last.
pub fn print_run_table(envelope: &RunEnvelope) {
    let now = SystemClock.now();
    let mut entries: Vec<_> = envelope.runs.values().collect();
    entries.sort_by(|a, b| a.times.values().min().cmp(&b.times.values().min()));

    println!(
        "{:<10} {:<20} {:>3}  {:<10} {:>8}  {}",
        "RUN", "JOB", "N", "STATE", "AGE", "ACTIONS"
    );
    for entry in entries {
        let scheduled = entry.times.values().min().copied().unwrap_or(now);
        let age = format_elapsed(Duration::from_millis(now.since_ms(scheduled).max(0) as u64));
        let actions: Vec<String> = entry.actions.iter().map(|a| a.to_string()).collect();
        println!(
            "{:<10} {:<20} {:>3}  {:<10} {:>8}  {}",
            entry.run_id.short(10),
            entry.job_id.short(20),
            entry.number,
            entry.state.to_string(),
            age,
            actions.join(",")
        );
    }
}
