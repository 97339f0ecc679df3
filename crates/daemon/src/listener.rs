// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the control socket.
//!
//! Connections are handled in spawned tasks so the supervisor loop never
//! blocks on a client. Queries are answered from shared state; mutations go
//! to the supervisor loop over the control channel; `Watch` turns the
//! connection into a live-feed stream.

use std::sync::Arc;

use tempo_core::{Clock, Run, RunId, SystemClock, Timestamp};
use tempo_engine::{RunFilter, RunStore};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response, RunEntry, RunEnvelope, PROTOCOL_VERSION};
use crate::service::{Control, OpError, Shared};
use crate::wire::{self, FrameError, IO_TIMEOUT};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub shared: Arc<Shared>,
    pub control: mpsc::Sender<Control>,
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting socket connections.
pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Accept loop; one spawned task per connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        match handle_connection(stream, &ctx).await {
                            Ok(()) => {}
                            Err(FrameError::Closed) => debug!("client disconnected"),
                            Err(FrameError::Timeout) => warn!("connection timeout"),
                            Err(e) => error!("connection error: {e}"),
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {e}");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), FrameError> {
    let (mut reader, mut writer) = stream.into_split();
    let request: Request = wire::recv_timeout(&mut reader, IO_TIMEOUT).await?;

    if matches!(request, Request::Runs { .. } | Request::State { .. }) {
        debug!(request = ?request, "received query");
    } else {
        info!(request = ?request, "received request");
    }

    match request {
        Request::Watch {
            job_id,
            run_id,
            since,
        } => {
            let filter = RunFilter {
                job_id,
                run_id,
                since,
                until: None,
            };
            handle_watch(&mut writer, ctx, filter).await
        }
        request => {
            let response = handle_request(request, ctx).await;
            wire::send_timeout(&mut writer, &response, IO_TIMEOUT).await
        }
    }
}

/// Project runs into an envelope, computing action availability against the
/// current store.
fn envelope_for(store: &RunStore, when: Timestamp, runs: &[Run]) -> RunEnvelope {
    RunEnvelope::new(
        when,
        runs.iter()
            .map(|r| RunEntry::from_run(r, store.is_highest(&r.run_id))),
    )
}

/// Envelope holding the current state of a single run.
fn run_envelope(ctx: &ListenCtx, run_id: &RunId) -> Response {
    let store = ctx.shared.store.lock();
    match store.get(run_id) {
        Some(run) => {
            let entry = RunEntry::from_run(run, store.is_highest(run_id));
            Response::Runs {
                envelope: RunEnvelope::new(SystemClock.now(), [entry]),
            }
        }
        None => Response::Error {
            message: format!("run not found: {run_id}"),
        },
    }
}

/// Forward a mutation to the supervisor loop and wait for its verdict.
async fn send_control<T>(
    ctx: &ListenCtx,
    build: impl FnOnce(oneshot::Sender<Result<T, OpError>>) -> Control,
) -> Result<T, Response> {
    let (tx, rx) = oneshot::channel();
    if ctx.control.send(build(tx)).await.is_err() {
        return Err(Response::Error {
            message: "daemon is shutting down".to_string(),
        });
    }
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Response::Conflict {
            error: e.to_string(),
            state: e.state(),
        }),
        Err(_) => Err(Response::Error {
            message: "control channel dropped".to_string(),
        }),
    }
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Jobs => {
            let jobs = ctx.shared.jobs.lock();
            let mut jobs: Vec<_> = jobs.values().cloned().collect();
            jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
            Response::Jobs { jobs }
        }

        Request::Job { job_id } => {
            let jobs = ctx.shared.jobs.lock();
            Response::Job {
                job: jobs.get(&job_id).cloned().map(Box::new),
            }
        }

        Request::Runs {
            job_id,
            run_id,
            since,
            until,
        } => {
            let filter = RunFilter {
                job_id,
                run_id,
                since,
                until,
            };
            let store = ctx.shared.store.lock();
            let (when, runs) = store.query(&filter, SystemClock.now());
            Response::Runs {
                envelope: envelope_for(&store, when, &runs),
            }
        }

        Request::Run { run_id } => run_envelope(ctx, &run_id),

        Request::Output { run_id } => {
            let store = ctx.shared.store.lock();
            match store.get(&run_id) {
                Some(run) => match &run.output {
                    Some(bytes) => Response::Output {
                        bytes: bytes.clone(),
                    },
                    None => Response::Error {
                        message: "no output".to_string(),
                    },
                },
                None => Response::Error {
                    message: format!("run not found: {run_id}"),
                },
            }
        }

        Request::State { run_id } => {
            let store = ctx.shared.store.lock();
            match store.get(&run_id) {
                Some(run) => Response::State { state: run.state },
                None => Response::Error {
                    message: format!("run not found: {run_id}"),
                },
            }
        }

        Request::Cancel { run_id } => {
            match send_control(ctx, |reply| Control::Cancel { run_id, reply }).await {
                Ok(()) => Response::Ok,
                Err(resp) => resp,
            }
        }

        Request::Start { run_id } => {
            match send_control(ctx, |reply| Control::Start { run_id, reply }).await {
                Ok(()) => Response::Ok,
                Err(resp) => resp,
            }
        }

        Request::Rerun { run_id } => {
            match send_control(ctx, |reply| Control::Rerun { run_id, reply }).await {
                Ok(new_run_id) => run_envelope(ctx, &new_run_id),
                Err(resp) => resp,
            }
        }

        Request::Schedule {
            job_id,
            program,
            args,
            time,
        } => {
            let sent = send_control(ctx, |reply| Control::Schedule {
                job_id,
                program,
                args,
                time,
                reply,
            })
            .await;
            match sent {
                Ok(run_id) => run_envelope(ctx, &run_id),
                Err(resp) => resp,
            }
        }

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }

        // Handled before this function; unreachable via handle_connection.
        Request::Watch { .. } => Response::Error {
            message: "watch is a streaming request".to_string(),
        },
    }
}

/// Stream live run envelopes until the client goes away.
async fn handle_watch(
    writer: &mut OwnedWriteHalf,
    ctx: &ListenCtx,
    filter: RunFilter,
) -> Result<(), FrameError> {
    info!("live runs connect");
    let (feed_id, mut rx, snapshot) = {
        let mut store = ctx.shared.store.lock();
        let feed = store.subscribe();
        let (when, runs) = store.query(&filter, SystemClock.now());
        let snapshot = envelope_for(&store, when, &runs);
        (feed.id, feed.rx, snapshot)
    };

    let stream = async {
        wire::send_timeout(writer, &Response::Runs { envelope: snapshot }, IO_TIMEOUT).await?;
        while let Some((when, runs)) = rx.recv().await {
            let runs: Vec<Run> = runs.into_iter().filter(|r| filter.matches(r)).collect();
            if runs.is_empty() {
                continue;
            }
            let envelope = {
                let store = ctx.shared.store.lock();
                envelope_for(&store, when, &runs)
            };
            wire::send_timeout(writer, &Response::Runs { envelope }, IO_TIMEOUT).await?;
        }
        Ok(())
    }
    .await;

    ctx.shared.store.lock().unsubscribe(feed_id);
    info!("live runs disconnect");
    stream
}
