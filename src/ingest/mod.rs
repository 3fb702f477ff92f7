//! Framed event ingestion over TCP.

pub mod codec;
pub mod event;
pub mod stats;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::dispatch::Dispatcher;
use crate::ingest::stats::IngestStats;

/// Accepts framed event streams from instrumented processes and feeds
/// decoded events through the dispatcher.
///
/// Each connection gets its own task; decoding and dispatch run inline
/// on it, so connections are the unit of concurrency.
pub struct SocketIngest {
    addr: String,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    bound: Option<SocketAddr>,
}

impl SocketIngest {
    pub fn new(addr: String, dispatcher: Arc<Dispatcher>, stats: Arc<IngestStats>) -> Self {
        Self {
            addr,
            dispatcher,
            stats,
            cancel: CancellationToken::new(),
            accept_task: None,
            bound: None,
        }
    }

    /// Bind the listener and start accepting connections.
    pub async fn start(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("binding ingest listener on {}", self.addr))?;
        self.bound = listener.local_addr().ok();
        info!(addr = %self.addr, "ingest listening");

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// The address the listener actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound
    }

    /// Stop accepting and close existing connections.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("ingest accept loop stopped");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                debug!(%peer, "runtime connected");
                stats.record_connection_opened();

                let dispatcher = Arc::clone(&dispatcher);
                let stats = Arc::clone(&stats);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    match serve_connection(stream, &dispatcher, &stats, cancel).await {
                        Ok(()) => debug!(%peer, "runtime disconnected"),
                        Err(err) => warn!(%peer, error = %err, "connection closed"),
                    }
                    stats.record_connection_closed();
                });
            }
        }
    }
}

/// Read frames off one connection until it closes, errors, or the
/// agent shuts down. Any decode error is fatal for the connection
/// since the stream cannot be resynchronized.
async fn serve_connection(
    mut stream: TcpStream,
    dispatcher: &Dispatcher,
    stats: &IngestStats,
    cancel: CancellationToken,
) -> Result<()> {
    let mut buf = [0u8; codec::MAX_FRAME_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_exact(&mut buf[..codec::HEADER_SIZE]) => {
                match read {
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(err) => return Err(err).context("reading frame header"),
                }

                let total = codec::frame_len(buf[22]);
                if total > buf.len() {
                    stats.record_decode_error();
                    bail!("header declares {} payload slots", buf[22]);
                }
                stream
                    .read_exact(&mut buf[codec::HEADER_SIZE..total])
                    .await
                    .context("reading frame payload")?;
                stats.record_frame();

                match codec::decode_frame(&buf[..total]) {
                    Ok(event) => {
                        if dispatcher.dispatch(&event) {
                            stats.record_dispatched();
                        } else {
                            stats.record_unrecognized();
                        }
                    }
                    Err(err) => {
                        stats.record_decode_error();
                        return Err(err).context("decoding frame");
                    }
                }
            }
        }
    }
}
