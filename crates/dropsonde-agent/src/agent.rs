// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent run loop.
//!
//! A run goes through four phases:
//!
//! 1. **Starting**: both sockets are bound up front. A bind failure aborts the
//!    run before any listener is spawned.
//! 2. **Running**: messages from either listener are forwarded to the emitter
//!    until the caller's stop token fires or a listener exits on its own.
//! 3. **Draining**: the shutdown token is raised so both listeners drop their
//!    sockets at their next I/O boundary. The conduit keeps being drained,
//!    without forwarding, so a listener blocked in a hand-off can finish.
//! 4. **Stopped**: both listener tasks have completed; only then does the run
//!    return.
//!
//! A listener failure that happens once the shutdown token is raised is
//! expected and is not reported. Only the first failure seen while running is
//! returned.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::AgentConfig;
use crate::emitter::Emitter;
use crate::errors::{AgentError, ListenerError, Protocol};
use crate::message::RawMessage;
use crate::port::Port;
use crate::tcp::TcpListener;
use crate::udp::UdpListener;

// Listeners wait in their hand-off until the agent has taken the previous
// message.
const CONDUIT_CAPACITY: usize = 1;

type ListenerTask = JoinHandle<Result<(), ListenerError>>;

/// Collection agent owning the UDP and TCP listeners.
pub struct Agent {
    config: AgentConfig,
    udp_port: Arc<Port>,
    tcp_port: Arc<Port>,
    emitter: Option<Arc<dyn Emitter>>,
}

impl Agent {
    /// Creates an agent forwarding to `emitter`.
    ///
    /// The ports start out as configured. They are shared with the caller
    /// through [`Agent::udp_port`] and [`Agent::tcp_port`] and keep their
    /// realized value between runs.
    #[must_use]
    pub fn new(config: AgentConfig, emitter: Option<Arc<dyn Emitter>>) -> Self {
        Self {
            udp_port: Arc::new(Port::new(config.udp_port)),
            tcp_port: Arc::new(Port::new(config.tcp_port)),
            config,
            emitter,
        }
    }

    #[must_use]
    pub fn udp_port(&self) -> Arc<Port> {
        Arc::clone(&self.udp_port)
    }

    #[must_use]
    pub fn tcp_port(&self) -> Arc<Port> {
        Arc::clone(&self.tcp_port)
    }

    /// Runs both listeners until `stop` is cancelled or one of them fails.
    ///
    /// Returns `Ok(())` after a requested stop, or the first listener failure.
    /// Both listeners have exited and closed their sockets by the time this
    /// returns.
    pub async fn run(&self, stop: CancellationToken) -> Result<(), AgentError> {
        let emitter = self.emitter.as_ref().ok_or(AgentError::NoEmitter)?;

        let udp = UdpListener::bind(&self.config.host, &self.udp_port).await?;
        let tcp = TcpListener::bind(
            &self.config.host,
            &self.tcp_port,
            self.config.tcp_read_timeout,
        )
        .await?;

        let shutdown = CancellationToken::new();
        let (conduit_tx, conduit_rx) = mpsc::channel(CONDUIT_CAPACITY);
        let udp_task = tokio::spawn(
            udp.serve(conduit_tx.clone(), shutdown.clone())
                .instrument(info_span!("listener", protocol = %Protocol::Udp)),
        );
        let tcp_task = tokio::spawn(
            tcp.serve(conduit_tx, shutdown.clone())
                .instrument(info_span!("listener", protocol = %Protocol::Tcp)),
        );
        info!("Agent started");

        let result = supervise(
            emitter.as_ref(),
            conduit_rx,
            udp_task,
            tcp_task,
            stop,
            shutdown,
        )
        .await;
        info!("Agent stopped");
        result
    }
}

async fn supervise(
    emitter: &dyn Emitter,
    mut conduit: mpsc::Receiver<RawMessage>,
    mut udp_task: ListenerTask,
    mut tcp_task: ListenerTask,
    stop: CancellationToken,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let mut udp_done = false;
    let mut tcp_done = false;

    let result = loop {
        tokio::select! {
            Some(message) = conduit.recv() => {
                debug!("Forwarding {} bytes to emitter", message.len());
                if let Err(e) = emitter.emit(message.as_bytes()) {
                    debug!("Emitter failed: {}", e);
                }
            }
            () = stop.cancelled() => {
                info!("Stop requested, shutting down listeners");
                break Ok(());
            }
            joined = &mut udp_task, if !udp_done => {
                udp_done = true;
                break classify(Protocol::Udp, joined, &shutdown);
            }
            joined = &mut tcp_task, if !tcp_done => {
                tcp_done = true;
                break classify(Protocol::Tcp, joined, &shutdown);
            }
        }
    };

    shutdown.cancel();

    // The conduit closes once both listeners have dropped their senders.
    let drain = async {
        let mut dropped = 0usize;
        while conduit.recv().await.is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} messages received during shutdown", dropped);
        }
    };
    let udp_wait = async {
        if !udp_done {
            // Shutdown is raised, so any failure here is expected.
            let _ = classify(Protocol::Udp, udp_task.await, &shutdown);
        }
    };
    let tcp_wait = async {
        if !tcp_done {
            let _ = classify(Protocol::Tcp, tcp_task.await, &shutdown);
        }
    };
    tokio::join!(drain, udp_wait, tcp_wait);

    result
}

/// Maps a listener's completion to the run's result.
///
/// Once `shutdown` is raised every failure is attributed to it, whatever the
/// error says.
fn classify(
    protocol: Protocol,
    joined: Result<Result<(), ListenerError>, JoinError>,
    shutdown: &CancellationToken,
) -> Result<(), AgentError> {
    let error = match joined {
        Ok(Ok(())) => {
            debug!("{} listener stopped", protocol);
            return Ok(());
        }
        Ok(Err(e)) => AgentError::from(e),
        Err(source) => AgentError::ListenerTask { protocol, source },
    };

    if shutdown.is_cancelled() {
        debug!("{} listener stopped during shutdown: {}", protocol, error);
        Ok(())
    } else {
        error!("{} listener failed: {}", protocol, error);
        Err(error)
    }
}
