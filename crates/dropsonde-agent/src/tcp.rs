// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TCP listener: one connection is one message.
//!
//! Connections are served one at a time. Each accepted connection gets a
//! bounded read deadline, so an idle or slow client delays the next one by
//! at most that deadline.
//!
//! Failures are classified by what they affect:
//! - an `accept` failure means the listening socket is unusable and ends the
//!   loop;
//! - a read failure (including the deadline expiring) only affects that one
//!   client, so the connection is logged, discarded and the loop goes back to
//!   `accept`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{ListenerError, Protocol};
use crate::message::{hand_off, RawMessage};
use crate::port::Port;
use crate::BUFFER_SIZE;

/// A bound TCP listening socket, ready to serve.
pub struct TcpListener {
    listener: TokioTcpListener,
    local_addr: SocketAddr,
    read_timeout: Duration,
}

impl TcpListener {
    /// Binds to `host` on the port currently held by `port`, then stores the
    /// realized port back into it.
    pub async fn bind(
        host: &str,
        port: &Port,
        read_timeout: Duration,
    ) -> Result<Self, ListenerError> {
        let address = format!("{}:{}", host, port.get());
        let bind_error = |source| ListenerError::Bind {
            protocol: Protocol::Tcp,
            address: address.clone(),
            source,
        };

        let listener = TokioTcpListener::bind(&address)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        port.set(local_addr.port());

        info!(
            "dropsonde-tcp: listening on {} (read timeout {:?})",
            local_addr, read_timeout
        );
        Ok(Self {
            listener,
            local_addr,
            read_timeout,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` is cancelled or `accept` fails.
    ///
    /// The listening socket is closed when this returns.
    pub async fn serve(
        self,
        conduit: mpsc::Sender<RawMessage>,
        shutdown: CancellationToken,
    ) -> Result<(), ListenerError> {
        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("dropsonde-tcp: shutting down listener on {}", self.local_addr);
                    return Ok(());
                }
                result = self.listener.accept() => result,
            };
            let (mut stream, peer) = accepted.map_err(ListenerError::Accept)?;
            trace!("dropsonde-tcp: accepted connection from {}", peer);

            let read = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("dropsonde-tcp: dropping connection from {} on shutdown", peer);
                    return Ok(());
                }
                result = read_payload(&mut stream, self.read_timeout) => result,
            };

            match read {
                Ok(payload) => match RawMessage::new(payload) {
                    Some(message) => {
                        trace!(
                            "dropsonde-tcp: received {} bytes from {}",
                            message.len(),
                            peer
                        );
                        hand_off(&conduit, message).await?;
                    }
                    None => debug!("dropsonde-tcp: connection from {} sent no data", peer),
                },
                Err(e) => warn!("dropsonde-tcp: discarding connection from {}: {}", peer, e),
            }
        }
    }
}

/// Reads one payload: until the peer closes or [`BUFFER_SIZE`] bytes have
/// arrived, whichever comes first.
///
/// Bytes received before a read error or before `deadline` expires are
/// discarded along with the error.
async fn read_payload<R>(reader: &mut R, deadline: Duration) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0; BUFFER_SIZE];
    let mut filled = 0;

    let fill = async {
        while filled < BUFFER_SIZE {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok::<(), io::Error>(())
    };

    let result = timeout(deadline, fill).await;
    match result {
        Ok(Ok(())) => {
            buf.truncate(filled);
            Ok(buf)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no end of stream within {:?}", deadline),
        )),
    }
}
