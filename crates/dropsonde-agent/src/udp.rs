// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP listener: one datagram is one message.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{ListenerError, Protocol};
use crate::message::{hand_off, RawMessage};
use crate::port::Port;
use crate::BUFFER_SIZE;

/// A bound UDP socket, ready to serve.
pub struct UdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpListener {
    /// Binds to `host` on the port currently held by `port`, then stores the
    /// realized port back into it.
    pub async fn bind(host: &str, port: &Port) -> Result<Self, ListenerError> {
        let address = format!("{}:{}", host, port.get());
        let bind_error = |source| ListenerError::Bind {
            protocol: Protocol::Udp,
            address: address.clone(),
            source,
        };

        let socket = UdpSocket::bind(&address).await.map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;
        port.set(local_addr.port());

        info!("dropsonde-udp: listening on {}", local_addr);
        Ok(Self { socket, local_addr })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives datagrams until `shutdown` is cancelled or a receive fails.
    ///
    /// Empty datagrams are logged and skipped. Every other datagram is handed
    /// to `conduit`, waiting for the agent to accept it. The socket is closed
    /// when this returns.
    pub async fn serve(
        self,
        conduit: mpsc::Sender<RawMessage>,
        shutdown: CancellationToken,
    ) -> Result<(), ListenerError> {
        let mut buf = [0; BUFFER_SIZE];

        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("dropsonde-udp: shutting down listener on {}", self.local_addr);
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result,
            };

            let (amt, src) = received.map_err(|source| ListenerError::Receive {
                protocol: Protocol::Udp,
                source,
            })?;

            let Some(message) = RawMessage::new(buf[..amt].to_vec()) else {
                warn!("dropsonde-udp: received empty datagram from {}", src);
                continue;
            };

            trace!("dropsonde-udp: received {} bytes from {}", amt, src);
            hand_off(&conduit, message).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tracing_test::traced_test;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    async fn start_listener() -> (
        SocketAddr,
        mpsc::Receiver<RawMessage>,
        CancellationToken,
        tokio::task::JoinHandle<Result<(), ListenerError>>,
    ) {
        let port = Port::new(0);
        let listener = UdpListener::bind("127.0.0.1", &port)
            .await
            .expect("bind failed");
        assert_ne!(port.get(), 0);
        assert_eq!(listener.local_addr().port(), port.get());

        let addr = listener.local_addr();
        let (tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(listener.serve(tx, shutdown.clone()));
        (addr, rx, shutdown, task)
    }

    #[tokio::test]
    async fn test_forwards_datagram() {
        let (addr, mut rx, shutdown, task) = start_listener().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        client.send_to(b"test-data", addr).await.expect("send");

        let msg = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("conduit closed");
        assert_eq!(msg.as_bytes(), b"test-data");

        shutdown.cancel();
        assert!(task.await.expect("listener panicked").is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skips_empty_datagram() {
        let (addr, mut rx, shutdown, task) = start_listener().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        client.send_to(&[], addr).await.expect("send empty");
        client.send_to(b"test-data", addr).await.expect("send");

        let msg = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("conduit closed");
        assert_eq!(msg.as_bytes(), b"test-data");
        assert!(logs_contain("received empty datagram"));

        shutdown.cancel();
        assert!(task.await.expect("listener panicked").is_ok());
        assert!(rx.try_recv().is_err());
    }

    // Linux and macOS truncate an oversized datagram to the buffer.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_truncates_oversized_datagram() {
        let (addr, mut rx, shutdown, task) = start_listener().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        client
            .send_to(&vec![9u8; BUFFER_SIZE + 904], addr)
            .await
            .expect("send");

        let msg = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("conduit closed");
        assert_eq!(msg.len(), BUFFER_SIZE);
        assert!(msg.as_bytes().iter().all(|b| *b == 9));

        shutdown.cancel();
        assert!(task.await.expect("listener panicked").is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let port = Port::new(taken.local_addr().expect("addr").port());

        let result = UdpListener::bind("127.0.0.1", &port).await;

        assert!(matches!(
            result,
            Err(ListenerError::Bind {
                protocol: Protocol::Udp,
                ..
            })
        ));
    }
}
