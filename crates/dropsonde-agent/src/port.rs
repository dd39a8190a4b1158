// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU16, Ordering};

/// Listening port of one transport.
///
/// Holds the requested port before a run (0 asks the OS for an ephemeral
/// port) and the realized port once the listener has bound. Reads and writes
/// are single atomic operations, so a concurrent reader sees either the
/// requested value or the bound one.
#[derive(Debug, Default)]
pub struct Port(AtomicU16);

impl Port {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self(AtomicU16::new(port))
    }

    pub fn set(&self, port: u16) {
        self.0.store(port, Ordering::SeqCst);
    }

    #[must_use]
    pub fn get(&self) -> u16 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_port_set_and_get() {
        let port = Port::new(42420);
        assert_eq!(port.get(), 42420);

        port.set(0);
        assert_eq!(port.get(), 0);

        port.set(51000);
        assert_eq!(port.get(), 51000);
    }

    #[test]
    fn test_port_default_is_ephemeral() {
        assert_eq!(Port::default().get(), 0);
    }

    #[tokio::test]
    async fn test_port_visible_across_tasks() {
        let port = Arc::new(Port::new(0));

        let writer = Arc::clone(&port);
        tokio::spawn(async move { writer.set(40123) })
            .await
            .expect("writer task failed");

        assert_eq!(port.get(), 40123);
    }
}
