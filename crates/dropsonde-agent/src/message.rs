// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ListenerError;
use tokio::sync::mpsc;

/// One payload extracted from a single datagram or a single TCP connection.
///
/// Never empty: [`RawMessage::new`] is the only constructor and it rejects
/// zero-length input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage(Vec<u8>);

impl RawMessage {
    /// Wraps `data`, returning `None` when it is empty.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Option<Self> {
        if data.is_empty() {
            None
        } else {
            Some(Self(data))
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    // A RawMessage is never empty; provided for clippy's len_without_is_empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Hands `message` to the agent, waiting until it has room for it.
pub(crate) async fn hand_off(
    conduit: &mpsc::Sender<RawMessage>,
    message: RawMessage,
) -> Result<(), ListenerError> {
    conduit
        .send(message)
        .await
        .map_err(|_| ListenerError::ConduitClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_rejected() {
        assert!(RawMessage::new(Vec::new()).is_none());
    }

    #[test]
    fn test_payload_is_kept_verbatim() {
        let msg = RawMessage::new(b"test-data".to_vec()).expect("non-empty payload");
        assert_eq!(msg.as_bytes(), b"test-data");
        assert_eq!(msg.len(), 9);
        assert!(!msg.is_empty());
        assert_eq!(msg.into_bytes(), b"test-data".to_vec());
    }

    #[tokio::test]
    async fn test_hand_off_to_dropped_conduit() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let msg = RawMessage::new(vec![1]).expect("non-empty payload");
        let result = hand_off(&tx, msg).await;

        assert!(matches!(result, Err(ListenerError::ConduitClosed)));
    }
}
