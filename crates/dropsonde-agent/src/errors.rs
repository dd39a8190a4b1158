// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the agent, its listeners and emitters.

use std::fmt;

/// Transport a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Failures of a single listener loop.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {protocol} listener to {address}: {source}")]
    Bind {
        protocol: Protocol,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{protocol} receive failed: {source}")]
    Receive {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    #[error("tcp accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("message conduit closed")]
    ConduitClosed,
}

/// Errors surfaced by [`crate::agent::Agent::run`].
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Could not start agent. No emitter provided.")]
    NoEmitter,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("{protocol} listener task failed: {source}")]
    ListenerTask {
        protocol: Protocol,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors returned by an [`crate::emitter::Emitter`].
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] protobuf::Error),

    #[error("failed to decode envelope: invalid tag {0:#x}")]
    InvalidTag(u32),

    #[error("emitter unavailable: {0}")]
    Unavailable(String),
}
