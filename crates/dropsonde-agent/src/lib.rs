// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host-local collection agent for dropsonde event payloads.
//!
//! Producers send opaque payloads over UDP (one datagram per message) or TCP
//! (one connection per message). The [`agent::Agent`] multiplexes both
//! listeners into a single conduit and hands every non-empty payload, verbatim,
//! to an [`emitter::Emitter`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod message;
pub mod port;
pub mod tcp;
pub mod udp;

/// Size of the receive buffer shared by both transports. Larger payloads are
/// truncated at this boundary.
pub const BUFFER_SIZE: usize = 4096;
