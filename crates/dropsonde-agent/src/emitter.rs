// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream sinks for forwarded payloads.

use crate::errors::EmitError;
use protobuf::rt::WireType;
use protobuf::{CodedInputStream, UnknownValue};
use tracing::info;

/// Consumer of every payload the agent forwards.
///
/// Called synchronously from the agent's run loop, once per message. The
/// returned error is logged and otherwise ignored: it is neither retried nor
/// propagated.
pub trait Emitter: Send + Sync {
    fn emit(&self, data: &[u8]) -> Result<(), EmitError>;
}

/// Emitter that decodes each payload as a protobuf envelope and logs it.
///
/// Decoding is done at the wire level, so any well-formed protobuf message
/// is accepted and rendered as `field:value` pairs, e.g.
/// `1:"job-name" 2:1 3:<1:1 2:2 3:3>`. The envelope schema is not compiled
/// in, so fields are shown by number rather than by name.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEmitter;

impl LoggingEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for LoggingEmitter {
    fn emit(&self, data: &[u8]) -> Result<(), EmitError> {
        let envelope = compact_text(data)?;
        info!("Emitting {}", envelope);
        Ok(())
    }
}

/// Renders a protobuf message in compact text form.
///
/// Fails on truncated input, on field number 0 and on wire types 6 and 7.
pub fn compact_text(data: &[u8]) -> Result<String, EmitError> {
    let mut input = CodedInputStream::from_bytes(data);
    let mut fields = Vec::new();
    while let Some(tag) = input.read_raw_tag_or_eof()? {
        let field_number = tag >> 3;
        let wire_type = match WireType::new(tag & 7) {
            Some(wire_type) if field_number != 0 => wire_type,
            _ => return Err(EmitError::InvalidTag(tag)),
        };
        let value = input.read_unknown(wire_type)?;
        fields.push(format!("{}:{}", field_number, render_value(&value)));
    }
    Ok(fields.join(" "))
}

fn render_value(value: &UnknownValue) -> String {
    match value {
        UnknownValue::Varint(v) => v.to_string(),
        UnknownValue::Fixed32(v) => v.to_string(),
        UnknownValue::Fixed64(v) => v.to_string(),
        UnknownValue::LengthDelimited(bytes) => render_bytes(bytes),
    }
}

// Length-delimited fields are strings, nested messages or opaque bytes; the
// wire format does not say which, so try them in that order.
fn render_bytes(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        if !text.chars().any(char::is_control) {
            return format!("{:?}", text);
        }
    }
    if let Ok(nested) = compact_text(bytes) {
        return format!("<{}>", nested);
    }
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("0x{}", hex)
}
