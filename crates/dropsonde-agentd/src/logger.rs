// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line format for the agent binary:
//!
//! ```text
//! DROPSONDE | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! Each listener loop runs inside a `listener{protocol=...}` span, so its
//! lines say which transport they come from:
//!
//! ```text
//! DROPSONDE | INFO | Agent started
//! DROPSONDE | WARN | listener{protocol=udp}: dropsonde-udp: received empty datagram from 127.0.0.1:53122
//! DROPSONDE | WARN | listener{protocol=tcp}: dropsonde-tcp: discarding connection from 127.0.0.1:40110: no end of stream within 5s
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter prefixing every line with `DROPSONDE` and the level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "DROPSONDE | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // The fmt layer stores formatted fields when a span is
                // created; a span without them is printed bare.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
