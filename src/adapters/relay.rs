//! Newline-delimited JSON relay sink.
//!
//! Serializes snapshots and session changes, one JSON object per line, to
//! any [`std::io::Write`].  A race relay or dashboard reads the other end
//! of the pipe or socket.
//!
//! ```text
//! {"type":"state","from":"Discovering","to":"Ready"}
//! {"type":"metrics","source":"GeneralStatus","elapsed_secs":12.5,...}
//! ```

use std::io::Write;

use log::warn;
use serde::Serialize;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::fsm::StateId;
use crate::metrics::MetricsSnapshot;
use crate::protocol::decoder::FrameKind;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayRecord<'a> {
    Metrics {
        source: FrameKind,
        #[serde(flatten)]
        snapshot: &'a MetricsSnapshot,
    },
    State {
        from: StateId,
        to: StateId,
    },
    LinkLost {
        link: u32,
    },
}

/// Event sink writing NDJSON records to `W`.
pub struct JsonRelaySink<W: Write> {
    out: W,
    records: u64,
    write_errors: u32,
}

impl<W: Write> JsonRelaySink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            records: 0,
            write_errors: 0,
        }
    }

    /// Records successfully written.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &RelayRecord<'_>) {
        let res = serde_json::to_writer(&mut self.out, record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        match res {
            Ok(()) => self.records = self.records.saturating_add(1),
            Err(e) => {
                self.write_errors = self.write_errors.saturating_add(1);
                warn!("relay write failed: {e}");
            }
        }
    }
}

impl<W: Write> EventSink for JsonRelaySink<W> {
    fn emit(&mut self, event: &AppEvent) {
        let record = match event {
            AppEvent::MetricsUpdated { source, snapshot } => RelayRecord::Metrics {
                source: *source,
                snapshot,
            },
            AppEvent::StateChanged { from, to } => RelayRecord::State {
                from: *from,
                to: *to,
            },
            AppEvent::LinkLost(link) => RelayRecord::LinkLost { link: link.0 },
            AppEvent::Started(_)
            | AppEvent::DeviceDiscovered { .. }
            | AppEvent::CommandWritten { .. } => return,
        };
        self.write_record(&record);
    }
}
