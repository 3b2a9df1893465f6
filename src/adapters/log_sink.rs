//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per
//! [`AppEvent`] through the `log` facade.

use log::{Level, info, log, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
///
/// Metrics updates arrive several times a second, so they are logged at
/// `debug` unless `verbose_metrics` is set.
#[derive(Debug, Default)]
pub struct LogEventSink {
    verbose_metrics: bool,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log metrics updates at `info` instead of `debug`.
    pub fn verbose(mut self) -> Self {
        self.verbose_metrics = true;
        self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::MetricsUpdated { source, snapshot: s } => {
                let level = if self.verbose_metrics {
                    Level::Info
                } else {
                    Level::Debug
                };
                log!(
                    level,
                    "METRICS | {} | t={:.2}s d={:.1}m pace={:.1}s/500m \
                     rate={}spm strokes={} power={}W avg={}W peak={:.1} drag={}",
                    source.name(),
                    s.elapsed_secs,
                    s.distance_m,
                    s.pace_secs,
                    s.stroke_rate,
                    s.stroke_count,
                    s.power_w,
                    s.avg_power_w,
                    s.peak_force,
                    s.drag_factor,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::DeviceDiscovered { id, rssi } => match rssi {
                Some(dbm) => info!("FOUND | {id} rssi={dbm}dBm"),
                None => info!("FOUND | {id}"),
            },
            AppEvent::CommandWritten { kind, len } => {
                info!("CMD   | {:?} ({} bytes)", kind, len);
            }
            AppEvent::LinkLost(link) => {
                warn!("LINK  | {link} lost");
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
        }
    }
}
