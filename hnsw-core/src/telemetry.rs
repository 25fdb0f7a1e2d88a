//! Optional telemetry seam (§9 Design Notes): "the reference code has
//! process-wide time-accounting counters; treat them as an optional
//! telemetry collaborator with a narrow interface (`record(event,
//! duration)`)." The core never depends on this for correctness — every
//! public entry point on `Index` behaves identically whether or not a
//! `Telemetry` implementor is installed; ambient logging goes through
//! `tracing` instead, via `#[tracing::instrument]` on those same entry
//! points.

use std::time::Duration;

/// Narrow timing-collector interface. Implementors might forward to a
/// metrics registry, a process-wide counter table, or nowhere at all.
pub trait Telemetry: Send + Sync {
    fn record(&self, event: &str, duration: Duration);
}

/// The default: discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn record(&self, _event: &str, _duration: Duration) {}
}

/// An in-memory collector, used by tests to assert that an operation was
/// instrumented and to inspect the recorded durations.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: parking_lot::Mutex<Vec<(String, Duration)>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Duration)> {
        self.events.lock().clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record(&self, event: &str, duration: Duration) {
        self.events.lock().push((event.to_string(), duration));
    }
}
