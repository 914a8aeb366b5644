//! Telemetry collector seam.
//!
//! An explicitly constructed sink is handed to whichever component emits
//! timing or outcome data; there is no process-wide bridge object. Events
//! are coarse-grained and content-free: ids, outcomes, durations, error
//! categories. Prompt text never passes through here.

use std::time::Duration;

use crate::ids::RunId;

/// Terminal outcome of a run, for reporting purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Completed successfully.
    Done,
    /// Ended with a transport error.
    Error,
    /// Explicitly cancelled.
    Cancelled,
}

impl RunOutcome {
    /// Stable label used for metric dimensions and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Receives coarse-grained run lifecycle events.
pub trait TelemetrySink: Send + Sync {
    /// A run passed validation and was handed to a transport.
    fn run_started(&self, run_id: &RunId, skill_id: &str);

    /// A run reached a terminal state.
    fn run_finished(&self, run_id: &RunId, outcome: RunOutcome, duration: Duration);
}

/// Sink that discards everything.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn run_started(&self, _run_id: &RunId, _skill_id: &str) {}
    fn run_finished(&self, _run_id: &RunId, _outcome: RunOutcome, _duration: Duration) {}
}

// Metric name constants to avoid typos across crates.

/// Runs started total (counter, labels: skill).
pub const RUNS_STARTED_TOTAL: &str = "runs_started_total";
/// Runs finished total (counter, labels: outcome).
pub const RUNS_FINISHED_TOTAL: &str = "runs_finished_total";
/// Run duration seconds (histogram, labels: outcome).
pub const RUN_DURATION_SECONDS: &str = "run_duration_seconds";

/// Sink that forwards to the `metrics` facade recorder.
pub struct MetricsSink;

impl TelemetrySink for MetricsSink {
    fn run_started(&self, _run_id: &RunId, skill_id: &str) {
        metrics::counter!(RUNS_STARTED_TOTAL, "skill" => skill_id.to_owned()).increment(1);
    }

    fn run_finished(&self, _run_id: &RunId, outcome: RunOutcome, duration: Duration) {
        metrics::counter!(RUNS_FINISHED_TOTAL, "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!(RUN_DURATION_SECONDS, "outcome" => outcome.as_str())
            .record(duration.as_secs_f64());
    }
}

/// One recorded lifecycle event, as captured by [`CollectingSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// `run_started` call.
    Started { run_id: RunId, skill_id: String },
    /// `run_finished` call (duration dropped — wall time is not assertable).
    Finished { run_id: RunId, outcome: &'static str },
}

/// Sink that records events in memory, for assertions in tests.
#[derive(Default)]
pub struct CollectingSink {
    events: parking_lot::Mutex<Vec<RecordedEvent>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }
}

impl TelemetrySink for CollectingSink {
    fn run_started(&self, run_id: &RunId, skill_id: &str) {
        self.events.lock().push(RecordedEvent::Started {
            run_id: run_id.clone(),
            skill_id: skill_id.to_owned(),
        });
    }

    fn run_finished(&self, run_id: &RunId, outcome: RunOutcome, _duration: Duration) {
        self.events.lock().push(RecordedEvent::Finished {
            run_id: run_id.clone(),
            outcome: outcome.as_str(),
        });
    }
}
