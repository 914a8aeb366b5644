//! The run registry: owns every in-flight run, assigns ids, relays
//! transport events to subscribers, and routes cancellation.
//!
//! `start()` performs all validation synchronously and returns without
//! touching the network; a spawned relay task drives the transport stream
//! and re-broadcasts events in arrival order. Runs progress independently:
//! the table is sharded (`DashMap`) and each run has exactly one relay
//! task, so no run is ever mutated from two call sites concurrently.
//!
//! Cancellation discipline: `cancel()` removes the run entry before
//! anything else. Delta publication re-checks the entry under the same
//! shard lock, so once `cancel()` returns no delta can be observed by any
//! subscriber, even if the transport had buffered events.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use quill_core::{RunErrorInfo, RunEvent, RunId, RunOutcome, TelemetrySink};
use quill_llm::{Transport, TransportEvent, TransportRequest};
use quill_prompt::{
    InjectedContext, PromptHashes, SkillPromptInput, assemble, hash_prompt,
    validate_and_normalize,
};

use crate::error::RunError;
use crate::run::{Run, RunPrompt, RunState};
use crate::skills::SkillStore;

/// Per-run broadcast buffer. A subscriber that lags this far behind loses
/// oldest events, matching broadcast-channel semantics.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A request to start a run.
#[derive(Clone, Debug)]
pub struct StartRequest {
    /// Skill to invoke (or [`crate::skills::COMPLETION_SKILL_ID`]).
    pub skill_id: String,
    /// Named template variables.
    pub input: SkillPromptInput,
    /// Auxiliary context, validated and normalized by `start()`.
    pub injected: InjectedContext,
}

/// Successful result of `start()`.
pub struct StartedRun {
    /// The allocated run id.
    pub run_id: RunId,
    /// Whether events arrive incrementally.
    pub stream: bool,
    /// Hashes computed over the assembled prompt and normalized context.
    pub hashes: PromptHashes,
    /// The normalized injected context, echoed back to the caller.
    pub injected: InjectedContext,
    /// Primary event subscription, live from before the first event.
    pub events: broadcast::Receiver<RunEvent>,
}

struct RunEntry {
    run: Run,
    events_tx: broadcast::Sender<RunEvent>,
    cancel: CancellationToken,
}

/// Owns the set of in-flight runs.
pub struct RunRegistry {
    runs: DashMap<RunId, RunEntry>,
    skills: Arc<dyn SkillStore>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RunRegistry {
    /// Create a registry over a skill store and telemetry sink.
    pub fn new(skills: Arc<dyn SkillStore>, telemetry: Arc<dyn TelemetrySink>) -> Arc<Self> {
        Arc::new(Self {
            runs: DashMap::new(),
            skills,
            telemetry,
        })
    }

    /// Number of live (non-terminal) runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no runs are in flight.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Current state of a run, `None` once it is terminal and evicted.
    pub fn state(&self, run_id: &RunId) -> Option<RunState> {
        self.runs.get(run_id).map(|entry| entry.run.state)
    }

    /// Validate a request and start a run on the given transport.
    ///
    /// Any validation failure returns before a run id is allocated and
    /// before the transport is contacted; registry state is unchanged.
    /// On success the relay task is spawned and the call returns
    /// immediately — it never blocks on network or model I/O.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(skill_id = %request.skill_id))]
    pub fn start(
        self: &Arc<Self>,
        request: StartRequest,
        transport: Arc<dyn Transport>,
    ) -> Result<StartedRun, RunError> {
        let definition = self
            .skills
            .get_skill_definition(&request.skill_id)
            .ok_or_else(|| RunError::SkillNotFound {
                skill_id: request.skill_id.clone(),
            })?;
        let prompt = assemble(&definition, &request.input)?;
        let injected = validate_and_normalize(&request.injected)?;
        transport.validate_config().map_err(RunError::Config)?;
        let hashes = hash_prompt(&prompt, &injected);

        let run_id = RunId::new();
        let (events_tx, events) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let run = Run {
            run_id: run_id.clone(),
            skill_id: request.skill_id.clone(),
            state: RunState::Pending,
            prompt: RunPrompt {
                system_prompt: prompt.system_prompt.clone(),
                user_content: prompt.user_content.clone(),
                stable_prefix_hash: hashes.stable_prefix.clone(),
                prompt_hash: hashes.full.clone(),
            },
            injected: injected.clone(),
            created_at: Instant::now(),
        };

        let _ = self.runs.insert(
            run_id.clone(),
            RunEntry {
                run,
                events_tx,
                cancel: cancel.clone(),
            },
        );
        self.telemetry.run_started(&run_id, &request.skill_id);
        debug!(run_id = %run_id, transport = transport.name(), "run started");

        let transport_request = TransportRequest {
            run_id: run_id.clone(),
            system_prompt: prompt.system_prompt,
            user_content: prompt.user_content,
            prefix_hash: hashes.stable_prefix.clone(),
            model: None,
        };
        let stream = transport.supports_streaming();
        let registry = Arc::clone(self);
        let relay_id = run_id.clone();
        let _ = tokio::spawn(async move {
            registry.relay(relay_id, transport, transport_request, cancel).await;
        });

        Ok(StartedRun {
            run_id,
            stream,
            hashes,
            injected,
            events,
        })
    }

    /// Cancel a run. Idempotent: cancelling an unknown or already-terminal
    /// run is a no-op, not an error.
    pub fn cancel(&self, run_id: &RunId) {
        // Remove-first makes the guarantee atomic: once the entry is gone,
        // no delta can pass the publish check.
        let Some((_, mut entry)) = self.runs.remove(run_id) else {
            debug!(run_id = %run_id, "cancel on unknown or terminal run — no-op");
            return;
        };
        entry.cancel.cancel();
        entry.run.state = RunState::Cancelled;
        let duration = entry.run.created_at.elapsed();
        let _ = entry.events_tx.send(RunEvent::Cancelled);
        self.telemetry
            .run_finished(run_id, RunOutcome::Cancelled, duration);
        debug!(run_id = %run_id, "run cancelled");
    }

    /// Subscribe to a run's events.
    ///
    /// Only events sent after subscription are observed; the primary
    /// receiver in [`StartedRun`] exists from before the first event.
    pub fn subscribe(&self, run_id: &RunId) -> Result<broadcast::Receiver<RunEvent>, RunError> {
        self.runs
            .get(run_id)
            .map(|entry| entry.events_tx.subscribe())
            .ok_or_else(|| RunError::UnknownRun(run_id.clone()))
    }

    /// Subscribe as a `Stream`, dropping lag markers.
    pub fn subscribe_stream(
        &self,
        run_id: &RunId,
    ) -> Result<futures::stream::BoxStream<'static, RunEvent>, RunError> {
        let receiver = self.subscribe(run_id)?;
        Ok(Box::pin(
            tokio_stream::wrappers::BroadcastStream::new(receiver)
                .filter_map(|item| futures::future::ready(item.ok())),
        ))
    }

    /// Drive one transport stream, re-broadcasting events in arrival
    /// order. Exactly one relay task exists per run.
    async fn relay(
        self: Arc<Self>,
        run_id: RunId,
        transport: Arc<dyn Transport>,
        request: TransportRequest,
        cancel: CancellationToken,
    ) {
        let stream_result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = transport.stream(&request) => result,
        };

        let mut stream = match stream_result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(run_id = %run_id, category = e.category(), "transport failed to start");
                self.publish_terminal(
                    &run_id,
                    RunEvent::Error { error: RunErrorInfo::from(&e) },
                    RunOutcome::Error,
                );
                return;
            }
        };

        loop {
            // `biased` polls cancellation first, so a cancelled run stops
            // relaying even when the transport has buffered events ready.
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(TransportEvent::Delta { text })) => {
                    if !self.publish_delta(&run_id, text) {
                        return;
                    }
                }
                Some(Ok(TransportEvent::Done { output })) => {
                    self.publish_terminal(
                        &run_id,
                        RunEvent::Done { output },
                        RunOutcome::Done,
                    );
                    return;
                }
                Some(Err(e)) => {
                    self.publish_terminal(
                        &run_id,
                        RunEvent::Error { error: RunErrorInfo::from(&e) },
                        RunOutcome::Error,
                    );
                    return;
                }
                None => {
                    // Transports promise exactly one terminal event; a bare
                    // end of stream is treated as a transport defect.
                    self.publish_terminal(
                        &run_id,
                        RunEvent::Error {
                            error: RunErrorInfo {
                                category: "transport".into(),
                                message: "stream ended without a terminal event".into(),
                            },
                        },
                        RunOutcome::Error,
                    );
                    return;
                }
            }
        }
    }

    /// Publish one delta. Returns `false` when the run is gone (cancelled
    /// or terminal), telling the relay to stop.
    fn publish_delta(&self, run_id: &RunId, text: String) -> bool {
        let Some(mut entry) = self.runs.get_mut(run_id) else {
            return false;
        };
        if entry.run.state.is_terminal() {
            return false;
        }
        if entry.run.state == RunState::Pending {
            entry.run.state = RunState::Streaming;
        }
        let _ = entry.events_tx.send(RunEvent::Delta { text });
        true
    }

    /// Publish a terminal event and evict the run.
    ///
    /// Subscribers observe the event from their receiver buffers; the
    /// registry entry itself is gone once this returns, which is what
    /// makes late `cancel()` calls no-ops.
    fn publish_terminal(&self, run_id: &RunId, event: RunEvent, outcome: RunOutcome) {
        let Some((_, mut entry)) = self.runs.remove(run_id) else {
            return;
        };
        entry.run.state = match outcome {
            RunOutcome::Done => RunState::Done,
            RunOutcome::Error => RunState::Error,
            RunOutcome::Cancelled => RunState::Cancelled,
        };
        let duration = entry.run.created_at.elapsed();
        if entry.events_tx.send(event).is_err() {
            debug!(run_id = %run_id, "terminal event dropped — no subscribers");
        }
        self.telemetry.run_finished(run_id, outcome, duration);
        debug!(run_id = %run_id, outcome = outcome.as_str(), "run finished");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
