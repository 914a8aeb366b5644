//! Tab completion controller.
//!
//! Converts a stream of keystrokes into at most one in-flight completion
//! run. Each qualifying keystroke resets a fixed debounce deadline and
//! immediately cancels any run started for now-stale content — a stale
//! suggestion must never be displayed. When the deadline fires, exactly
//! one completion request goes out, bound to the latest caret context.
//!
//! Results appear as ghost text: a non-committed overlay that an explicit
//! accept turns into a commit, and that any further input discards.
//! Errors and cancellations clear the overlay silently — this is a
//! best-effort background feature and never interrupts typing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use quill_core::RunEvent;
use quill_prompt::ContextRules;

use crate::backend::{CompletionBackend, CompletionRun};

/// Default pause before a completion request is issued.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Controller tuning.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    /// Debounce delay between the last keystroke and the request.
    pub debounce: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Caret context captured at a keystroke.
#[derive(Clone, Debug)]
pub struct CaretContext {
    /// Document text leading up to the caret.
    pub text: String,
    /// Windowing rules for this surface.
    pub rules: ContextRules,
}

/// Ghost-text overlay instructions for the editor surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlayUpdate {
    /// Show a suggestion as inactive ghost text.
    Show(String),
    /// Remove the overlay without committing.
    Clear,
    /// Commit the accepted suggestion into the document.
    Commit(String),
}

enum Command {
    Keystroke(CaretContext),
    Accept,
    Dismiss,
}

/// Handle to the controller task.
///
/// Dropping the handle shuts the task down and cancels any in-flight run.
pub struct TabCompletionController {
    commands: mpsc::UnboundedSender<Command>,
}

impl TabCompletionController {
    /// Spawn the controller task.
    ///
    /// Returns the handle and the overlay update channel consumed by the
    /// editor surface. Must be called from within a tokio runtime.
    pub fn spawn(
        backend: Arc<dyn CompletionBackend>,
        config: CompletionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<OverlayUpdate>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (overlay_tx, overlay_rx) = mpsc::unbounded_channel();
        let _ = tokio::spawn(run_loop(backend, config, commands_rx, overlay_tx));
        (Self { commands: commands_tx }, overlay_rx)
    }

    /// A qualifying keystroke happened; restart debouncing for `context`.
    pub fn keystroke(&self, context: CaretContext) {
        let _ = self.commands.send(Command::Keystroke(context));
    }

    /// The user explicitly accepted the current suggestion.
    pub fn accept(&self) {
        let _ = self.commands.send(Command::Accept);
    }

    /// Discard any pending work and overlay (focus loss, escape).
    pub fn dismiss(&self) {
        let _ = self.commands.send(Command::Dismiss);
    }
}

async fn run_loop(
    backend: Arc<dyn CompletionBackend>,
    config: CompletionConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    overlay: mpsc::UnboundedSender<OverlayUpdate>,
) {
    let mut pending: Option<CaretContext> = None;
    let mut deadline: Option<Instant> = None;
    let mut inflight: Option<CompletionRun> = None;
    let mut ghost: Option<String> = None;

    loop {
        let sleep_target = deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                None => break,
                Some(Command::Keystroke(context)) => {
                    // Anything started for older content is now stale
                    if let Some(run) = inflight.take() {
                        backend.cancel(&run.run_id);
                    }
                    if ghost.take().is_some() {
                        let _ = overlay.send(OverlayUpdate::Clear);
                    }
                    pending = Some(context);
                    deadline = Some(Instant::now() + config.debounce);
                }
                Some(Command::Accept) => {
                    if let Some(text) = ghost.take() {
                        let _ = overlay.send(OverlayUpdate::Commit(text));
                    }
                }
                Some(Command::Dismiss) => {
                    if let Some(run) = inflight.take() {
                        backend.cancel(&run.run_id);
                    }
                    if ghost.take().is_some() {
                        let _ = overlay.send(OverlayUpdate::Clear);
                    }
                    pending = None;
                    deadline = None;
                }
            },

            () = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                deadline = None;
                if let Some(context) = pending.take() {
                    match backend.request_completion(context.text, context.rules) {
                        Ok(run) => inflight = Some(run),
                        Err(e) => {
                            // Best-effort background feature: stay silent
                            debug!(error = %e, "completion request failed");
                        }
                    }
                }
            },

            event = recv_event(&mut inflight), if inflight.is_some() => match event {
                Ok(RunEvent::Delta { .. }) => {
                    // Suggestions render whole on `done`; deltas are not
                    // surfaced mid-flight.
                }
                Ok(RunEvent::Done { output }) => {
                    inflight = None;
                    if output.text.is_empty() {
                        continue;
                    }
                    ghost = Some(output.text.clone());
                    let _ = overlay.send(OverlayUpdate::Show(output.text));
                }
                Ok(RunEvent::Error { error }) => {
                    inflight = None;
                    debug!(category = %error.category, "completion errored (silent)");
                }
                Ok(RunEvent::Cancelled) | Err(RecvError::Closed) => {
                    inflight = None;
                }
                Err(RecvError::Lagged(_)) => {}
            },
        }
    }

    // Shutdown: nothing may keep generating for a closed surface
    if let Some(run) = inflight.take() {
        backend.cancel(&run.run_id);
    }
}

async fn recv_event(inflight: &mut Option<CompletionRun>) -> Result<RunEvent, RecvError> {
    match inflight {
        Some(run) => run.events.recv().await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
