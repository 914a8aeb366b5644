//! Backend seam between the controller and the completion engine.

use std::sync::Arc;

use tokio::sync::broadcast;

use quill_core::{RunEvent, RunId};
use quill_localmodel::{CompletionRequest, LocalModelManager};
use quill_prompt::ContextRules;

/// A started completion run, as the controller sees it.
pub struct CompletionRun {
    /// Run id, used for cancellation.
    pub run_id: RunId,
    /// Event subscription, live from before the first event.
    pub events: broadcast::Receiver<RunEvent>,
}

/// Starts and cancels completion runs.
///
/// The production implementation is [`LocalModelManager`]; tests use a
/// scripted fake. Errors are opaque here on purpose — the controller
/// never surfaces them, it only logs and stays silent.
pub trait CompletionBackend: Send + Sync {
    /// Start a completion for the text before the caret.
    fn request_completion(
        &self,
        text: String,
        rules: ContextRules,
    ) -> Result<CompletionRun, Box<dyn std::error::Error + Send + Sync>>;

    /// Cancel a previously started run. Idempotent.
    fn cancel(&self, run_id: &RunId);
}

impl CompletionBackend for Arc<LocalModelManager> {
    fn request_completion(
        &self,
        text: String,
        rules: ContextRules,
    ) -> Result<CompletionRun, Box<dyn std::error::Error + Send + Sync>> {
        let started = self.complete(CompletionRequest {
            text,
            context_rules: rules,
        })?;
        Ok(CompletionRun {
            run_id: started.run_id,
            events: started.events,
        })
    }

    fn cancel(&self, run_id: &RunId) {
        self.cancel_completion(run_id);
    }
}
