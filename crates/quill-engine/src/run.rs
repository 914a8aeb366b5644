//! Run records and the run state machine.

use std::time::Instant;

use quill_core::RunId;
use quill_prompt::InjectedContext;

/// Lifecycle state of a run.
///
/// `Pending → Streaming → Done`, with `Error` and `Cancelled` reachable
/// from either non-terminal state. Terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Created, transport not yet producing events.
    Pending,
    /// At least one transport event observed.
    Streaming,
    /// Completed successfully. Terminal.
    Done,
    /// Ended with a transport error. Terminal.
    Error,
    /// Explicitly cancelled. Terminal.
    Cancelled,
}

impl RunState {
    /// Whether the run can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Streaming)
                | (Self::Streaming, Self::Done)
                | (Self::Pending | Self::Streaming, Self::Error | Self::Cancelled)
        )
    }
}

/// The prompt portion of a run record.
#[derive(Clone, Debug)]
pub struct RunPrompt {
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Rendered user content.
    pub user_content: String,
    /// Hash of the portion expected to survive minor user edits.
    pub stable_prefix_hash: String,
    /// Hash identifying the exact request.
    pub prompt_hash: String,
}

/// One tracked AI generation request.
///
/// Owned exclusively by the run registry; transports only ever see the
/// assembled request and the run id.
#[derive(Clone, Debug)]
pub struct Run {
    /// Unique id, allocated at start, never reused.
    pub run_id: RunId,
    /// The invoked skill (or the reserved inline-completion id).
    pub skill_id: String,
    /// Current lifecycle state.
    pub state: RunState,
    /// Assembled and hashed prompt.
    pub prompt: RunPrompt,
    /// Validated, normalized injected context.
    pub injected: InjectedContext,
    /// Monotonic creation timestamp.
    pub created_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        assert!(RunState::Pending.can_transition_to(RunState::Streaming));
        assert!(RunState::Streaming.can_transition_to(RunState::Done));
    }

    #[test]
    fn error_and_cancel_from_either_live_state() {
        for from in [RunState::Pending, RunState::Streaming] {
            assert!(from.can_transition_to(RunState::Error));
            assert!(from.can_transition_to(RunState::Cancelled));
        }
    }

    #[test]
    fn done_requires_streaming_first() {
        assert!(!RunState::Pending.can_transition_to(RunState::Done));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [RunState::Done, RunState::Error, RunState::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                RunState::Pending,
                RunState::Streaming,
                RunState::Done,
                RunState::Error,
                RunState::Cancelled,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal:?} must not transition to {next:?}"
                );
            }
        }
    }

    #[test]
    fn non_terminal_classification() {
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Streaming.is_terminal());
    }
}
