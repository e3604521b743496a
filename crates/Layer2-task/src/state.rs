//! Task state machine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Possible states of a delegated task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Process is working; input is not expected
    Running,

    /// The agent asked a clarification question and waits for `send_answer`
    WaitingForAnswer,

    /// Process exited cleanly
    Completed,

    /// Process exited with an error, or the reader faulted
    Failed,

    /// Stopped by `cancel_task`
    Cancelled,
}

/// Events that move a task between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A clarification-request tool call arrived
    QuestionAsked,
    /// An answer was written to the process
    AnswerSent,
    /// The answer write failed; the question is still pending
    AnswerUndelivered,
    /// Output stream ended and the process exited with code 0
    ExitedCleanly,
    /// Non-zero exit, signal, or reader fault
    ExitedWithError,
    /// Caller requested cancellation
    Cancelled,
}

/// Rejected transition; the task keeps `from`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {transition:?} from state {from}")]
pub struct TransitionError {
    pub from: TaskState,
    pub transition: Transition,
}

impl TaskState {
    /// Next state for `transition`, or an error if the move is illegal.
    ///
    /// Terminal states reject every transition.
    pub fn apply(self, transition: Transition) -> Result<TaskState, TransitionError> {
        use Transition as T;

        let next = match (self, transition) {
            (TaskState::Running, T::QuestionAsked) => Some(TaskState::WaitingForAnswer),
            (TaskState::Running, T::AnswerSent) => None,
            (TaskState::Running, T::AnswerUndelivered) => Some(TaskState::WaitingForAnswer),
            (TaskState::Running, T::ExitedCleanly) => Some(TaskState::Completed),
            (TaskState::Running, T::ExitedWithError) => Some(TaskState::Failed),
            (TaskState::Running, T::Cancelled) => Some(TaskState::Cancelled),

            // A question arriving while one is pending replaces it
            (TaskState::WaitingForAnswer, T::QuestionAsked) => Some(TaskState::WaitingForAnswer),
            (TaskState::WaitingForAnswer, T::AnswerSent) => Some(TaskState::Running),
            (TaskState::WaitingForAnswer, T::AnswerUndelivered) => None,
            (TaskState::WaitingForAnswer, T::ExitedCleanly) => Some(TaskState::WaitingForAnswer),
            (TaskState::WaitingForAnswer, T::ExitedWithError) => Some(TaskState::Failed),
            (TaskState::WaitingForAnswer, T::Cancelled) => Some(TaskState::Cancelled),

            (TaskState::Completed | TaskState::Failed | TaskState::Cancelled, _) => None,
        };

        next.ok_or(TransitionError {
            from: self,
            transition,
        })
    }

    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Only a waiting task accepts an answer
    pub fn accepts_answer(&self) -> bool {
        matches!(self, TaskState::WaitingForAnswer)
    }

    /// Wire label, as reported by `get_task_status`
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::WaitingForAnswer => "waiting_for_answer",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
