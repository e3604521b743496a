//! Channel-backed task observer

use async_trait::async_trait;
use relay_foundation::TaskObserver;
use tokio::sync::mpsc;

/// A callback invocation, as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNotification {
    Output {
        task_id: String,
        text: String,
    },
    Question {
        task_id: String,
        question: String,
        tool_call_id: String,
    },
    Complete {
        task_id: String,
        result: String,
    },
}

impl TaskNotification {
    pub fn task_id(&self) -> &str {
        match self {
            TaskNotification::Output { task_id, .. }
            | TaskNotification::Question { task_id, .. }
            | TaskNotification::Complete { task_id, .. } => task_id,
        }
    }
}

/// Forwards every callback into an unbounded mpsc channel.
///
/// Sends to a dropped receiver are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TaskNotification>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: TaskNotification) {
        let _ = self.tx.send(notification);
    }
}

#[async_trait]
impl TaskObserver for ChannelObserver {
    async fn on_output(&self, task_id: &str, text: &str) {
        self.send(TaskNotification::Output {
            task_id: task_id.to_string(),
            text: text.to_string(),
        });
    }

    async fn on_question(&self, task_id: &str, question: &str, tool_call_id: &str) {
        self.send(TaskNotification::Question {
            task_id: task_id.to_string(),
            question: question.to_string(),
            tool_call_id: tool_call_id.to_string(),
        });
    }

    async fn on_complete(&self, task_id: &str, result: &str) {
        self.send(TaskNotification::Complete {
            task_id: task_id.to_string(),
            result: result.to_string(),
        });
    }
}
