//! Core Traits
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Caller (message routing layer)                             │
//! │  └── TaskObserver impl (forwards progress / questions)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer2-Task                                                │
//! │  ├── TaskManager (one subprocess per task)                  │
//! │  └── stream reader → TaskObserver callbacks                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer1-Foundation (this layer)                             │
//! │  ├── Trait definitions                                      │
//! │  └── Error / Config / Storage                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

// ============================================================================
// TaskObserver - task lifecycle callbacks
// ============================================================================

/// Receives a delegated task's lifecycle.
///
/// Implementations get plain identifiers and strings, never the task itself.
/// `on_output` and `on_question` are invoked in the order the agent emitted
/// them; `on_complete` is invoked exactly once per started task.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    /// Assistant text produced while the task runs
    async fn on_output(&self, task_id: &str, text: &str);

    /// The agent needs an answer before it can continue
    async fn on_question(&self, task_id: &str, question: &str, tool_call_id: &str);

    /// The task finished (successfully or not)
    async fn on_complete(&self, task_id: &str, result: &str);
}
