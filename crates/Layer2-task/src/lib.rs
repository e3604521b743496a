//! # relay-task
//!
//! Task bridge for CodeRelay. Runs a coding-agent CLI as a subprocess per
//! task and talks to it over newline-delimited stream-json.
//!
//! ## Features
//!
//! - Task supervision: start, answer, cancel, status
//! - Background stream reader per task with exactly-once completion
//! - Bounded output accumulation with a truncation marker
//! - Session affinity by context key, with read-time expiry
//!
//! ```ignore
//! let manager = TaskManager::new(BridgeConfig::load()?);
//! let (observer, mut events) = ChannelObserver::new();
//! manager
//!     .start_task("task-1", "Fix the failing test", Arc::new(observer), TaskOptions::new())
//!     .await?;
//! while let Some(event) = events.recv().await { /* ... */ }
//! ```

pub mod command;
pub mod manager;
pub mod observer;
pub mod output;
pub mod protocol;
mod reader;
pub mod session;
pub mod state;
pub mod task;

// Task system
pub use manager::{TaskManager, TaskOptions};
pub use state::{TaskState, Transition, TransitionError};
pub use task::{Task, TaskStatus};

// Callbacks
pub use observer::{ChannelObserver, TaskNotification};
pub use relay_foundation::TaskObserver;

// Protocol and building blocks
pub use command::LaunchCommand;
pub use output::{OutputBuffer, MAX_OUTPUT_LEN};
pub use protocol::{decode_line, encode, AssistantMessage, ContentBlock, StreamEvent, UserMessage};
pub use session::{SessionStore, DEFAULT_SESSION_EXPIRY};
