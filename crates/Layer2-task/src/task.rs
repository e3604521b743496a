//! Task record and process handle

use crate::output::OutputBuffer;
use crate::state::{TaskState, Transition, TransitionError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex, Notify};
use tracing::debug;

/// Label reported for ids the manager does not know
pub const NOT_FOUND: &str = "not_found";

/// A delegated task, owned by the `TaskManager` for its whole lifetime
#[derive(Debug)]
pub struct Task {
    /// Caller-assigned identifier
    pub id: String,

    /// Conversation key used for session affinity
    pub context_key: Option<String>,

    /// Current state
    pub state: TaskState,

    /// Session id reported by the agent (last one wins)
    pub session_id: Option<String>,

    /// Accumulated result text
    pub output: OutputBuffer,

    /// When the task was started
    pub created_at: DateTime<Utc>,

    /// When the task reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    pub(crate) process: Arc<ProcessHandle>,
}

impl Task {
    pub(crate) fn new(
        id: impl Into<String>,
        context_key: Option<String>,
        max_output_len: usize,
        process: Arc<ProcessHandle>,
    ) -> Self {
        Self {
            id: id.into(),
            context_key,
            state: TaskState::Running,
            session_id: None,
            output: OutputBuffer::with_max_len(max_output_len),
            created_at: Utc::now(),
            completed_at: None,
            process,
        }
    }

    /// Apply a state transition, stamping `completed_at` on terminal states
    pub fn transition(&mut self, transition: Transition) -> Result<TaskState, TransitionError> {
        let next = self.state.apply(transition)?;
        if next != self.state {
            debug!("Task [{}] {} -> {}", self.id, self.state, next);
        }
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(next)
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            status: self.state.as_str(),
            session_id: self.session_id.clone(),
            state: Some(self.state),
        }
    }

    /// Execution duration so far (or total, once finished)
    pub fn duration(&self) -> Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).to_std().unwrap_or_default()
    }
}

/// Snapshot returned by `get_task_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    /// State label, or `"not_found"`
    pub status: &'static str,

    pub session_id: Option<String>,

    #[serde(skip)]
    pub state: Option<TaskState>,
}

impl TaskStatus {
    pub fn not_found() -> Self {
        Self {
            status: NOT_FOUND,
            session_id: None,
            state: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.state.is_some()
    }
}

// ============================================================================
// Process handle
// ============================================================================

/// Shared control surface for one agent process.
///
/// The reader owns the `Child` itself; everyone else reaches the process
/// through this handle: stdin writes, termination requests, and the exit flag.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Option<u32>,
    stdin: Mutex<Option<ChildStdin>>,
    kill: Notify,
    exited: watch::Sender<bool>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: Option<u32>, stdin: Option<ChildStdin>) -> Arc<Self> {
        let (exited, _) = watch::channel(false);
        Arc::new(Self {
            pid,
            stdin: Mutex::new(stdin),
            kill: Notify::new(),
            exited,
        })
    }

    /// Write one encoded line and flush.
    ///
    /// Fails with `BrokenPipe` once stdin has been closed.
    pub(crate) async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(stdin) = stdin.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    pub(crate) async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    pub(crate) fn is_exited(&self) -> bool {
        *self.exited.borrow()
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    /// Wait until the process has exited; `false` on timeout
    pub(crate) async fn wait_exited(&self, timeout: Duration) -> bool {
        let mut rx = self.exited.subscribe();
        let exited = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|exited| *exited)).await,
            Ok(Ok(_))
        );
        exited
    }

    /// Ask the process to stop (SIGTERM on Unix).
    ///
    /// Platforms without a graceful signal go straight to a kill request.
    pub(crate) fn terminate(&self) {
        if self.is_exited() {
            return;
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                // SAFETY: plain signal delivery to our own child's pid
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc == 0 {
                    return;
                }
                debug!("SIGTERM to {} failed: {}", pid, io::Error::last_os_error());
            }
        }

        self.request_kill();
    }

    /// Have the reader force-kill the process
    pub(crate) fn request_kill(&self) {
        self.kill.notify_one();
    }

    pub(crate) async fn kill_requested(&self) {
        self.kill.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_task(id: &str) -> Task {
        Task::new(id, None, 100, ProcessHandle::new(None, None))
    }

    #[test]
    fn test_new_task_is_running() {
        let task = detached_task("t-1");
        assert_eq!(task.state, TaskState::Running);
        assert!(task.is_active());
        assert!(task.completed_at.is_none());
        assert_eq!(task.output.max_len(), 100);
    }

    #[test]
    fn test_terminal_transition_stamps_completion() {
        let mut task = detached_task("t-1");
        task.transition(Transition::ExitedCleanly).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.completed_at.is_some());

        // Frozen once finished
        let elapsed = task.duration();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(task.duration(), elapsed);

        assert!(task.transition(Transition::Cancelled).is_err());
        assert_eq!(task.state, TaskState::Completed);
    }

    #[test]
    fn test_status_serialization() {
        let mut task = detached_task("t-1");
        task.session_id = Some("sess-123".into());
        let status = task.status();
        assert_eq!(status.status, "running");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"status": "running", "session_id": "sess-123"})
        );

        let missing = TaskStatus::not_found();
        assert!(!missing.is_found());
        assert_eq!(missing.status, "not_found");
    }

    #[tokio::test]
    async fn test_write_after_close_is_broken_pipe() {
        let handle = ProcessHandle::new(None, None);
        let err = handle.write_line("{}\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_exit_flag() {
        let handle = ProcessHandle::new(None, None);
        assert!(!handle.wait_exited(Duration::from_millis(10)).await);

        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.wait_exited(Duration::from_secs(5)).await })
        };
        handle.mark_exited();
        assert!(waiter.await.unwrap());
        assert!(handle.is_exited());
    }
}
