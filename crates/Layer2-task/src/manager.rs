//! Task Manager - supervises agent processes
//!
//! Features:
//! - Launch one agent CLI process per task and feed it the initial prompt
//! - Relay clarification answers back to a waiting process
//! - Graceful cancellation with a forced kill after a grace period
//! - Session affinity: a context key resumes the last session seen for it

use crate::command::LaunchCommand;
use crate::protocol::{encode, UserMessage};
use crate::reader::{capture_stderr, Reader, TaskMap};
use crate::session::SessionStore;
use crate::state::Transition;
use crate::task::{ProcessHandle, Task, TaskStatus};
use relay_foundation::{BridgeConfig, Error, Result, TaskObserver};
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-task launch options
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Overrides the configured model
    pub model: Option<String>,

    /// Conversation key for session affinity
    pub context_key: Option<String>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }
}

/// Task Manager - owns every task and the session store of one bridge
#[derive(Clone)]
pub struct TaskManager {
    /// All tasks by ID, live and terminal
    tasks: TaskMap,

    /// Context key → session id
    sessions: Arc<SessionStore>,

    /// Configuration
    config: Arc<BridgeConfig>,
}

impl TaskManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            tasks: TaskMap::default(),
            sessions: Arc::new(SessionStore::with_expiry(config.session_expiry())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Launch command for the configured binary and permission mode
    pub fn build_command(&self, model: Option<&str>, resume: Option<&str>) -> LaunchCommand {
        LaunchCommand::new(&self.config.command)
            .model(model)
            .resume(resume)
            .permissions(&self.config.allowed_tools)
            .working_dir(self.config.working_dir.as_deref())
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Launch a task and write its prompt.
    ///
    /// Returns once the prompt is flushed; progress, questions and the final
    /// result arrive through `observer`. Fails with `DuplicateTask` while a
    /// task with the same id is still live.
    pub async fn start_task(
        &self,
        task_id: &str,
        prompt: &str,
        observer: Arc<dyn TaskObserver>,
        options: TaskOptions,
    ) -> Result<()> {
        let line = encode(&UserMessage::new(prompt))?;

        let mut tasks = self.tasks.write().await;
        if tasks.get(task_id).is_some_and(Task::is_active) {
            return Err(Error::DuplicateTask(task_id.to_string()));
        }

        let resume = options
            .context_key
            .as_deref()
            .and_then(|key| self.sessions.get(key));
        let model = options.model.as_deref().or(self.config.model.as_deref());
        let command = self.build_command(model, resume.as_deref());

        info!("Starting task [{}]: {}", task_id, command.program());
        debug!("Task [{}] argv: {:?}", task_id, command.argv());
        if let Some(session_id) = &resume {
            info!("Task [{}] resuming session {}", task_id, session_id);
        }

        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| Error::spawn(command.program(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("agent stdout is not piped".to_string()))?;
        let process = ProcessHandle::new(child.id(), child.stdin.take());
        let stderr = capture_stderr(child.stderr.take(), self.config.max_output_len);

        tasks.insert(
            task_id.to_string(),
            Task::new(
                task_id,
                options.context_key.clone(),
                self.config.max_output_len,
                Arc::clone(&process),
            ),
        );
        drop(tasks);

        if let Err(e) = process.write_line(&line).await {
            warn!("Task [{}] failed to write prompt: {}", task_id, e);
            stderr.abort();
            let _ = child.start_kill();
            let mut tasks = self.tasks.write().await;
            if tasks
                .get(task_id)
                .is_some_and(|task| Arc::ptr_eq(&task.process, &process))
            {
                tasks.remove(task_id);
            }
            return Err(e.into());
        }

        let reader = Reader {
            task_id: task_id.to_string(),
            tasks: Arc::clone(&self.tasks),
            sessions: Arc::clone(&self.sessions),
            observer,
            process,
            question_tool: self.config.question_tool.clone(),
        };
        tokio::spawn(reader.run(child, stdout, stderr));

        Ok(())
    }

    /// Relay an answer to a task waiting on a clarification question
    pub async fn send_answer(&self, task_id: &str, answer: &str) -> Result<()> {
        let line = encode(&UserMessage::new(answer))?;

        let process = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
            if !task.state.accepts_answer() {
                return Err(Error::invalid_state(task_id, task.state.as_str()));
            }
            if task.process.is_exited() {
                return Err(Error::ProcessExited(task_id.to_string()));
            }
            task.transition(Transition::AnswerSent)
                .map_err(|e| Error::invalid_state(task_id, e.from.as_str()))?;
            Arc::clone(&task.process)
        };

        // Written outside the registry lock; the reader needs it to dispatch
        if let Err(e) = process.write_line(&line).await {
            warn!("Task [{}] failed to write answer: {}", task_id, e);
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks
                .get_mut(task_id)
                .filter(|task| Arc::ptr_eq(&task.process, &process))
            {
                // Only a task still running on our answer goes back to waiting
                let _ = task.transition(Transition::AnswerUndelivered);
            }
            return Err(match e.kind() {
                io::ErrorKind::BrokenPipe => Error::ProcessExited(task_id.to_string()),
                _ => Error::Io(e),
            });
        }

        info!("Task [{}] answer sent", task_id);
        Ok(())
    }

    /// Stop a task.
    ///
    /// Unknown or already-terminal ids are a no-op. The task is marked
    /// cancelled first, then the process gets a termination request and, if
    /// it is still alive after the grace period, a forced kill.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let process = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else {
                debug!("Cancel for unknown task [{}] ignored", task_id);
                return Ok(());
            };
            if task.transition(Transition::Cancelled).is_err() {
                debug!("Task [{}] already {}", task_id, task.state);
                return Ok(());
            }
            Arc::clone(&task.process)
        };

        info!("Cancelling task [{}]", task_id);
        process.terminate();

        let grace = self.config.cancel_grace();
        if !process.wait_exited(grace).await {
            warn!(
                "Task [{}] still running after {:?}, killing",
                task_id, grace
            );
            process.request_kill();
            process.wait_exited(grace).await;
        }

        Ok(())
    }

    /// Current state label and session id, or `"not_found"`
    pub async fn get_task_status(&self, task_id: &str) -> TaskStatus {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(Task::status)
            .unwrap_or_else(TaskStatus::not_found)
    }

    /// Every known task, sorted by id
    pub async fn list_tasks(&self) -> Vec<(String, TaskStatus)> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<_> = tasks
            .iter()
            .map(|(id, task)| (id.clone(), task.status()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    // ========================================================================
    // Session operations
    // ========================================================================

    pub fn get_session_id(&self, key: &str) -> Option<String> {
        self.sessions.get(key)
    }

    pub fn set_session_id(&self, key: &str, session_id: &str) {
        self.sessions.set(key, session_id);
    }

    pub fn clear_session(&self, key: &str) -> bool {
        self.sessions.clear(key)
    }

    /// Drop expired session entries, returning how many were removed
    pub fn cleanup_expired_sessions(&self) -> usize {
        self.sessions.sweep()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ChannelObserver;
    use crate::state::TaskState;
    use std::time::Duration;

    /// Insert a task with no process behind it
    async fn insert_detached(manager: &TaskManager, id: &str, state: TaskState) {
        let mut task = Task::new(id, None, 100, ProcessHandle::new(None, None));
        task.state = state;
        manager.tasks.write().await.insert(id.to_string(), task);
    }

    #[test]
    fn test_build_command_uses_config() {
        let manager = TaskManager::new(
            BridgeConfig::new()
                .command("/opt/agent/bin/claude")
                .allowed_tools(["Read", "Edit"]),
        );
        let cmd = manager.build_command(Some("opus"), Some("sess-9"));
        assert_eq!(cmd.program(), "/opt/agent/bin/claude");
        let args = cmd.args().join(" ");
        assert!(args.contains("--model opus"));
        assert!(args.contains("--resume sess-9"));
        assert!(args.contains("--allowedTools Read,Edit"));
        assert!(!args.contains("--dangerously-skip-permissions"));
    }

    #[tokio::test]
    async fn test_status_of_unknown_task() {
        let manager = TaskManager::default();
        let status = manager.get_task_status("nope").await;
        assert_eq!(status.status, "not_found");
        assert!(status.session_id.is_none());
    }

    #[tokio::test]
    async fn test_send_answer_errors() {
        let manager = TaskManager::default();

        let err = manager.send_answer("ghost", "hi").await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(ref id) if id == "ghost"));

        insert_detached(&manager, "busy", TaskState::Running).await;
        let err = manager.send_answer("busy", "hi").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Task busy is not waiting for an answer (status: running)"
        );

        insert_detached(&manager, "done", TaskState::Completed).await;
        let err = manager.send_answer("done", "hi").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { ref state, .. } if state == "completed"));
    }

    #[tokio::test]
    async fn test_failed_answer_write_keeps_question_pending() {
        let manager = TaskManager::default();
        insert_detached(&manager, "t-1", TaskState::WaitingForAnswer).await;

        // The detached handle has no stdin but is not yet flagged as exited,
        // as when the process dies before its reader finalizes
        let err = manager.send_answer("t-1", "yes").await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited(_)));
        assert_eq!(
            manager.get_task_status("t-1").await.status,
            "waiting_for_answer"
        );

        // A retry reports the dead process again instead of a state error
        let err = manager.send_answer("t-1", "yes").await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited(_)));
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_terminal_are_noops() {
        let manager = TaskManager::default();
        manager.cancel_task("ghost").await.unwrap();

        insert_detached(&manager, "done", TaskState::Failed).await;
        manager.cancel_task("done").await.unwrap();
        assert_eq!(manager.get_task_status("done").await.status, "failed");
    }

    #[tokio::test]
    async fn test_cancel_marks_cancelled_before_exit() {
        let manager = TaskManager::new(BridgeConfig::new().cancel_grace_secs(0));
        insert_detached(&manager, "t-1", TaskState::WaitingForAnswer).await;

        manager.cancel_task("t-1").await.unwrap();
        assert_eq!(manager.get_task_status("t-1").await.status, "cancelled");

        let err = manager.send_answer("t-1", "late").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_live_id_is_duplicate() {
        let manager = TaskManager::default();
        insert_detached(&manager, "dup", TaskState::Running).await;

        let (observer, _rx) = ChannelObserver::new();
        let err = manager
            .start_task("dup", "again", Arc::new(observer), TaskOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTask(ref id) if id == "dup"));
        assert_eq!(manager.get_task_status("dup").await.status, "running");
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_entry() {
        let manager = TaskManager::new(BridgeConfig::new().command("/nonexistent/agent-binary"));
        let (observer, _rx) = ChannelObserver::new();
        let err = manager
            .start_task("t-1", "hello", Arc::new(observer), TaskOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(err.is_user_facing());
        assert_eq!(manager.get_task_status("t-1").await.status, "not_found");
    }

    #[tokio::test]
    async fn test_list_tasks_sorted() {
        let manager = TaskManager::default();
        insert_detached(&manager, "b", TaskState::Running).await;
        insert_detached(&manager, "a", TaskState::Completed).await;

        let list = manager.list_tasks().await;
        let ids: Vec<_> = list.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(list[0].1.status, "completed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_operations() {
        let manager = TaskManager::new(BridgeConfig::new().session_expiry_secs(60));
        assert_eq!(manager.get_session_id("chan:1"), None);

        manager.set_session_id("chan:1", "sess-1");
        manager.set_session_id("chan:2", "sess-2");
        assert_eq!(manager.get_session_id("chan:1").as_deref(), Some("sess-1"));

        assert!(manager.clear_session("chan:2"));
        assert_eq!(manager.get_session_id("chan:2"), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(manager.get_session_id("chan:1"), None);
        assert_eq!(manager.cleanup_expired_sessions(), 1);
        assert_eq!(manager.cleanup_expired_sessions(), 0);
    }
}
