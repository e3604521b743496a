//! Per-task stream reader
//!
//! One reader runs per launched process. It owns the `Child`, consumes stdout
//! line by line, dispatches decoded events against the task entry, and
//! finalizes the task once the process exits. Whatever happens inside, the
//! observer's `on_complete` is invoked exactly once.

use crate::output::OutputBuffer;
use crate::protocol::{decode_line, ContentBlock, StreamEvent};
use crate::session::SessionStore;
use crate::state::Transition;
use crate::task::{ProcessHandle, Task};
use futures::FutureExt;
use relay_foundation::{Result, TaskObserver};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared task registry
pub(crate) type TaskMap = Arc<RwLock<HashMap<String, Task>>>;

/// How long finalization waits for the stderr drain after a failed exit.
/// Grandchildren can hold the pipe open past the parent's exit.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Drain stderr in the background into a bounded buffer
pub(crate) fn capture_stderr(stderr: Option<ChildStderr>, max_len: usize) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut buffer = OutputBuffer::with_max_len(max_len);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).split(b'\n');
            // Keep reading past the cap so the child never blocks on a full pipe
            while let Ok(Some(line)) = lines.next_segment().await {
                buffer.append(String::from_utf8_lossy(&line).trim_end_matches('\r'));
            }
        }
        buffer.collect()
    })
}

/// Everything the reader needs to act on one task
pub(crate) struct Reader {
    pub(crate) task_id: String,
    pub(crate) tasks: TaskMap,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) observer: Arc<dyn TaskObserver>,
    pub(crate) process: Arc<ProcessHandle>,
    pub(crate) question_tool: String,
}

impl Reader {
    /// Read until end-of-stream, then finalize
    pub(crate) async fn run(self, mut child: Child, stdout: ChildStdout, stderr: JoinHandle<String>) {
        let outcome = AssertUnwindSafe(self.pump(&mut child, stdout))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(status)) => self.finalize(status, stderr).await,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                stderr.abort();
                self.fail(e.to_string()).await;
            }
            Err(panic) => {
                let _ = child.start_kill();
                stderr.abort();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "reader panicked".to_string());
                self.fail(message).await;
            }
        }
    }

    async fn pump(&self, child: &mut Child, stdout: ChildStdout) -> Result<ExitStatus> {
        // Split on raw bytes so a line of invalid UTF-8 is dropped, not fatal
        let mut lines = BufReader::new(stdout).split(b'\n');

        loop {
            tokio::select! {
                line = lines.next_segment() => match line? {
                    Some(bytes) => self.handle_line(&String::from_utf8_lossy(&bytes)).await,
                    None => break,
                },
                _ = self.process.kill_requested() => {
                    debug!("Task [{}] kill requested while reading", self.task_id);
                    let _ = child.start_kill();
                    break;
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = self.process.kill_requested() => {
                debug!("Task [{}] kill requested while waiting for exit", self.task_id);
                child.kill().await?;
                child.wait().await?
            }
        };
        Ok(status)
    }

    async fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match decode_line(line) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => debug!("Task [{}] dropping line: {}", self.task_id, e),
        }
    }

    /// Apply one event to the task and notify the observer.
    ///
    /// The registry lock is released before any observer call.
    pub(crate) async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Assistant { message } => {
                for block in message.content {
                    self.handle_block(block).await;
                }
            }
            StreamEvent::Result { result, session_id } => {
                self.with_task(|task| {
                    if let Some(session_id) = session_id {
                        if let Some(key) = &task.context_key {
                            self.sessions.set(key.clone(), session_id.clone());
                        }
                        task.session_id = Some(session_id);
                    }
                    if let Some(result) = result {
                        task.output.append(&result);
                    }
                })
                .await;
            }
            StreamEvent::Other => {}
        }
    }

    async fn handle_block(&self, block: ContentBlock) {
        match block {
            ContentBlock::Text { text } => {
                let known = self.with_task(|task| task.output.append(&text)).await;
                if known.is_some() {
                    self.observer.on_output(&self.task_id, &text).await;
                }
            }
            ContentBlock::ToolUse {
                ref id, ref name, ..
            } if *name == self.question_tool => {
                let question = block.question().unwrap_or_default();
                let asked = self
                    .with_task(|task| task.transition(Transition::QuestionAsked).is_ok())
                    .await
                    .unwrap_or(false);
                if asked {
                    info!("Task [{}] waiting for answer", self.task_id);
                    self.observer.on_question(&self.task_id, question, id).await;
                }
            }
            _ => {}
        }
    }

    async fn finalize(&self, status: ExitStatus, mut stderr: JoinHandle<String>) {
        let clean = status.success();
        self.process.mark_exited();

        let stderr_text = if clean {
            stderr.abort();
            String::new()
        } else {
            match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr).await {
                Ok(Ok(text)) => text,
                _ => {
                    stderr.abort();
                    String::new()
                }
            }
        };

        let transition = if clean {
            Transition::ExitedCleanly
        } else {
            Transition::ExitedWithError
        };
        let (mut result, finished) = self
            .with_task(|task| {
                // A cancelled task stays cancelled whatever the exit code
                let _ = task.transition(transition);
                (task.output.collect(), Some((task.state, task.duration())))
            })
            .await
            .unwrap_or_default();

        if !clean && !stderr_text.trim().is_empty() {
            result.push_str("\n\nSTDERR:\n");
            result.push_str(&stderr_text);
        }

        self.process.close_stdin().await;

        match finished {
            Some((state, elapsed)) => info!(
                "Task [{}] finished ({}) in {:.1}s: {}",
                self.task_id,
                state,
                elapsed.as_secs_f64(),
                status
            ),
            None => debug!("Task [{}] finished after its entry was replaced", self.task_id),
        }
        self.observer.on_complete(&self.task_id, &result).await;
    }

    async fn fail(&self, message: String) {
        error!("Task [{}] reader failed: {}", self.task_id, message);

        self.with_task(|task| {
            let _ = task.transition(Transition::ExitedWithError);
        })
        .await;

        self.process.mark_exited();
        self.process.close_stdin().await;

        self.observer
            .on_complete(&self.task_id, &format!("Error: {}", message))
            .await;
    }

    /// Run `f` on this reader's task entry under the write lock.
    ///
    /// `None` when the id has since been reused for a different process.
    async fn with_task<R>(&self, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut tasks = self.tasks.write().await;
        tasks
            .get_mut(&self.task_id)
            .filter(|task| Arc::ptr_eq(&task.process, &self.process))
            .map(f)
    }
}
