//! Non-interactive CLI mode

use relay_task::{ChannelObserver, TaskManager, TaskNotification, TaskOptions, TaskState};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run a single task to completion.
///
/// Progress goes to stdout, clarification questions are answered from stdin,
/// and Ctrl-C cancels the task. Returns whether the task completed.
pub async fn run_once(
    manager: &TaskManager,
    prompt: &str,
    context_key: Option<&str>,
) -> anyhow::Result<bool> {
    let task_id = uuid::Uuid::new_v4().to_string();
    let (observer, mut rx) = ChannelObserver::new();

    let mut options = TaskOptions::new();
    if let Some(key) = context_key {
        options = options.context_key(key);
    }

    manager
        .start_task(&task_id, prompt, Arc::new(observer), options)
        .await
        .map_err(|e| anyhow::anyhow!("error starting task: {}", e))?;
    println!("CodeRelay - Processing...\n");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut cancelling = false;

    loop {
        let notification = tokio::select! {
            notification = rx.recv() => notification,
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                cancelling = true;
                eprintln!("\nCancelling...");
                manager.cancel_task(&task_id).await?;
                continue;
            }
        };

        let Some(notification) = notification else {
            break;
        };

        match notification {
            TaskNotification::Output { text, .. } => {
                println!("> {}", truncate(&text, 200));
            }
            TaskNotification::Question { question, .. } => {
                println!("\n? {}", question);
                print!("answer: ");
                std::io::stdout().flush()?;

                let answer = tokio::select! {
                    line = stdin.next_line() => line?,
                    _ = tokio::signal::ctrl_c() => None,
                };
                match answer {
                    Some(answer) => {
                        if let Err(e) = manager.send_answer(&task_id, answer.trim()).await {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => {
                        cancelling = true;
                        manager.cancel_task(&task_id).await?;
                    }
                }
            }
            TaskNotification::Complete { result, .. } => {
                println!("\n{}", result);
                break;
            }
        }
    }

    let status = manager.get_task_status(&task_id).await;
    if let Some(session_id) = &status.session_id {
        tracing::info!("Session: {}", session_id);
    }
    if status.state != Some(TaskState::Completed) {
        eprintln!("Task {}", status.status);
    }
    Ok(status.state == Some(TaskState::Completed))
}

/// Single-line preview of a progress chunk
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s,
    }
}
