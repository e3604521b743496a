//! Stream-JSON protocol codec
//!
//! The agent CLI talks newline-delimited JSON on its standard streams:
//!
//! ```text
//! bridge → agent   {"type":"user","message":{"role":"user","content":"..."}}
//! agent  → bridge  {"type":"assistant","message":{"content":[{"type":"text",...}]}}
//!                  {"type":"result","result":"...","session_id":"..."}
//! ```
//!
//! Any other event type decodes to [`StreamEvent::Other`] and is ignored by
//! the reader. Lines that are not JSON at all fail with
//! `Error::ProtocolDecode`, which the reader logs and skips.

use relay_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Outbound
// ============================================================================

/// A user turn written to the agent's stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "user")]
pub struct UserMessage {
    pub message: UserContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContent {
    pub role: String,
    pub content: String,
}

impl UserMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            message: UserContent {
                role: "user".to_string(),
                content: content.into(),
            },
        }
    }
}

/// Serialize a user message as one newline-terminated line
pub fn encode(message: &UserMessage) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

// ============================================================================
// Inbound
// ============================================================================

/// One decoded line of agent output
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Any tag the bridge does not act on (system, user, stream deltas, ...)
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, deserialize_with = "blocks_lenient")]
    pub content: Vec<ContentBlock>,
}

/// Decode content blocks one by one; a block of unexpected shape becomes
/// [`ContentBlock::Other`] instead of failing its siblings.
fn blocks_lenient<'de, D>(deserializer: D) -> std::result::Result<Vec<ContentBlock>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap_or(ContentBlock::Other))
        .collect())
}

/// A block inside an assistant message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    /// `input.question` of a tool call, empty when absent or not a string
    pub fn question(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse { input, .. } => {
                Some(input.get("question").and_then(Value::as_str).unwrap_or(""))
            }
            _ => None,
        }
    }
}

/// Decode one line of agent output.
///
/// Leading/trailing whitespace is ignored. Blank and non-JSON lines fail with
/// `Error::ProtocolDecode`; JSON with an unknown `type` decodes to
/// [`StreamEvent::Other`].
pub fn decode_line(line: &str) -> Result<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::ProtocolDecode("empty line".to_string()));
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| Error::ProtocolDecode(e.to_string()))?;

    // Valid JSON that is not an event object (or lacks a type) is not an error
    // in the stream; it simply carries nothing the bridge understands.
    if !value.get("type").is_some_and(Value::is_string) {
        return Ok(StreamEvent::Other);
    }

    serde_json::from_value(value).map_err(|e| Error::ProtocolDecode(e.to_string()))
}
