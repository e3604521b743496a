//! Bridge Config - settings for the coding-agent task bridge
//!
//! Loaded from the global config directory first, then overridden by the
//! project directory (`.coderelay/`).

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Config file name
pub const BRIDGE_CONFIG_FILE: &str = "bridge.json";

/// Default agent CLI binary
pub const DEFAULT_COMMAND: &str = "claude";

/// Default cap for accumulated task output (characters)
pub const DEFAULT_MAX_OUTPUT_LEN: usize = 50_000;

/// Default session affinity window (30 minutes)
pub const DEFAULT_SESSION_EXPIRY_SECS: u64 = 30 * 60;

/// Default wait between graceful termination and force kill
pub const DEFAULT_CANCEL_GRACE_SECS: u64 = 5;

/// Tool name the agent uses to ask the operator a question
pub const DEFAULT_QUESTION_TOOL: &str = "AskUserQuestion";

// ============================================================================
// Bridge Config
// ============================================================================

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Agent CLI binary path
    #[serde(default = "default_command")]
    pub command: String,

    /// Working directory for launched processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Explicit tool allow-list; empty launches in skip-permissions mode
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Default model (a per-task override wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_max_output_len")]
    pub max_output_len: usize,

    #[serde(default = "default_session_expiry_secs")]
    pub session_expiry_secs: u64,

    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Tool name treated as a clarification request
    #[serde(default = "default_question_tool")]
    pub question_tool: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            working_dir: None,
            allowed_tools: Vec::new(),
            model: None,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
            session_expiry_secs: DEFAULT_SESSION_EXPIRY_SECS,
            cancel_grace_secs: DEFAULT_CANCEL_GRACE_SECS,
            question_tool: default_question_tool(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project merged load
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<BridgeConfig>(BRIDGE_CONFIG_FILE)? {
                debug!("Loaded global bridge config from {}", global.base_dir().display());
                config.merge(global_config);
            }
        }

        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<BridgeConfig>(BRIDGE_CONFIG_FILE)?
            {
                debug!("Loaded project bridge config from {}", project.base_dir().display());
                config.merge(project_config);
            }
        }

        Ok(config)
    }

    /// Load from a specific store only
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<BridgeConfig>(BRIDGE_CONFIG_FILE)?
            .unwrap_or_default())
    }

    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(BRIDGE_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge another config on top of this one (other wins where set)
    pub fn merge(&mut self, other: BridgeConfig) {
        if other.command != default_command() {
            self.command = other.command;
        }
        if other.working_dir.is_some() {
            self.working_dir = other.working_dir;
        }
        if !other.allowed_tools.is_empty() {
            self.allowed_tools = other.allowed_tools;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.max_output_len != DEFAULT_MAX_OUTPUT_LEN {
            self.max_output_len = other.max_output_len;
        }
        if other.session_expiry_secs != DEFAULT_SESSION_EXPIRY_SECS {
            self.session_expiry_secs = other.session_expiry_secs;
        }
        if other.cancel_grace_secs != DEFAULT_CANCEL_GRACE_SECS {
            self.cancel_grace_secs = other.cancel_grace_secs;
        }
        if other.question_tool != default_question_tool() {
            self.question_tool = other.question_tool;
        }
    }

    // ========================================================================
    // Durations
    // ========================================================================

    pub fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session_expiry_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn session_expiry_secs(mut self, secs: u64) -> Self {
        self.session_expiry_secs = secs;
        self
    }

    pub fn cancel_grace_secs(mut self, secs: u64) -> Self {
        self.cancel_grace_secs = secs;
        self
    }
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_max_output_len() -> usize {
    DEFAULT_MAX_OUTPUT_LEN
}

fn default_session_expiry_secs() -> u64 {
    DEFAULT_SESSION_EXPIRY_SECS
}

fn default_cancel_grace_secs() -> u64 {
    DEFAULT_CANCEL_GRACE_SECS
}

fn default_question_tool() -> String {
    DEFAULT_QUESTION_TOOL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.command, "claude");
        assert!(config.allowed_tools.is_empty());
        assert!(config.model.is_none());
        assert_eq!(config.max_output_len, 50_000);
        assert_eq!(config.question_tool, "AskUserQuestion");
        assert_eq!(config.cancel_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"command": "/usr/bin/claude", "allowedTools": ["Read", "Write"]}"#)
                .unwrap();
        assert_eq!(config.command, "/usr/bin/claude");
        assert_eq!(config.allowed_tools, vec!["Read", "Write"]);
        assert_eq!(config.session_expiry_secs, DEFAULT_SESSION_EXPIRY_SECS);
    }

    #[test]
    fn test_merge_project_over_global() {
        let mut global = BridgeConfig::new().model("claude-opus-4-6").cancel_grace_secs(10);
        let project = BridgeConfig::new().command("/opt/claude").working_dir("/work");

        global.merge(project);

        assert_eq!(global.command, "/opt/claude");
        assert_eq!(global.working_dir, Some(PathBuf::from("/work")));
        // Unset fields in the project config keep the global value
        assert_eq!(global.model.as_deref(), Some("claude-opus-4-6"));
        assert_eq!(global.cancel_grace_secs, 10);
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert_eq!(BridgeConfig::load_from(&store).unwrap(), BridgeConfig::default());

        let config = BridgeConfig::new().allowed_tools(["Read"]).max_output_len(1000);
        config.save_to(&store).unwrap();
        assert_eq!(BridgeConfig::load_from(&store).unwrap(), config);
    }
}
