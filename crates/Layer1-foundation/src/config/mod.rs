//! Config - bridge settings
//!
//! - `bridge.rs` - BridgeConfig (binary, tools, model, limits)

mod bridge;

pub use bridge::{
    BridgeConfig, BRIDGE_CONFIG_FILE, DEFAULT_CANCEL_GRACE_SECS, DEFAULT_COMMAND,
    DEFAULT_MAX_OUTPUT_LEN, DEFAULT_QUESTION_TOOL, DEFAULT_SESSION_EXPIRY_SECS,
};
