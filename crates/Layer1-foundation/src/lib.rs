//! # relay-foundation
//!
//! Foundation layer for CodeRelay:
//! - Error: operation-level error taxonomy shared by every layer
//! - Config: `BridgeConfig` (agent binary, tool allow-list, limits)
//! - Storage: `JsonStore` for global/project config files
//! - Core: `TaskObserver`, the callback interface a task reports through

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core
// ============================================================================
pub use core::TaskObserver;

// ============================================================================
// Config
// ============================================================================
pub use config::{
    BridgeConfig, BRIDGE_CONFIG_FILE, DEFAULT_CANCEL_GRACE_SECS, DEFAULT_COMMAND,
    DEFAULT_MAX_OUTPUT_LEN, DEFAULT_QUESTION_TOOL, DEFAULT_SESSION_EXPIRY_SECS,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;
