//! Storage module for CodeRelay
//!
//! - `json`: JSON file store for configuration

mod json;

pub use json::JsonStore;
