//! Core Module - interfaces shared across layers
//!
//! - `traits.rs`: `TaskObserver`, the callback surface a task bridge reports through

pub mod traits;

pub use traits::TaskObserver;
