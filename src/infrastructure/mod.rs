//! Infrastructure layer
//!
//! Concrete adapters for external dependencies: configuration loading,
//! logging setup, the `DetectResult` cache, and in-memory mock
//! implementations of the external collaborator ports.

pub mod config;
pub mod detect_cache;
pub mod logging;
pub mod mock;
pub mod secret_scrubbing;
