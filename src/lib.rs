//! Autonomous cloud incident-response engine: correlates telemetry,
//! derives a root cause, matches a remediation procedure, and runs it
//! through a risk-aware safety gate.

pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod system;

pub use system::{CloudSources, Collaborators, System};
