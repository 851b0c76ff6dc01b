//! Domain layer: data types and port interfaces for the incident response
//! pipeline. Nothing in this module talks to the network, filesystem, or
//! clock directly — those concerns live in `infrastructure`.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{CollectionError, DetectError, IngestError, OrchestratorError, SafetyError};
