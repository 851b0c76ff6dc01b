//! In-memory implementations of every external collaborator port, so the
//! crate is a runnable, testable whole without real cloud credentials or
//! LLM access. Mirrors the teacher's `adapters/substrates/mock.rs` shape:
//! configurable canned responses plus per-key overrides behind a `RwLock`.

pub mod cloud_sources;
pub mod knowledge_base;
pub mod rca;
pub mod sop;

pub use cloud_sources::MockCloudSource;
pub use knowledge_base::MockKnowledgeBase;
pub use rca::MockRcaAnalyzer;
pub use sop::{MockSopBridge, MockSopExecutor};
