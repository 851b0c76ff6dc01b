//! Domain ports (interfaces) for the incident response pipeline's external
//! collaborators.

pub mod cloud_source;

pub use cloud_source::{
    CloudDataSource, CollectionContext, ExecutionContext, ExecutionHandle, KnowledgeBase,
    KnowledgeHit, KnowledgeSearchResult, RcaAnalyzer, SearchStrategy, SopBridge, SopExecutor,
    SourceFetchError, SourcePayload,
};
