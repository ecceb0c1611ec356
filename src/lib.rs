//! The Librarian: a local code-intelligence retrieval engine.
//!
//! A [`retrieval::QueryPipeline`] resolves a [`query::QueryEnvelope`]
//! into a [`response::ResponseEnvelope`] by running the Freshness Gate,
//! the Construction Planner, the Query Cache, a twelve-stage retrieval
//! pipeline with depth escalation, and the Response Assembler, all
//! backed by a [`store::KnowledgeStore`].

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod escalation;
pub mod feedback;
pub mod freshness;
pub mod model;
pub mod observability;
pub mod planner;
pub mod providers;
pub mod query;
pub mod response;
pub mod retrieval;
pub mod stage_tracker;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
pub use model::{
    ContextPack, EdgeType, EntityType, FeedbackTokenBinding, FileRecord, FunctionRecord,
    IngestionItem, KnowledgeEdge, ModuleRecord, Outcome, PackType, QualityTier,
    RetrievalLogRecord, SignalMap, StoreMetadata, StoreStats, VersionDescriptor,
    MAX_PACK_CONFIDENCE, MIN_PACK_CONFIDENCE,
};
pub use providers::{EmbeddingProvider, LlmProvider};
pub use query::{Depth, Filter, IntentType, LlmRequirement, QueryEnvelope};
pub use response::{ResponseAssembler, ResponseEnvelope, SynthesisMode};
pub use retrieval::QueryPipeline;
pub use store::KnowledgeStore;
