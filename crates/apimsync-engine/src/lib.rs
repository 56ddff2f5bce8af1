//! # apimsync engines
//!
//! The effectful half of apimsync: talking to the management service,
//! reading trees (live or from a git commit), and the two traversals.
//!
//! - [`client`] - management REST client with 404/pagination/completion semantics
//! - [`memo`] - per-key once-futures for work deduplication
//! - [`sku`] - pricing-tier support oracle
//! - [`source`] - file sources over the working tree and git commits
//! - [`parse`] - file-path to resource-key parsing and artefact readers
//! - [`relationships`] - publisher dependency multimaps with validation
//! - [`extract`] - the extractor orchestrator
//! - [`publish`] - the publisher orchestrator
//! - [`api_ops`] - revision, specification, and companion-resource handling
//! - [`error`] - engine error taxonomy

pub mod api_ops;
pub mod client;
pub mod error;
pub mod extract;
pub mod memo;
pub mod parse;
pub mod publish;
pub mod relationships;
pub mod sku;
pub mod source;

pub use client::ApimClient;
pub use error::{EngineError, EngineResult};
pub use extract::{Extractor, ExtractorOptions};
pub use publish::{Publisher, PublisherOptions};
