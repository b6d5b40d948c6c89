//! Code index: language-aware chunking, contextual enrichment, dense+sparse
//! vectors, concurrent per-file indexing with incremental reindexing, and
//! hybrid RRF retrieval with header-chunk expansion.

pub mod chunker;
pub mod context;
pub mod error;
pub mod expand;
pub mod filter;
pub mod git;
pub mod indexer;
pub mod languages;
pub mod layer;
pub mod point;
pub mod redact;
pub mod reindex;
pub(crate) mod retry;
pub mod retriever;
pub mod sparse;

pub use error::{IndexError, Result};
