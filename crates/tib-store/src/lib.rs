//! Vector and checkpoint persistence for the code index.

pub mod checkpoint;
pub mod error;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
pub use error::StoreError;
pub use in_memory_store::{InMemoryVectorStore, StoreOp};
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    DENSE_VECTOR, FieldCondition, HybridQuery, Prefetch, PrefetchQuery,
    SPARSE_VECTOR, ScoredVectorPoint, SparseVector, VectorFilter, VectorPoint, VectorRecord,
    VectorStore, VectorStoreError,
};
