use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Name of the cosine dense vector space in hybrid collections.
pub const DENSE_VECTOR: &str = "dense";
/// Name of the IDF-weighted sparse vector space in hybrid collections.
pub const SPARSE_VECTOR: &str = "sparse";

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("retrieve error: {0}")]
    Retrieve(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Term-frequency vector over a hashed vocabulary. `indices` are strictly ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product of two sparse vectors with sorted indices.
    #[must_use]
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
}

impl VectorFilter {
    /// Filter requiring `field` to equal the text `value`.
    #[must_use]
    pub fn text(field: &str, value: &str) -> Self {
        Self::default().and_text(field, value)
    }

    #[must_use]
    pub fn and_text(mut self, field: &str, value: &str) -> Self {
        self.must.push(FieldCondition {
            field: field.to_owned(),
            value: value.to_owned(),
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }
}

#[derive(Debug, Clone)]
/// Exact keyword match on a payload field.
pub struct FieldCondition {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// A point fetched by id.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub enum PrefetchQuery {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// One candidate list fed into reciprocal rank fusion.
#[derive(Debug, Clone)]
pub struct Prefetch {
    pub query: PrefetchQuery,
    pub limit: u64,
    pub filter: Option<VectorFilter>,
}

/// Several prefetch lists fused with RRF and capped at `limit`.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub prefetch: Vec<Prefetch>,
    pub limit: u64,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    /// Create the collection with a `dense` cosine space of `dense_size` and,
    /// when `sparse` is set, an IDF-weighted `sparse` space. Existing collections are kept.
    fn ensure_collection(
        &self,
        collection: &str,
        dense_size: u64,
        sparse: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn ensure_keyword_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
        wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
        wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn retrieve(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<VectorRecord>, VectorStoreError>>;

    fn hybrid_query(
        &self,
        collection: &str,
        query: HybridQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_dot_matches_shared_indices() {
        let a = SparseVector {
            indices: vec![1, 3, 7],
            values: vec![1.0, 2.0, 3.0],
        };
        let b = SparseVector {
            indices: vec![3, 7, 9],
            values: vec![4.0, 1.0, 5.0],
        };
        assert!((a.dot(&b) - 11.0).abs() < f32::EPSILON);
        assert!(SparseVector::default().dot(&a).abs() < f32::EPSILON);
    }

    #[test]
    fn filter_builder_accumulates_conditions() {
        let f = VectorFilter::text("repo", "a").and_text("filePath", "src/X.java");
        assert_eq!(f.must.len(), 2);
        assert!(!f.is_empty());
        assert!(VectorFilter::default().is_empty());
    }
}
