//! Deterministic point ids and the persisted chunk payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunker::{Chunk, ChunkType};
use crate::error::Result;
use crate::languages::Lang;

/// Content-addressed point id: re-indexing the same span upserts over the
/// previous point instead of adding a new one.
#[must_use]
pub fn point_id(repo: &str, file_path: &str, start_line: usize) -> String {
    let key = format!("{repo}:{file_path}:{start_line}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Payload stored with every point. Keys are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub repo: String,
    pub file_path: String,
    pub language: Lang,
    pub layer: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub symbol_name: Option<String>,
    #[serde(default)]
    pub parent_symbol: Option<String>,
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub annotations: Vec<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default)]
    pub header_chunk_id: Option<String>,
    /// Chunk text after secret redaction.
    pub content: String,
    /// Situating description; empty when contextualization was skipped or failed.
    #[serde(default)]
    pub context: String,
}

impl ChunkPayload {
    #[must_use]
    pub fn new(repo: &str, chunk: &Chunk, content: String, context: String) -> Self {
        Self {
            repo: repo.to_owned(),
            file_path: chunk.file_path.clone(),
            language: chunk.language,
            layer: chunk.layer.to_owned(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            symbol_name: chunk.symbol_name.clone(),
            parent_symbol: chunk.parent_symbol.clone(),
            chunk_type: chunk.chunk_type,
            annotations: chunk.annotations.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            header_chunk_id: chunk.header_chunk_id.clone(),
            content,
            context,
        }
    }

    /// Flatten into the map shape the vector store persists.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_map(&self) -> Result<HashMap<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(crate::IndexError::Other(format!(
                "payload serialized to non-object: {other}"
            ))),
        }
    }

    /// Rebuild from a stored payload map.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or mistyped.
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_file;

    #[test]
    fn point_id_is_deterministic_uuid() {
        let a = point_id("shop", "src/A.java", 12);
        let b = point_id("shop", "src/A.java", 12);
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, point_id("shop", "src/A.java", 13));
        assert_ne!(a, point_id("other", "src/A.java", 12));
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let chunk = chunk_file("class A {}\n", "src/service/A.java").remove(0);
        let payload = ChunkPayload::new("shop", &chunk, chunk.content.clone(), String::new());
        let map = payload.to_map().unwrap();
        for key in [
            "repo",
            "filePath",
            "language",
            "layer",
            "startLine",
            "endLine",
            "symbolName",
            "parentSymbol",
            "chunkType",
            "annotations",
            "chunkIndex",
            "totalChunks",
            "headerChunkId",
            "content",
            "context",
        ] {
            assert!(map.contains_key(key), "missing {key}");
        }
        assert_eq!(map["language"], "java");
        assert_eq!(map["chunkType"], "file");
        assert_eq!(map["layer"], "service");
        assert_eq!(ChunkPayload::from_map(&map).unwrap(), payload);
    }

    #[test]
    fn from_map_rejects_missing_fields() {
        let mut map = HashMap::new();
        map.insert("repo".to_owned(), serde_json::json!("shop"));
        assert!(ChunkPayload::from_map(&map).is_err());
    }
}
