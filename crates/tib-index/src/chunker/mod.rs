//! Language-aware chunking.
//!
//! Small files become a single `file` chunk. Larger files are split by a
//! per-language strategy: tree-sitter boundary classification for source code,
//! statement boundaries for SQL, balanced sections for Vue single-file
//! components and heading sections for Markdown. Every strategy produces line
//! spans that are normalized into a gap-free partition of the file, except
//! Vue, whose style sections and inter-block whitespace are left out.

mod ast;
mod markdown;
mod sql;
mod vue;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::languages::{Lang, detect_language};
use crate::layer::infer_layer;

/// Files at or below this many characters are indexed as one chunk.
pub const MAX_CHUNK_CHARS: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Header,
    Method,
    Constructor,
    Class,
    Interface,
    Enum,
    Record,
    Function,
    Type,
    Const,
    Export,
    Template,
    Script,
    Statement,
    File,
    Other,
}

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Record => "record",
            Self::Function => "function",
            Self::Type => "type",
            Self::Const => "const",
            Self::Export => "export",
            Self::Template => "template",
            Self::Script => "script",
            Self::Statement => "statement",
            Self::File => "file",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous span of a source file judged to be one semantic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// Repository-relative path.
    pub file_path: String,
    pub language: Lang,
    pub layer: &'static str,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub symbol_name: Option<String>,
    pub parent_symbol: Option<String>,
    pub chunk_type: ChunkType,
    pub annotations: Vec<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Point id of the file's header chunk; `None` on the header itself.
    pub header_chunk_id: Option<String>,
}

impl Chunk {
    #[must_use]
    pub fn is_header(&self) -> bool {
        self.chunk_type == ChunkType::Header
    }

    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Zero-based, inclusive row range with chunk metadata, before text is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
    pub parent_symbol: Option<String>,
    pub annotations: Vec<String>,
}

impl Span {
    pub(crate) fn new(start: usize, end: usize, chunk_type: ChunkType) -> Self {
        Self {
            start,
            end: end.max(start),
            chunk_type,
            symbol_name: None,
            parent_symbol: None,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn named(mut self, symbol: Option<String>) -> Self {
        self.symbol_name = symbol;
        self
    }
}

/// Sort spans, clamp overlaps so starts are strictly increasing, and close
/// gaps by extending each span up to the next one. The first span starts at
/// row 0 and the last one ends at `last_row`.
pub(crate) fn normalize(mut spans: Vec<Span>, last_row: usize) -> Vec<Span> {
    spans.sort_by_key(|s| s.start);
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for mut span in spans {
        if span.start > last_row {
            continue;
        }
        span.end = span.end.min(last_row);
        if let Some(prev) = out.last_mut() {
            if span.start <= prev.start {
                prev.end = prev.end.max(span.end);
                continue;
            }
            prev.end = span.start - 1;
        }
        out.push(span);
    }
    if let Some(first) = out.first_mut() {
        first.start = 0;
    }
    if let Some(last) = out.last_mut() {
        last.end = last_row;
    }
    out
}

/// Split a file into ordered chunks.
///
/// Returns an empty list for unsupported extensions and blank files.
#[must_use]
pub fn chunk_file(content: &str, file_path: &str) -> Vec<Chunk> {
    let Some(lang) = detect_language(Path::new(file_path)) else {
        return Vec::new();
    };
    if content.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    let last_row = lines.len().saturating_sub(1);
    let whole_file = || vec![Span::new(0, last_row, ChunkType::File)];

    let spans = if content.chars().count() <= MAX_CHUNK_CHARS {
        whole_file()
    } else {
        let split = match lang {
            Lang::Sql => sql::split(&lines),
            Lang::Markdown => markdown::split(&lines),
            Lang::Vue => vue::split(content),
            _ => ast::split(content, lang).unwrap_or_default(),
        };
        if split.is_empty() { whole_file() } else { split }
    };

    assemble(spans, &lines, file_path, lang)
}

fn assemble(spans: Vec<Span>, lines: &[&str], file_path: &str, lang: Lang) -> Vec<Chunk> {
    let layer = infer_layer(file_path);
    let mut chunks: Vec<Chunk> = spans
        .into_iter()
        .filter_map(|span| {
            let end = span.end.min(lines.len().saturating_sub(1));
            let content = lines.get(span.start..=end)?.join("\n");
            if content.trim().is_empty() {
                return None;
            }
            Some(Chunk {
                content,
                file_path: file_path.to_owned(),
                language: lang,
                layer,
                start_line: span.start + 1,
                end_line: end + 1,
                symbol_name: span.symbol_name,
                parent_symbol: span.parent_symbol,
                chunk_type: span.chunk_type,
                annotations: span.annotations,
                chunk_index: 0,
                total_chunks: 0,
                header_chunk_id: None,
            })
        })
        .collect();

    let total = chunks.len();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
        chunk.total_chunks = total;
    }
    chunks
}

/// Greedily merge adjacent spans while the merged text stays within
/// [`MAX_CHUNK_CHARS`]. The first span's metadata is kept.
pub(crate) fn merge_greedy(spans: Vec<Span>, lines: &[&str]) -> Vec<Span> {
    let span_chars = |s: &Span| -> usize {
        lines
            .get(s.start..=s.end.min(lines.len().saturating_sub(1)))
            .map_or(0, |ls| ls.iter().map(|l| l.chars().count() + 1).sum())
    };

    let mut out: Vec<Span> = Vec::new();
    let mut current_chars = 0usize;
    for span in spans {
        let chars = span_chars(&span);
        if let Some(prev) = out.last_mut()
            && current_chars + chars <= MAX_CHUNK_CHARS
        {
            prev.end = span.end;
            current_chars += chars;
            continue;
        }
        current_chars = chars;
        out.push(span);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big_text(prefix: &str, n: usize) -> String {
        (0..n).map(|i| format!("{prefix} line {i}\n")).collect()
    }

    #[test]
    fn unsupported_extension_yields_nothing() {
        assert!(chunk_file("anything", "notes.txt").is_empty());
    }

    #[test]
    fn blank_file_yields_nothing() {
        assert!(chunk_file("   \n\n", "src/App.java").is_empty());
    }

    #[test]
    fn small_file_is_single_file_chunk() {
        let src = "public class A {\n  void f() {}\n}\n";
        let chunks = chunk_file(src, "src/A.java");
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.chunk_type, ChunkType::File);
        assert_eq!(c.start_line, 1);
        assert_eq!(c.end_line, 3);
        assert_eq!(c.chunk_index, 0);
        assert_eq!(c.total_chunks, 1);
        assert_eq!(c.language, Lang::Java);
    }

    #[test]
    fn small_file_shortcut_holds_at_threshold() {
        let src = "x".repeat(MAX_CHUNK_CHARS);
        let chunks = chunk_file(&src, "db/init.sql");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::File);
    }

    #[test]
    fn layer_is_stamped_from_path() {
        let chunks = chunk_file("class A {}", "src/service/A.java");
        assert_eq!(chunks[0].layer, "service");
    }

    #[test]
    fn normalize_fills_gaps_and_clamps() {
        let spans = vec![
            Span::new(5, 7, ChunkType::Method),
            Span::new(2, 3, ChunkType::Header),
            Span::new(6, 9, ChunkType::Method),
        ];
        let out = normalize(spans, 12);
        let ranges: Vec<_> = out.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (5, 5), (6, 12)]);
    }

    #[test]
    fn normalize_merges_equal_starts() {
        let spans = vec![
            Span::new(0, 2, ChunkType::Header),
            Span::new(0, 4, ChunkType::Method),
        ];
        let out = normalize(spans, 4);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 4));
    }

    #[test]
    fn merge_greedy_respects_limit() {
        let text = big_text("x", 400);
        let lines: Vec<&str> = text.lines().collect();
        let spans: Vec<Span> = (0..40)
            .map(|i| Span::new(i * 10, i * 10 + 9, ChunkType::Statement))
            .collect();
        let merged = merge_greedy(spans, &lines);
        assert!(merged.len() > 1);
        for s in &merged {
            let chars: usize = lines[s.start..=s.end].iter().map(|l| l.len() + 1).sum();
            assert!(chars <= MAX_CHUNK_CHARS);
        }
        assert_eq!(merged.first().unwrap().start, 0);
        assert_eq!(merged.last().unwrap().end, 399);
    }

    #[test]
    fn chunk_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChunkType::Constructor).unwrap();
        assert_eq!(json, "\"constructor\"");
        assert_eq!(ChunkType::Header.to_string(), "header");
    }
}
