use super::{ChunkType, MAX_CHUNK_CHARS, Span, ast};
use crate::languages::Lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Template,
    Script,
    Style,
}

/// Byte range of a top-level SFC block, open tag start to close tag end.
#[derive(Debug, Clone, Copy)]
struct Block {
    kind: BlockKind,
    open: usize,
    /// Byte just past the `>` of the opening tag.
    inner_start: usize,
    /// Byte where the closing tag begins.
    inner_end: usize,
    close_end: usize,
}

const OPEN_TAGS: [(BlockKind, &str); 3] = [
    (BlockKind::Template, "<template"),
    (BlockKind::Script, "<script"),
    (BlockKind::Style, "<style"),
];

fn is_tag_at(content: &str, at: usize, tag: &str) -> bool {
    content[at..].starts_with(tag)
        && content[at + tag.len()..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
}

/// `<template>` blocks nest; track depth to find the matching close.
fn find_template(content: &str, open: usize) -> Option<Block> {
    let inner_start = open + content[open..].find('>')? + 1;

    let mut depth = 1usize;
    let mut i = inner_start;
    while i < content.len() {
        if !content.is_char_boundary(i) {
            i += 1;
            continue;
        }
        if is_tag_at(content, i, "<template") {
            depth += 1;
        } else if content[i..].starts_with("</template>") {
            depth -= 1;
            if depth == 0 {
                return Some(Block {
                    kind: BlockKind::Template,
                    open,
                    inner_start,
                    inner_end: i,
                    close_end: i + "</template>".len(),
                });
            }
        }
        i += 1;
    }
    None
}

/// Script and style bodies are raw text: the first closing tag ends them.
fn find_raw(content: &str, open: usize, kind: BlockKind, close: &str) -> Option<Block> {
    let inner_start = open + content[open..].find('>')? + 1;
    let inner_end = inner_start + content[inner_start..].find(close)?;
    Some(Block {
        kind,
        open,
        inner_start,
        inner_end,
        close_end: inner_end + close.len(),
    })
}

/// Every top-level block in document order. Scanning resumes after each
/// block's closing tag, so tags inside a body are never mistaken for blocks.
/// An unterminated block ends the scan.
fn top_level_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < content.len() {
        if !content.is_char_boundary(i) {
            i += 1;
            continue;
        }
        let Some(kind) = OPEN_TAGS
            .iter()
            .find(|(_, tag)| is_tag_at(content, i, tag))
            .map(|(kind, _)| *kind)
        else {
            i += 1;
            continue;
        };
        let block = match kind {
            BlockKind::Template => find_template(content, i),
            BlockKind::Script => find_raw(content, i, kind, "</script>"),
            BlockKind::Style => find_raw(content, i, kind, "</style>"),
        };
        let Some(block) = block else {
            break;
        };
        i = block.close_end;
        blocks.push(block);
    }
    blocks
}

fn row_of(content: &str, byte: usize) -> usize {
    content[..byte.min(content.len())].matches('\n').count()
}

/// Split a single-file component into its template and script chunks.
/// Style blocks are dropped and every `<script>` block, `setup` included,
/// is chunked on its own.
pub(crate) fn split(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    for block in top_level_blocks(content) {
        let open_row = row_of(content, block.open);
        let close_row = row_of(content, block.close_end.saturating_sub(1));
        match block.kind {
            BlockKind::Template => {
                spans.push(Span::new(open_row, close_row, ChunkType::Template));
            }
            BlockKind::Script => spans.extend(script_spans(content, &block, open_row, close_row)),
            BlockKind::Style => {}
        }
    }
    spans
}

/// Large script bodies are chunked as TypeScript; the spans are shifted to
/// document rows and stretched over the block's own tags, never past them.
fn script_spans(content: &str, block: &Block, open_row: usize, close_row: usize) -> Vec<Span> {
    let whole = || vec![Span::new(open_row, close_row, ChunkType::Script)];

    let inner = &content[block.inner_start..block.inner_end];
    let (inner, skipped) = match inner.strip_prefix('\n') {
        Some(rest) => (rest, 1),
        None => (inner, 0),
    };
    if inner.chars().count() <= MAX_CHUNK_CHARS {
        return whole();
    }
    let Some(mut parts) = ast::split(inner, Lang::TypeScript).filter(|p| !p.is_empty()) else {
        return whole();
    };

    let inner_row = row_of(content, block.inner_start) + skipped;
    for part in &mut parts {
        part.start += inner_row;
        part.end = (part.end + inner_row).min(close_row);
    }
    if let Some(first) = parts.first_mut() {
        first.start = open_row;
    }
    if let Some(last) = parts.last_mut() {
        last.end = close_row;
    }
    parts
}
