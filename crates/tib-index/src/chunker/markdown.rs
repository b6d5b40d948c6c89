use std::sync::LazyLock;

use regex::Regex;

use super::{ChunkType, Span, merge_greedy};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"));

/// Split Markdown at ATX headings outside fenced code blocks. Text before the
/// first heading joins the first section.
pub(crate) fn split(lines: &[&str]) -> Vec<Span> {
    let mut in_fence = false;
    let mut headings: Vec<(usize, String)> = Vec::new();
    for (row, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            headings.push((row, caps[2].to_owned()));
        }
    }
    if headings.is_empty() {
        return Vec::new();
    }

    let last_row = lines.len().saturating_sub(1);
    let spans: Vec<Span> = headings
        .iter()
        .enumerate()
        .map(|(i, (row, title))| {
            let start = if i == 0 { 0 } else { *row };
            let end = headings.get(i + 1).map_or(last_row, |(next, _)| next - 1);
            Span::new(start, end, ChunkType::Other).named(Some(title.clone()))
        })
        .collect();

    merge_greedy(spans, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_inside_fences_are_ignored() {
        let doc = "intro\n# Setup\ntext\n```sh\n# not a heading\n```\n## Usage\nmore\n";
        let lines: Vec<&str> = doc.lines().collect();
        let spans = split(&lines);
        // both sections fit together, so they merge into one
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].symbol_name.as_deref(), Some("Setup"));
        assert_eq!((spans[0].start, spans[0].end), (0, lines.len() - 1));
    }

    #[test]
    fn large_sections_stay_apart() {
        let body = "lorem ipsum dolor sit amet ".repeat(80);
        let doc = format!("# One\n{body}\n# Two\n{body}\n# Three\n{body}\n");
        let lines: Vec<&str> = doc.lines().collect();
        let spans = split(&lines);
        let names: Vec<_> = spans.iter().filter_map(|s| s.symbol_name.as_deref()).collect();
        assert_eq!(names, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn no_headings_yields_nothing() {
        let lines = vec!["just", "text"];
        assert!(split(&lines).is_empty());
    }
}
