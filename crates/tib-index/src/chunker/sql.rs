use std::sync::LazyLock;

use regex::Regex;

use super::{ChunkType, Span, merge_greedy};

static STATEMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(CREATE|ALTER|DROP|INSERT|UPDATE|DELETE|GRANT|REVOKE|BEGIN|COMMIT)\b")
        .expect("valid regex")
});

static CREATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:UNIQUE\s+|TEMP\s+|TEMPORARY\s+)?(?:TABLE|VIEW|MATERIALIZED\s+VIEW|INDEX|FUNCTION|PROCEDURE|TRIGGER|SEQUENCE|TYPE|SCHEMA)\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w."`\[\]]+)"#,
    )
    .expect("valid regex")
});

/// Split SQL by statement keywords at line starts, then merge small
/// neighbours greedily. Returns nothing when no statement is recognized.
pub(crate) fn split(lines: &[&str]) -> Vec<Span> {
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| STATEMENT_START.is_match(l))
        .map(|(i, _)| i)
        .collect();
    if starts.is_empty() {
        return Vec::new();
    }

    let last_row = lines.len().saturating_sub(1);
    let spans: Vec<Span> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let start = if i == 0 { 0 } else { start };
            let end = starts.get(i + 1).map_or(last_row, |next| next - 1);
            let name = lines[start..=end]
                .iter()
                .find_map(|l| CREATE_NAME.captures(l))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_matches(|ch| matches!(ch, '"' | '`' | '[' | ']')).to_owned());
            Span::new(start, end, ChunkType::Statement).named(name)
        })
        .collect();

    merge_greedy(spans, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(tables: usize) -> String {
        let mut sql = String::from("-- schema\n");
        for i in 0..tables {
            sql.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS payments_{i} (\n    id BIGINT PRIMARY KEY,\n    account_id BIGINT NOT NULL REFERENCES accounts(id),\n    amount_cents BIGINT NOT NULL,\n    status VARCHAR(32) NOT NULL DEFAULT 'pending',\n    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n);\n\nCREATE INDEX idx_payments_{i}_account ON payments_{i} (account_id);\n\n"
            ));
        }
        sql
    }

    #[test]
    fn splits_and_merges_statements() {
        let sql = migration(30);
        let lines: Vec<&str> = sql.lines().collect();
        let spans = split(&lines);
        assert!(spans.len() > 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].symbol_name.as_deref(), Some("payments_0"));
        assert_eq!(spans.last().unwrap().end, lines.len() - 1);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        assert!(spans.iter().all(|s| s.chunk_type == ChunkType::Statement));
    }

    #[test]
    fn no_statements_yields_nothing() {
        let lines = vec!["-- only comments", "-- here"];
        assert!(split(&lines).is_empty());
    }

    #[test]
    fn create_name_handles_variants() {
        let caps = CREATE_NAME
            .captures("create or replace view \"reporting\".\"daily\" as")
            .unwrap();
        assert_eq!(&caps[1], "\"reporting\".\"daily\"");
        assert!(CREATE_NAME.captures("CREATE UNIQUE INDEX ux_email ON users (email);").is_some());
    }
}
