//! Source file discovery: `.tibignore` rules plus the always-on block list.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::languages::detect_language;

pub const IGNORE_FILE: &str = ".tibignore";

/// Filename globs that commonly hold credentials. Matched case-insensitively.
const BLOCKED_FILE_GLOBS: &[&str] = &[
    "*.config.*",
    "*.env*",
    "docker-compose*.y*ml",
    "Dockerfile*",
    "secret*.*",
    "credential*.*",
];

/// Any path containing one of these directory segments is never read.
const BLOCKED_SEGMENTS: &[&str] = &[
    "resources",
    "config",
    ".github",
    ".gitlab",
    "terraform",
    "k8s",
    "kubernetes",
    "helm",
    "secrets",
    ".aws",
    ".ssh",
    "certs",
];

static BLOCKED_FILES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BLOCKED_FILE_GLOBS
        .iter()
        .filter_map(|g| glob_to_regex(g, true))
        .collect()
});

/// Translate a glob into an anchored regex: `*` matches any run of
/// characters, `?` a single one, a trailing `/` everything below a directory.
fn glob_to_regex(glob: &str, case_insensitive: bool) -> Option<Regex> {
    let (body, dir) = match glob.strip_suffix('/') {
        Some(b) => (b, true),
        None => (glob, false),
    };
    let mut pattern = String::from("^");
    for c in body.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    if dir {
        pattern.push_str("/.*");
    }
    pattern.push('$');
    RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .build()
        .ok()
}

/// Per-repository ignore patterns loaded from `.tibignore`.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    /// Parse ignore file text. Blank lines and `#` comments are skipped;
    /// patterns that fail to compile are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let patterns = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| {
                let compiled = glob_to_regex(l, false);
                if compiled.is_none() {
                    tracing::debug!(pattern = l, "ignoring malformed ignore pattern");
                }
                compiled
            })
            .collect();
        Self { patterns }
    }

    /// Load `<root>/.tibignore`; a missing or unreadable file means no rules.
    #[must_use]
    pub fn load(root: &Path) -> Self {
        std::fs::read_to_string(root.join(IGNORE_FILE))
            .map(|text| Self::parse(&text))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(rel_path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Whether a repository-relative path falls under the secret-risk block list.
#[must_use]
pub fn is_blocked(rel_path: &str) -> bool {
    let normalized = rel_path.replace('\\', "/");
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return false;
    };
    if BLOCKED_FILES.iter().any(|re| re.is_match(file_name)) {
        return true;
    }
    segments
        .iter()
        .any(|seg| BLOCKED_SEGMENTS.iter().any(|b| seg.eq_ignore_ascii_case(b)))
}

/// Supported language, not blocked, not ignored.
#[must_use]
pub fn is_eligible(rel_path: &str, rules: &IgnoreRules) -> bool {
    detect_language(Path::new(rel_path)).is_some()
        && !is_blocked(rel_path)
        && !rules.is_ignored(rel_path)
}

/// Walk `root` honouring `.gitignore` and hidden-file rules and return the
/// sorted repository-relative paths of every eligible source file.
#[must_use]
pub fn discover_files(root: &Path, rules: &IgnoreRules) -> Vec<String> {
    let mut files: Vec<String> = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?;
            Some(rel.to_string_lossy().replace('\\', "/"))
        })
        .filter(|rel| is_eligible(rel, rules))
        .collect();
    files.sort();
    files
}
