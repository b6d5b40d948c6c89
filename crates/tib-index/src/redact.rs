use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live_",
    "sk_test_",
    "AKIA",
    "ghp_",
    "gho_",
    "xoxb-",
    "xoxp-",
    "AIza",
    "ya29\\.",
    "glpat-",
    "hf_",
    "npm_",
    "dckr_pat_",
];

// A secret prefix at a word start followed by at least four token characters.
static SECRET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = SECRET_PREFIXES.join("|");
    let full = format!("\\b(?:{pattern})[^\\s\"'`,;{{}}\\[\\]()]{{4,}}");
    Regex::new(&full).expect("secret redaction regex is valid")
});

static PEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?(?:-----END [A-Z ]*PRIVATE KEY-----|\z)")
        .expect("pem redaction regex is valid")
});

// `password = "hunter22"` style assignments; keeps the key and quotes.
static ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|secret|api[_-]?key|access[_-]?token|auth[_-]?token|token|client[_-]?secret)\b(\s*[:=]\s*)(["'])([^"'\s]{4,})(["'])"#,
    )
    .expect("assignment redaction regex is valid")
});

/// Replace credential-shaped substrings with `[REDACTED]`.
///
/// Applied to every text sent to the embedding or language-model provider.
/// Returns `Cow::Borrowed` when nothing matched, so clean code passes through
/// byte-identical.
#[must_use]
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(text);
    for (re, replacement) in [
        (&*PEM_REGEX, "[REDACTED]"),
        (&*SECRET_REGEX, "[REDACTED]"),
        (&*ASSIGNMENT_REGEX, "$1$2$3[REDACTED]$5"),
    ] {
        let replaced = match re.replace_all(&out, replacement) {
            Cow::Borrowed(_) => None,
            Cow::Owned(s) => Some(s),
        };
        if let Some(s) = replaced {
            out = Cow::Owned(s);
        }
    }
    out
}
