//! Identifier-aware tokenization and BM25 term-frequency vectors.
//!
//! Token ids are the 32-bit FNV-1a hash of the token's UTF-8 bytes, so the
//! same token maps to the same index at index and query time without a
//! shared vocabulary. The IDF half of BM25 is computed by the vector store.

use std::collections::BTreeMap;

use tib_store::SparseVector;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Common English words that carry no retrieval signal. Domain verbs such as
/// `get` or `process` are deliberately absent.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "so", "such", "than",
    "that", "the", "their", "then", "there", "these", "they", "this", "to", "was", "were",
    "will", "with", "which", "who", "what", "when", "where", "how", "do", "does", "we", "you",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
    Other,
}

fn class_of(c: char) -> CharClass {
    if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_numeric() {
        CharClass::Digit
    } else if c.is_alphabetic() {
        // caseless letters group with lowercase
        CharClass::Lower
    } else {
        CharClass::Other
    }
}

/// Split identifiers on case changes, letter/digit changes and
/// non-alphanumerics, lowercase everything and drop short tokens and stopwords.
///
/// `getUserById` yields `["get", "user", "id"]` and `HTTPServer` yields
/// `["http", "server"]`.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut raw: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        let class = class_of(c);
        if class == CharClass::Other {
            if !current.is_empty() {
                raw.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let prev_class = class_of(prev);
            let next_class = chars.get(i + 1).map(|&n| class_of(n));
            let boundary = match (prev_class, class) {
                (CharClass::Lower, CharClass::Upper)
                | (CharClass::Digit, CharClass::Lower | CharClass::Upper)
                | (CharClass::Lower | CharClass::Upper, CharClass::Digit) => true,
                // end of an acronym: the `S` in `HTTPServer`
                (CharClass::Upper, CharClass::Upper) => next_class == Some(CharClass::Lower),
                _ => false,
            };
            if boundary && !current.is_empty() {
                raw.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        raw.push(current);
    }

    raw.into_iter()
        .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// 32-bit FNV-1a.
#[must_use]
pub fn fnv1a(token: &str) -> u32 {
    token.bytes().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Term-frequency sparse vector with indices in ascending order.
#[must_use]
pub fn text_to_sparse(text: &str) -> SparseVector {
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(fnv1a(&token)).or_default() += 1;
    }
    let (indices, values): (Vec<u32>, Vec<f32>) = counts
        .into_iter()
        .map(|(idx, count)| {
            #[allow(clippy::cast_precision_loss)]
            let value = count as f32;
            (idx, value)
        })
        .unzip();
    SparseVector { indices, values }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn camel_case_identifier() {
        assert_eq!(tokenize("getUserById"), vec!["get", "user", "id"]);
    }

    #[test]
    fn acronym_boundary() {
        assert_eq!(tokenize("HTTPServer"), vec!["http", "server"]);
        assert_eq!(tokenize("parseXMLDocument"), vec!["parse", "xml", "document"]);
    }

    #[test]
    fn snake_case_and_digits() {
        assert_eq!(
            tokenize("process_payment_v2 oauth2Token"),
            vec!["process", "payment", "oauth", "token"]
        );
    }

    #[test]
    fn stopwords_and_short_tokens_dropped() {
        assert_eq!(tokenize("the a x of ledger"), vec!["ledger"]);
    }

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(fnv1a(""), 0x811c_9dc5);
        assert_eq!(fnv1a("a"), 0xe40c_292c);
        assert_eq!(fnv1a("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn repeated_tokens_accumulate() {
        let v = text_to_sparse("payment payment refund");
        assert_eq!(v.indices.len(), 2);
        let payment = fnv1a("payment");
        let pos = v.indices.iter().position(|&i| i == payment).unwrap();
        assert!((v.values[pos] - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_text_gives_empty_vector() {
        assert!(text_to_sparse("  ;; ").is_empty());
    }

    proptest! {
        #[test]
        fn indices_sorted_and_unique(text in "[a-zA-Z0-9_ ]{0,200}") {
            let v = text_to_sparse(&text);
            prop_assert_eq!(v.indices.len(), v.values.len());
            prop_assert!(v.indices.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(v.values.iter().all(|&x| x >= 1.0));
        }

        #[test]
        fn tokens_are_lowercase(text in "[a-zA-Z0-9_. -]{0,100}") {
            for token in tokenize(&text) {
                prop_assert_eq!(token.to_lowercase(), token.clone());
                prop_assert!(token.chars().count() > 1);
            }
        }
    }
}
