//! Literal keyword matching over evidence text.

use std::collections::BTreeSet;

use leaven_common::{EvidenceResult, EvidenceSource};

/// One hit: the canonical vocabulary entry and the surface form that matched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeywordMatch {
    pub keyword: String,
    pub token: String,
}

#[derive(Debug, Clone)]
struct Entry {
    keyword: String,
    variants: Vec<String>,
}

/// Case-insensitive, whitespace-collapsed substring matcher. Multi-word
/// keywords also match their hyphenated form ("naturally-leavened").
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    entries: Vec<Entry>,
}

impl KeywordMatcher {
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<Entry> = Vec::new();
        for word in vocabulary {
            let keyword = collapse(word.as_ref());
            if keyword.is_empty() || entries.iter().any(|e| e.keyword == keyword) {
                continue;
            }
            let mut variants = vec![keyword.clone()];
            if keyword.contains(' ') {
                variants.push(keyword.replace(' ', "-"));
            }
            entries.push(Entry { keyword, variants });
        }
        Self { entries }
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.keyword.as_str())
    }

    /// Every (keyword, token) pair present in `text`.
    pub fn find(&self, text: &str) -> Vec<KeywordMatch> {
        let haystack = collapse(text);
        if haystack.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .variants
                    .iter()
                    .filter(|variant| haystack.contains(variant.as_str()))
                    .map(|variant| KeywordMatch {
                        keyword: entry.keyword.clone(),
                        token: variant.clone(),
                    })
            })
            .collect()
    }

    /// Canonical keywords found in `text`.
    pub fn keywords(&self, text: &str) -> BTreeSet<String> {
        self.find(text).into_iter().map(|m| m.keyword).collect()
    }

    /// Scan fetched text from `source` into an evidence result.
    pub fn evidence(&self, source: EvidenceSource, text: &str) -> EvidenceResult {
        let (keywords, tokens) = self
            .find(text)
            .into_iter()
            .map(|m| (m.keyword, m.token))
            .unzip();
        EvidenceResult::fetched(source, keywords, tokens)
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
