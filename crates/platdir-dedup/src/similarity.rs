//! Pairwise identity: fuzzy name similarity plus domain equality.

use std::collections::BTreeSet;

use platdir_core::{domain_of, PlatformRecord};
use serde::Serialize;
use strsim::levenshtein;

/// Name similarity at or above this marks two records as the same platform.
pub const DEFAULT_NAME_THRESHOLD: f64 = 0.75;

const STOP_WORDS: &[&str] = &[
    "ai", "the", "platform", "tool", "app", "software", "api", "by", "for",
];

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub name_threshold: f64,
    /// Hosts on which unrelated products share a domain (code hosts, paper archives).
    pub shared_hosts: BTreeSet<String>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            name_threshold: DEFAULT_NAME_THRESHOLD,
            shared_hosts: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum MatchReason {
    Name { similarity: f64 },
    Domain { domain: String },
}

pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn strip_stop_words(normalized: &str) -> String {
    normalized
        .split(' ')
        .filter(|word| !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two platform names in `[0, 1]`.
///
/// Exact match scores 1.0, containment 0.9; the same two checks after dropping
/// generic words ("ai", "platform", ...) score 0.85 and 0.8; everything else
/// falls back to normalized Levenshtein distance.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let clean_a = strip_stop_words(&a);
    let clean_b = strip_stop_words(&b);
    // A name made only of stop words must not match everything by containing "".
    if !clean_a.is_empty() && !clean_b.is_empty() {
        if clean_a == clean_b {
            return 0.85;
        }
        if clean_a.contains(&clean_b) || clean_b.contains(&clean_a) {
            return 0.8;
        }
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - (levenshtein(&a, &b) as f64 / max_len as f64)
}

pub struct SimilarityEngine {
    config: SimilarityConfig,
}

impl SimilarityEngine {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Domain used for identity, or `None` for missing, unparseable, or shared hosts.
    pub fn identity_domain(&self, record: &PlatformRecord) -> Option<String> {
        record
            .identity_url()
            .and_then(domain_of)
            .filter(|domain| !self.config.shared_hosts.contains(domain))
    }

    /// Why `a` and `b` denote the same platform, if they do. Name wins over domain.
    pub fn match_reason(&self, a: &PlatformRecord, b: &PlatformRecord) -> Option<MatchReason> {
        let (Some(name_a), Some(name_b)) = (a.name(), b.name()) else {
            return None;
        };
        let similarity = name_similarity(name_a, name_b);
        if similarity >= self.config.name_threshold {
            return Some(MatchReason::Name { similarity });
        }
        match (self.identity_domain(a), self.identity_domain(b)) {
            (Some(da), Some(db)) if da == db => Some(MatchReason::Domain { domain: da }),
            _ => None,
        }
    }

    pub fn is_duplicate(&self, a: &PlatformRecord, b: &PlatformRecord) -> bool {
        self.match_reason(a, b).is_some()
    }
}
