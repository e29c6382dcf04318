//! Picking the record that survives a duplicate cluster.

use platdir_core::PlatformRecord;
use serde::Serialize;

use crate::similarity::normalize_name;

/// Caller-supplied override for which cluster member to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WinnerHint {
    /// Keep the member whose `id` or `slug` equals this value.
    PreferredId(String),
    /// Keep the member whose product name matches this one.
    PreferredName(String),
}

/// Supplies a [`WinnerHint`] for a cluster, e.g. from curated rules.
pub trait WinnerHintProvider: Send + Sync {
    fn hint_for(&self, members: &[&PlatformRecord]) -> Option<WinnerHint>;
}

#[derive(Debug, Default)]
pub struct NoHints;

impl WinnerHintProvider for NoHints {
    fn hint_for(&self, _members: &[&PlatformRecord]) -> Option<WinnerHint> {
        None
    }
}

/// Completeness score; the richest record wins a cluster.
pub fn score(record: &PlatformRecord) -> f64 {
    let mut score = 0.0;
    if record.is_featured() {
        score += 1000.0;
    }
    if let Some(rating) = record.rating {
        score += rating * 100.0;
    }
    if let Some(slug) = record.slug.as_deref() {
        if !slug.is_empty() && slug != record.id {
            score += 50.0;
        }
    }
    if let Some(description) = record.description() {
        score += (description.chars().count() as f64 / 10.0).min(50.0);
    }
    if record.category().is_some() {
        score += 10.0;
    }
    if record.has_added_timestamp() {
        score += 10.0;
    }
    if record.has_clicks() {
        score += 5.0;
    }
    score
}

/// Name with marks, parenthesized notes and version suffixes removed.
///
/// `"Runway ML (Gen-3) v2.1"` -> `"runway ml"`.
pub fn normalize_product_name(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in normalize_name(name).chars() {
        match c {
            '™' | '®' | '©' => {}
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut tokens = stripped.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token == "version" && tokens.peek().is_some_and(|next| is_version_number(next)) {
            tokens.next();
            continue;
        }
        if token
            .strip_prefix('v')
            .is_some_and(|rest| !rest.is_empty() && is_version_number(rest))
        {
            continue;
        }
        kept.push(token);
    }

    let joined = kept.join(" ");
    joined
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
        .trim()
        .to_string()
}

fn is_version_number(token: &str) -> bool {
    let mut parts = token.split('.');
    let major_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    major_ok && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Position (into `members`) of the record to keep.
///
/// A hint is honored when it matches a member; otherwise the highest score wins
/// and ties go to the earliest member.
pub fn select_winner(members: &[&PlatformRecord], hint: Option<&WinnerHint>) -> usize {
    if let Some(found) = hint.and_then(|hint| hinted_member(members, hint)) {
        return found;
    }

    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (index, record) in members.iter().enumerate() {
        let current = score(record);
        if current > best_score {
            best = index;
            best_score = current;
        }
    }
    best
}

/// Position of the member a hint points at, if any member matches it.
pub fn hinted_member(members: &[&PlatformRecord], hint: &WinnerHint) -> Option<usize> {
    match hint {
        WinnerHint::PreferredId(id) => members
            .iter()
            .position(|r| r.id == *id || r.slug.as_deref() == Some(id.as_str())),
        WinnerHint::PreferredName(name) => {
            let wanted = normalize_product_name(name);
            if wanted.is_empty() {
                return None;
            }
            let product_name = |r: &PlatformRecord| normalize_product_name(r.name().unwrap_or_default());
            if let Some(exact) = members.iter().position(|r| product_name(*r) == wanted) {
                return Some(exact);
            }
            let first_word = wanted.split(' ').next().unwrap_or_default();
            members
                .iter()
                .position(|r| product_name(*r).contains(first_word))
        }
    }
}
