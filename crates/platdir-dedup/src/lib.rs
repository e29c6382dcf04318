//! Duplicate detection and record reconciliation.
//!
//! Similarity and domain identity live in [`similarity`], grouping in
//! [`cluster`], and the keep-the-best policy in [`merge`]. [`DedupEngine`]
//! turns a record slice into a [`DedupPlan`] of positions to drop.

pub mod cluster;
pub mod merge;
pub mod rules;
pub mod similarity;

use std::collections::{BTreeMap, BTreeSet};

use platdir_core::{domain_of, PlatformRecord};
use serde::Serialize;
use tracing::{debug, info};

pub use cluster::{cluster_records, Cluster, ClusterStrategy};
pub use merge::{
    hinted_member, normalize_product_name, score, select_winner, NoHints, WinnerHint,
    WinnerHintProvider,
};
pub use rules::{check_threshold, DedupRules};
pub use similarity::{
    name_similarity, normalize_name, MatchReason, SimilarityConfig, SimilarityEngine,
    DEFAULT_NAME_THRESHOLD,
};

pub const CRATE_NAME: &str = "platdir-dedup";

/// Why a cluster's winner was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum WinReason {
    Hint { hint: WinnerHint },
    Score { score: f64 },
    IdCompleteness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCluster {
    pub winner: usize,
    pub removed: Vec<usize>,
    pub reason: WinReason,
}

/// Positions to drop from a record array, with the clusters that produced them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupPlan {
    pub clusters: Vec<ResolvedCluster>,
    pub removed: BTreeSet<usize>,
}

impl DedupPlan {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Drops removed positions, keeping the survivors in their original order.
    pub fn apply(&self, records: Vec<PlatformRecord>) -> Vec<PlatformRecord> {
        records
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !self.removed.contains(index))
            .map(|(_, record)| record)
            .collect()
    }
}

pub struct DedupEngine {
    similarity: SimilarityEngine,
    strategy: ClusterStrategy,
    hints: Box<dyn WinnerHintProvider>,
}

impl DedupEngine {
    pub fn new(config: SimilarityConfig, strategy: ClusterStrategy) -> Self {
        Self {
            similarity: SimilarityEngine::new(config),
            strategy,
            hints: Box::<NoHints>::default(),
        }
    }

    /// Engine configured from curated rules, which also supply winner hints.
    pub fn from_rules(rules: DedupRules, strategy: ClusterStrategy) -> Self {
        Self::new(rules.similarity_config(), strategy).with_hints(Box::new(rules))
    }

    pub fn with_hints(mut self, hints: Box<dyn WinnerHintProvider>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        let mut config = self.similarity.config().clone();
        config.name_threshold = threshold;
        self.similarity = SimilarityEngine::new(config);
        self
    }

    pub fn similarity(&self) -> &SimilarityEngine {
        &self.similarity
    }

    pub fn strategy(&self) -> ClusterStrategy {
        self.strategy
    }

    pub fn clusters(&self, records: &[PlatformRecord]) -> Vec<Cluster> {
        cluster_records(&self.similarity, records, self.strategy)
    }

    pub fn plan(&self, records: &[PlatformRecord]) -> DedupPlan {
        let mut plan = DedupPlan::default();
        for cluster in self.clusters(records) {
            let resolved = self.resolve(records, &cluster);
            info!(
                keep = %records[resolved.winner].name().unwrap_or_default(),
                keep_id = %records[resolved.winner].id,
                removed = resolved.removed.len(),
                reason = ?resolved.reason,
                "resolved duplicate cluster"
            );
            for &index in &resolved.removed {
                debug!(index, id = %records[index].id, name = ?records[index].name(), "dropping duplicate");
            }
            plan.removed.extend(resolved.removed.iter().copied());
            plan.clusters.push(resolved);
        }
        plan
    }

    fn resolve(&self, records: &[PlatformRecord], cluster: &Cluster) -> ResolvedCluster {
        let members: Vec<&PlatformRecord> = cluster.members.iter().map(|&i| &records[i]).collect();
        let hint = self.hints.hint_for(&members);

        let (local, reason) = match hint.and_then(|hint| hinted_member(&members, &hint).map(|i| (i, hint))) {
            Some((local, hint)) => (local, WinReason::Hint { hint }),
            None => {
                let local = select_winner(&members, None);
                (local, WinReason::Score { score: score(members[local]) })
            }
        };

        let winner = cluster.members[local];
        ResolvedCluster {
            winner,
            removed: cluster
                .members
                .iter()
                .copied()
                .filter(|&index| index != winner)
                .collect(),
            reason,
        }
    }
}

/// Collapses records sharing an `id`, keeping the most complete of each group.
///
/// Preference: has a rating, then has a slug, then longer description. Ties keep
/// the earliest. Records without an id are left alone.
pub fn plan_id_dedup(records: &[PlatformRecord]) -> DedupPlan {
    let mut by_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        if !record.id.trim().is_empty() {
            by_id.entry(record.id.as_str()).or_default().push(index);
        }
    }

    let rank = |record: &PlatformRecord| {
        (
            record.rating.is_some(),
            record.slug.as_deref().is_some_and(|s| !s.is_empty()),
            record.description().map(|d| d.chars().count()).unwrap_or(0),
        )
    };

    let mut plan = DedupPlan::default();
    let mut groups: Vec<Vec<usize>> = by_id.into_values().filter(|g| g.len() > 1).collect();
    groups.sort_by_key(|g| g[0]);
    for group in groups {
        let mut winner = group[0];
        for &index in &group[1..] {
            if rank(&records[index]) > rank(&records[winner]) {
                winner = index;
            }
        }
        let removed: Vec<usize> = group.iter().copied().filter(|&i| i != winner).collect();
        info!(id = %records[winner].id, removed = removed.len(), "collapsed duplicate id");
        plan.removed.extend(removed.iter().copied());
        plan.clusters.push(ResolvedCluster {
            winner,
            removed,
            reason: WinReason::IdCompleteness,
        });
    }
    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub index: usize,
    pub id: String,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub featured: bool,
    pub rating: Option<f64>,
}

impl ReportEntry {
    fn from_record(index: usize, record: &PlatformRecord) -> Self {
        Self {
            index,
            id: record.id.clone(),
            name: record.name().map(str::to_string),
            slug: record.slug.clone(),
            category: record.category.clone(),
            featured: record.is_featured(),
            rating: record.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyedGroup {
    pub key: String,
    pub entries: Vec<ReportEntry>,
}

/// Read-only overview of likely duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub total_records: usize,
    pub nameless: Vec<usize>,
    pub exact_names: Vec<KeyedGroup>,
    pub shared_domains: Vec<KeyedGroup>,
    pub fuzzy_clusters: Vec<Vec<ReportEntry>>,
    /// Records that would be dropped by a fuzzy dedup pass.
    pub redundant_records: usize,
}

impl DuplicateReport {
    pub fn build(engine: &DedupEngine, records: &[PlatformRecord]) -> Self {
        let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_domain: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut nameless = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let Some(name) = record.name() else {
                nameless.push(index);
                continue;
            };
            by_name.entry(normalize_name(name)).or_default().push(index);
            if let Some(domain) = engine.similarity().identity_domain(record) {
                by_domain.entry(domain).or_default().push(index);
            }
        }

        let keyed = |groups: BTreeMap<String, Vec<usize>>| -> Vec<KeyedGroup> {
            groups
                .into_iter()
                .filter(|(_, members)| members.len() > 1)
                .map(|(key, members)| KeyedGroup {
                    key,
                    entries: members
                        .into_iter()
                        .map(|i| ReportEntry::from_record(i, &records[i]))
                        .collect(),
                })
                .collect()
        };

        let clusters = engine.clusters(records);
        let redundant_records = clusters.iter().map(|c| c.members.len() - 1).sum();
        Self {
            total_records: records.len(),
            nameless,
            exact_names: keyed(by_name),
            shared_domains: keyed(by_domain),
            fuzzy_clusters: clusters
                .iter()
                .map(|c| {
                    c.members
                        .iter()
                        .map(|&i| ReportEntry::from_record(i, &records[i]))
                        .collect()
                })
                .collect(),
            redundant_records,
        }
    }
}

/// A discovered candidate judged to duplicate a known record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateHit {
    pub existing_name: String,
    pub reason: MatchReason,
}

/// Screens newly discovered platforms against the directory and earlier picks.
pub struct DuplicateGuard {
    similarity: SimilarityEngine,
}

impl DuplicateGuard {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            similarity: SimilarityEngine::new(config),
        }
    }

    pub fn check(
        &self,
        candidate: &PlatformRecord,
        existing: &[PlatformRecord],
        accepted: &[PlatformRecord],
    ) -> Option<DuplicateHit> {
        existing.iter().chain(accepted).find_map(|known| {
            self.similarity
                .match_reason(candidate, known)
                .map(|reason| DuplicateHit {
                    existing_name: known.name().unwrap_or_default().to_string(),
                    reason,
                })
        })
    }
}

/// Domains shared by more than one named record, excluding configured shared hosts.
pub fn domain_collisions(engine: &SimilarityEngine, records: &[PlatformRecord]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records.iter().filter(|r| r.name().is_some()) {
        if let Some(domain) = record.identity_url().and_then(domain_of) {
            if !engine.config().shared_hosts.contains(&domain) {
                *counts.entry(domain).or_default() += 1;
            }
        }
    }
    counts.retain(|_, count| *count > 1);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, name: &str) -> PlatformRecord {
        PlatformRecord::named(id, name)
    }

    fn engine() -> DedupEngine {
        DedupEngine::new(SimilarityConfig::default(), ClusterStrategy::Connected)
    }

    fn sample() -> Vec<PlatformRecord> {
        let mut records = Vec::new();
        let mut midjourney = rec("midjourney", "Midjourney");
        midjourney.rating = Some(4.8);
        records.push(midjourney);
        records.push(rec("midjourney-ai", "Midjourney AI"));
        let mut synthesia = rec("synthesia", "Synthesia");
        synthesia.url = Some("https://synthesia.io".into());
        records.push(synthesia);
        let mut studio = rec("synthesia-studio", "Avatar Studio");
        studio.url = Some("https://www.synthesia.io/studio".into());
        studio.featured = Some(true);
        records.push(studio);
        records.push(rec("descript", "Descript"));
        records
    }

    #[test]
    fn plan_keeps_best_of_each_cluster() {
        let records = sample();
        let plan = engine().plan(&records);
        assert_eq!(plan.removed, BTreeSet::from([1, 2]));

        let kept = plan.apply(records);
        let ids: Vec<_> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["midjourney", "synthesia-studio", "descript"]);
    }

    #[test]
    fn upper_case_schemes_do_not_share_a_domain() {
        let mut runway = rec("runway", "Runway");
        runway.url = Some("Https://runwayml.com".into());
        let mut midjourney = rec("midjourney", "Midjourney");
        midjourney.url = Some("HTTPS://www.midjourney.com".into());

        assert!(engine().plan(&[runway, midjourney]).is_empty());
    }

    #[test]
    fn dedup_is_idempotent() {
        for strategy in [ClusterStrategy::Connected, ClusterStrategy::AnchorSweep] {
            let engine = DedupEngine::new(SimilarityConfig::default(), strategy);
            let once = engine.plan(&sample()).apply(sample());
            assert!(engine.plan(&once).is_empty(), "{strategy:?}");
        }
    }

    #[test]
    fn connected_dedup_is_idempotent_on_chains() {
        let mut a = rec("a", "Pika");
        a.rating = Some(4.0);
        let mut b = rec("b", "Pika Labs");
        b.url = Some("https://pika.art".into());
        let mut c = rec("c", "Motion Studio");
        c.url = Some("https://pika.art/studio".into());
        let records = vec![a, b, c];

        let once = engine().plan(&records).apply(records);
        assert_eq!(once.len(), 1);
        assert!(engine().plan(&once).is_empty());
    }

    #[test]
    fn winner_does_not_depend_on_input_order() {
        let mut records = sample();
        let forward = engine().plan(&records).apply(records.clone());
        records.reverse();
        let backward = engine().plan(&records).apply(records);

        let mut forward_ids: Vec<_> = forward.into_iter().map(|r| r.id).collect();
        let mut backward_ids: Vec<_> = backward.into_iter().map(|r| r.id).collect();
        forward_ids.sort();
        backward_ids.sort();
        assert_eq!(forward_ids, backward_ids);
    }

    #[test]
    fn preferred_name_hint_keeps_main_product() {
        struct ClaudeHint;
        impl WinnerHintProvider for ClaudeHint {
            fn hint_for(&self, _members: &[&PlatformRecord]) -> Option<WinnerHint> {
                Some(WinnerHint::PreferredName("Claude".into()))
            }
        }

        let mut claude = rec("claude", "Claude");
        claude.featured = Some(false);
        claude.rating = Some(4.2);
        let mut api = rec("claude-api", "Claude API");
        api.featured = Some(false);
        let mut desktop = rec("claude-desktop", "Claude Desktop");
        desktop.featured = Some(true);
        let records = vec![claude, api, desktop];

        let plan = engine().with_hints(Box::new(ClaudeHint)).plan(&records);
        assert_eq!(plan.clusters.len(), 1);
        assert_eq!(plan.clusters[0].winner, 0);
        assert!(matches!(plan.clusters[0].reason, WinReason::Hint { .. }));
        assert_eq!(plan.removed, BTreeSet::from([1, 2]));
    }

    #[test]
    fn same_domain_records_merge_on_rating() {
        let mut runway = rec("runway", "Runway");
        runway.url = Some("https://runwayml.com".into());
        runway.rating = Some(4.0);
        let mut runway_ml = rec("runway-ml", "Runway ML");
        runway_ml.url = Some("https://runwayml.com/gen3".into());
        runway_ml.rating = Some(4.5);
        let records = vec![runway, runway_ml];

        assert!(engine().similarity().is_duplicate(&records[0], &records[1]));
        let plan = engine().plan(&records);
        assert_eq!(plan.clusters[0].winner, 1);
        assert_eq!(plan.removed, BTreeSet::from([0]));
    }

    #[test]
    fn duplicate_ids_do_not_take_the_winner_down() {
        let mut keep = rec("dup", "Gamma");
        keep.rating = Some(4.0);
        let other = rec("dup", "Gamma App");
        let records = vec![keep, other];

        let kept = engine().plan(&records).apply(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name(), Some("Gamma"));
    }

    #[test]
    fn round_trip_after_dedup_has_no_scratch_fields() {
        let records: Vec<PlatformRecord> = serde_json::from_value(json!([
            {"id": "a", "name": "Perplexity", "rating": 4.6, "has_api": true},
            {"id": "b", "name": "Perplexity AI", "url": "https://perplexity.ai"},
            {"id": "c", "name": "Descript"}
        ]))
        .expect("decode");

        let kept = engine().plan(&records).apply(records);
        let text = serde_json::to_string_pretty(&kept).expect("encode");
        let reparsed: Vec<serde_json::Value> = serde_json::from_str(&text).expect("reparse");

        assert_eq!(reparsed.len(), kept.len());
        assert_eq!(reparsed.len(), 2);
        for value in &reparsed {
            let object = value.as_object().expect("object");
            assert!(!object.contains_key("check_result"));
            assert!(!object.contains_key("extra"));
        }
        assert_eq!(reparsed[0]["has_api"], json!(true));
    }

    #[test]
    fn rules_drive_winner_selection() {
        let mut gen3 = rec("gen3", "Gen-3 Alpha");
        gen3.url = Some("https://runwayml.com/gen3".into());
        gen3.rating = Some(4.9);
        let mut runway = rec("runway", "Runway ML");
        runway.url = Some("https://runwayml.com".into());
        let records = vec![gen3, runway];

        let rules = DedupRules::from_yaml("preferred_names:\n  - domain: runwayml.com\n    keep_name: Runway ML\n")
            .expect("rules");
        let plan = DedupEngine::from_rules(rules, ClusterStrategy::Connected).plan(&records);
        assert_eq!(plan.clusters[0].winner, 1);
    }

    #[test]
    fn id_dedup_prefers_rated_then_slugged_records() {
        let plain = rec("x", "X");
        let mut slugged = rec("x", "X");
        slugged.slug = Some("x-ai".into());
        let mut rated = rec("x", "X");
        rated.rating = Some(3.0);
        let solo = rec("y", "Y");
        let records = vec![plain, slugged, rated, solo];

        let plan = plan_id_dedup(&records);
        assert_eq!(plan.clusters.len(), 1);
        assert_eq!(plan.clusters[0].winner, 2);
        assert_eq!(plan.removed, BTreeSet::from([0, 1]));
    }

    #[test]
    fn report_groups_names_domains_and_clusters() {
        let mut records = sample();
        records.push(rec("midjourney-2", "midjourney"));
        records.push(PlatformRecord {
            id: "orphan".into(),
            ..Default::default()
        });

        let report = DuplicateReport::build(&engine(), &records);
        assert_eq!(report.total_records, 7);
        assert_eq!(report.nameless, vec![6]);
        assert_eq!(report.exact_names.len(), 1);
        assert_eq!(report.exact_names[0].key, "midjourney");
        assert_eq!(report.shared_domains[0].key, "synthesia.io");
        assert_eq!(report.fuzzy_clusters.len(), 2);
        assert_eq!(report.redundant_records, 3);
    }

    #[test]
    fn guard_checks_existing_and_accepted_records() {
        let guard = DuplicateGuard::new(SimilarityConfig::default());
        let existing = vec![rec("claude", "Claude")];
        let accepted = vec![rec("gamma", "Gamma")];

        let hit = guard
            .check(&rec("new", "Claude AI"), &existing, &accepted)
            .expect("duplicate");
        assert_eq!(hit.existing_name, "Claude");
        assert!(guard.check(&rec("new", "Gamma App"), &existing, &accepted).is_some());
        assert!(guard.check(&rec("new", "Synthesia"), &existing, &accepted).is_none());
    }

    #[test]
    fn domain_collisions_skip_shared_hosts() {
        let mut config = SimilarityConfig::default();
        config.shared_hosts.insert("github.com".into());
        let similarity = SimilarityEngine::new(config);
        let mut a = rec("a", "A");
        a.url = Some("https://github.com/a".into());
        let mut b = rec("b", "B");
        b.url = Some("https://github.com/b".into());
        let mut c = rec("c", "C");
        c.url = Some("https://c.ai".into());
        let mut d = rec("d", "D");
        d.website = Some("c.ai".into());

        let collisions = domain_collisions(&similarity, &[a, b, c, d]);
        assert_eq!(collisions, BTreeMap::from([("c.ai".to_string(), 2)]));
    }
}
