//! Grouping records into duplicate clusters.

use platdir_core::PlatformRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::similarity::SimilarityEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStrategy {
    /// Connected components over all pairwise matches.
    #[default]
    Connected,
    /// Each unclaimed record sweeps forward and claims records matching it directly.
    /// Not transitive: members are only guaranteed to match the anchor.
    AnchorSweep,
}

/// Positions (into the input slice) of records judged to be one platform.
/// Members are in ascending position order; always at least two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub members: Vec<usize>,
}

pub fn cluster_records(
    engine: &SimilarityEngine,
    records: &[PlatformRecord],
    strategy: ClusterStrategy,
) -> Vec<Cluster> {
    let named: Vec<usize> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            if record.name().is_some() {
                Some(index)
            } else {
                warn!(index, id = %record.id, "skipping record without a name");
                None
            }
        })
        .collect();

    match strategy {
        ClusterStrategy::AnchorSweep => anchor_sweep(engine, records, &named),
        ClusterStrategy::Connected => connected_components(engine, records, &named),
    }
}

fn anchor_sweep(
    engine: &SimilarityEngine,
    records: &[PlatformRecord],
    named: &[usize],
) -> Vec<Cluster> {
    let mut claimed = vec![false; named.len()];
    let mut clusters = Vec::new();

    for i in 0..named.len() {
        if claimed[i] {
            continue;
        }
        let anchor = &records[named[i]];
        let mut members = vec![named[i]];
        for j in (i + 1)..named.len() {
            if claimed[j] {
                continue;
            }
            if let Some(reason) = engine.match_reason(anchor, &records[named[j]]) {
                debug!(anchor = named[i], candidate = named[j], ?reason, "anchor match");
                claimed[j] = true;
                members.push(named[j]);
            }
        }
        if members.len() > 1 {
            claimed[i] = true;
            clusters.push(Cluster { members });
        }
    }
    clusters
}

fn connected_components(
    engine: &SimilarityEngine,
    records: &[PlatformRecord],
    named: &[usize],
) -> Vec<Cluster> {
    let mut sets = DisjointSets::new(named.len());
    for i in 0..named.len() {
        for j in (i + 1)..named.len() {
            if let Some(reason) = engine.match_reason(&records[named[i]], &records[named[j]]) {
                debug!(a = named[i], b = named[j], ?reason, "pairwise match");
                sets.union(i, j);
            }
        }
    }

    // Roots are visited in first-member order, so clusters come out ordered by
    // their earliest record.
    let mut root_slot: Vec<Option<usize>> = vec![None; named.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in 0..named.len() {
        let root = sets.find(i);
        let slot = *root_slot[root].get_or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(named[i]);
    }

    groups
        .into_iter()
        .filter(|members| members.len() > 1)
        .map(|members| Cluster { members })
        .collect()
}

struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityConfig;

    fn rec(id: &str, name: &str, url: Option<&str>) -> PlatformRecord {
        let mut record = PlatformRecord::named(id, name);
        record.url = url.map(str::to_string);
        record
    }

    fn engine() -> SimilarityEngine {
        SimilarityEngine::new(SimilarityConfig::default())
    }

    /// a~b by name, b~c by domain, a and c unrelated.
    fn chain() -> Vec<PlatformRecord> {
        vec![
            rec("a", "Pika", Some("https://pika.example")),
            rec("b", "Pika Labs", Some("https://pika.art")),
            rec("c", "Motion Studio", Some("https://pika.art/studio")),
            rec("d", "Synthesia", Some("https://synthesia.io")),
        ]
    }

    #[test]
    fn anchor_sweep_is_not_transitive() {
        let clusters = cluster_records(&engine(), &chain(), ClusterStrategy::AnchorSweep);
        assert_eq!(clusters, vec![Cluster { members: vec![0, 1] }]);
    }

    #[test]
    fn connected_strategy_follows_chains() {
        let clusters = cluster_records(&engine(), &chain(), ClusterStrategy::Connected);
        assert_eq!(clusters, vec![Cluster { members: vec![0, 1, 2] }]);
    }

    #[test]
    fn singletons_and_nameless_records_are_excluded() {
        let records = vec![
            rec("a", "Claude", None),
            PlatformRecord {
                id: "ghost".into(),
                url: Some("https://claude.ai".into()),
                ..Default::default()
            },
            rec("b", "Synthesia", None),
        ];
        for strategy in [ClusterStrategy::Connected, ClusterStrategy::AnchorSweep] {
            assert!(cluster_records(&engine(), &records, strategy).is_empty());
        }
    }
}
