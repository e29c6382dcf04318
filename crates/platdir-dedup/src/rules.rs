//! Curated dedup rules loaded from `rules/dedup.yaml`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use platdir_core::{domain_of, PlatformRecord};
use serde::Deserialize;
use tracing::{debug, info};

use crate::merge::{WinnerHint, WinnerHintProvider};
use crate::similarity::{normalize_name, SimilarityConfig, DEFAULT_NAME_THRESHOLD};

#[derive(Debug, Clone, Deserialize)]
pub struct DedupRules {
    #[allow(dead_code)]
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_threshold")]
    pub name_threshold: f64,
    #[serde(default)]
    pub shared_hosts: Vec<String>,
    #[serde(default)]
    pub preferred_names: Vec<PreferredNameRule>,
    #[serde(default)]
    pub preferred_ids: Vec<PreferredIdRule>,
    /// Retired platform slugs and the live slug content pages should use instead.
    #[serde(default)]
    pub slug_corrections: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferredNameRule {
    pub domain: String,
    pub keep_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferredIdRule {
    pub name: String,
    pub keep_id: String,
}

fn default_version() -> u32 {
    1
}

fn default_threshold() -> f64 {
    DEFAULT_NAME_THRESHOLD
}

/// Threshold and shared hosts only; per-platform hints live in the rules file.
impl Default for DedupRules {
    fn default() -> Self {
        Self {
            version: 1,
            name_threshold: DEFAULT_NAME_THRESHOLD,
            shared_hosts: ["github.com", "arxiv.org", "papers.neurips.cc", "openreview.net"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            preferred_names: Vec::new(),
            preferred_ids: Vec::new(),
            slug_corrections: BTreeMap::new(),
        }
    }
}

/// Name similarity thresholds are ratios in `0..=1`.
pub fn check_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold must be within 0..=1, got {threshold}");
    }
    Ok(threshold)
}

impl DedupRules {
    /// Reads the rules file, or returns the built-in rules when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no dedup rules file; using built-in rules");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let rules: Self = serde_yaml::from_str(text)?;
        check_threshold(rules.name_threshold).context("name_threshold")?;
        Ok(rules)
    }

    pub fn similarity_config(&self) -> SimilarityConfig {
        SimilarityConfig {
            name_threshold: self.name_threshold,
            shared_hosts: self
                .shared_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .collect::<BTreeSet<_>>(),
        }
    }
}

impl WinnerHintProvider for DedupRules {
    fn hint_for(&self, members: &[&PlatformRecord]) -> Option<WinnerHint> {
        let names: Vec<String> = members
            .iter()
            .filter_map(|r| r.name())
            .map(normalize_name)
            .collect();
        if let Some(rule) = self
            .preferred_ids
            .iter()
            .find(|rule| names.contains(&normalize_name(&rule.name)))
        {
            debug!(name = %rule.name, keep_id = %rule.keep_id, "preferred id rule applies");
            return Some(WinnerHint::PreferredId(rule.keep_id.clone()));
        }

        let domains: Vec<String> = members
            .iter()
            .filter_map(|r| r.identity_url())
            .filter_map(domain_of)
            .collect();
        self.preferred_names
            .iter()
            .find(|rule| domains.iter().any(|d| d.eq_ignore_ascii_case(&rule.domain)))
            .map(|rule| {
                debug!(domain = %rule.domain, keep_name = %rule.keep_name, "preferred name rule applies");
                WinnerHint::PreferredName(rule.keep_name.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_file_with_defaults_for_missing_keys() {
        let rules = DedupRules::from_yaml(
            r#"
version: 1
shared_hosts: [GitHub.com]
preferred_ids:
  - name: Hugging Face
    keep_id: hugging-face
"#,
        )
        .expect("parse");

        assert_eq!(rules.name_threshold, DEFAULT_NAME_THRESHOLD);
        assert!(rules.preferred_names.is_empty());
        assert!(rules.similarity_config().shared_hosts.contains("github.com"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(DedupRules::from_yaml("name_threshold: 1.5").is_err());
        assert!(check_threshold(-0.1).is_err());
        assert!(check_threshold(f64::NAN).is_err());
        assert_eq!(check_threshold(1.0).ok(), Some(1.0));
    }

    #[test]
    fn missing_file_yields_built_in_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules = DedupRules::load(&dir.path().join("dedup.yaml")).expect("load");
        assert!(rules.shared_hosts.iter().any(|h| h == "arxiv.org"));
        assert!(rules.preferred_names.is_empty());
        assert!(rules.preferred_ids.is_empty());
    }

    #[test]
    fn load_reads_yaml_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dedup.yaml");
        std::fs::write(&path, "name_threshold: 0.8\n").expect("write");
        let rules = DedupRules::load(&path).expect("load");
        assert_eq!(rules.name_threshold, 0.8);
        assert!(rules.shared_hosts.is_empty());
    }

    #[test]
    fn hints_follow_domain_and_name_rules() {
        let rules = DedupRules::from_yaml(
            "preferred_names:\n  - domain: runwayml.com\n    keep_name: Runway ML\n",
        )
        .expect("parse");
        let mut gen3 = PlatformRecord::named("gen3", "Gen-3 Alpha");
        gen3.url = Some("https://runwayml.com/gen3".into());
        let runway = PlatformRecord::named("runway", "Runway ML");
        assert_eq!(
            rules.hint_for(&[&gen3, &runway]),
            Some(WinnerHint::PreferredName("Runway ML".into()))
        );

        let rules = DedupRules::from_yaml(
            "preferred_ids:\n  - name: hugging face\n    keep_id: hf\n",
        )
        .expect("parse");
        let hub = PlatformRecord::named("hf", "Hugging  Face");
        assert_eq!(rules.hint_for(&[&hub]), Some(WinnerHint::PreferredId("hf".into())));
        assert_eq!(rules.hint_for(&[&gen3]), None);
    }

    #[test]
    fn built_in_rules_never_pick_a_winner() {
        let mut gen3 = PlatformRecord::named("gen3", "Gen-3 Alpha");
        gen3.url = Some("https://runwayml.com/gen3".into());
        let claude = PlatformRecord::named("claude", "Claude");
        assert_eq!(DedupRules::default().hint_for(&[&gen3, &claude]), None);
    }

    #[test]
    fn shipped_rules_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules/dedup.yaml");
        let rules = DedupRules::load(&path).expect("rules/dedup.yaml");
        assert!(rules.preferred_names.iter().any(|r| r.domain == "runwayml.com"));
        assert_eq!(rules.slug_corrections.get("gpt-4").map(String::as_str), Some("chatgpt"));
    }
}
