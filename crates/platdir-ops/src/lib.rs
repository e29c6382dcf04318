//! Batch operations over `platforms.json`.
//!
//! Each operation loads the directory through a [`RecordStore`], works on the
//! records in memory, and saves once at the end (with a backup) unless the
//! context is a dry run. The writing operations (blog posts, pillar guides)
//! only read the directory and publish pages beside it.

mod affiliates;
mod continuous;
mod dedup;
mod discover;
mod organize;
mod urls;
mod writing;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use platdir_core::PlatformRecord;
use platdir_dedup::DedupRules;
use platdir_llm::LlmError;
use platdir_storage::{ContentWriter, RecordStore, SaveReport};
use tracing::info;

pub use affiliates::{
    affiliate_candidates, hunt_affiliates, AffiliateFinding, AffiliateOptions, AffiliateSummary, AFFILIATE_REPORT,
    AFFILIATE_RESULTS,
};
pub use continuous::{run_continuous, ContinuousOptions, ContinuousState, ContinuousSummary, STATE_FILE};
pub use dedup::{
    find_duplicates, run_dedup, run_id_dedup, validate, DedupOptions, DedupSummary, ValidationSummary,
};
pub use discover::{discover, DiscoverOptions, DiscoverySummary, DISCOVERY_REPORT};
pub use organize::{
    enrich, needs_enrichment, needs_recategorization, recategorize, review_duplicates, EnrichOptions,
    EnrichSummary, OrganizationReport, RecategorizeOptions, RecategorizeSummary, ReviewOptions,
    ReviewSummary, ReviewedGroup, ORGANIZATION_REPORT,
};
pub use urls::{
    validate_urls, RemovalCandidate, SuspiciousRedirect, UrlCheckOptions, UrlCheckReport, UrlCheckSummary,
    DEAD_URLS_REPORT,
};
pub use writing::{write_blog_posts, write_pillar_guides, BlogOptions, BlogPost, PillarOptions, WritingSummary};

pub const CRATE_NAME: &str = "platdir-ops";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub platforms_path: PathBuf,
    pub workspace_root: PathBuf,
    pub rules_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub site_url: String,
    pub llm_delay_ms: u64,
}

impl DirectoryConfig {
    pub fn from_env() -> Self {
        Self {
            platforms_path: std::env::var("PLATDIR_PLATFORMS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("platforms.json")),
            workspace_root: std::env::var("PLATDIR_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            rules_path: std::env::var("PLATDIR_RULES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("rules/dedup.yaml")),
            user_agent: std::env::var("PLATDIR_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: std::env::var("PLATDIR_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            site_url: std::env::var("PLATDIR_SITE_URL")
                .unwrap_or_else(|_| "https://aiplatformslist.com".to_string()),
            llm_delay_ms: std::env::var("PLATDIR_LLM_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        }
    }

    /// Configuration rooted at `workspace`, with every other value at its default.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self {
            platforms_path: PathBuf::from("platforms.json"),
            workspace_root: workspace.into(),
            rules_path: PathBuf::from("rules/dedup.yaml"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
            site_url: "https://aiplatformslist.com".to_string(),
            llm_delay_ms: 3000,
        }
    }
}

/// What every operation gets: configuration and whether it may write.
#[derive(Debug, Clone)]
pub struct OpsContext {
    pub config: DirectoryConfig,
    pub dry_run: bool,
}

impl OpsContext {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config, dry_run: false }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Relative paths resolve against the workspace root.
    pub fn platforms_path(&self) -> PathBuf {
        self.config.workspace_root.join(&self.config.platforms_path)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.config.workspace_root.join(&self.config.rules_path)
    }

    pub fn writer(&self) -> ContentWriter {
        ContentWriter::new(self.config.workspace_root.clone())
    }

    pub fn llm_delay(&self) -> Duration {
        Duration::from_millis(self.config.llm_delay_ms)
    }

    pub async fn open_store(&self) -> Result<(RecordStore, Vec<PlatformRecord>)> {
        Ok(RecordStore::open(self.platforms_path()).await?)
    }

    pub fn load_rules(&self) -> Result<DedupRules> {
        DedupRules::load(&self.rules_path())
    }

    /// Saves unless this is a dry run.
    pub async fn save(
        &self,
        store: &RecordStore,
        records: &[PlatformRecord],
        backup_label: &str,
    ) -> Result<Option<SaveReport>> {
        if self.dry_run {
            info!(records = records.len(), label = backup_label, "dry run; platforms not written");
            return Ok(None);
        }
        store.save(records, backup_label).await.map(Some)
    }
}

/// Whether an operation stopped because the AI provider ran out of credits.
pub fn is_credits_exhausted(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<LlmError>().is_some_and(LlmError::is_credits_exhausted))
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn credits_exhaustion_is_found_through_context() {
        let err = Err::<(), _>(LlmError::CreditsExhausted("402".into()))
            .context("enriching")
            .expect_err("error");
        assert!(is_credits_exhausted(&err));
        assert!(!is_credits_exhausted(&anyhow::anyhow!("disk full")));
    }

    #[test]
    fn relative_paths_resolve_under_workspace() {
        let ctx = OpsContext::new(DirectoryConfig::for_workspace("/srv/dir"));
        assert_eq!(ctx.platforms_path(), PathBuf::from("/srv/dir/platforms.json"));
        assert_eq!(ctx.rules_path(), PathBuf::from("/srv/dir/rules/dedup.yaml"));
    }
}
