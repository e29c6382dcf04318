use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use platdir_core::{slugify, PlatformRecord};
use platdir_dedup::DuplicateGuard;
use platdir_llm::tasks::{discover_batch, DiscoveryContext};
use platdir_llm::{ChatClient, LlmError};
use platdir_storage::SaveReport;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::OpsContext;

pub const DISCOVERY_REPORT: &str = "MASS_DISCOVERY_REPORT.md";
const DISCOVERED_BY: &str = "mass-discovery";

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub per_batch: usize,
    pub batches: usize,
    /// Batches requested concurrently per group.
    pub workers: usize,
    pub cooldown: Duration,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            per_batch: 100,
            batches: 5,
            workers: 3,
            cooldown: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub starting_count: usize,
    pub proposed: usize,
    pub duplicates: usize,
    pub added: usize,
    pub final_count: usize,
    pub by_category: BTreeMap<String, usize>,
    pub with_affiliates: usize,
    pub saved: Option<SaveReport>,
    pub report: Option<PathBuf>,
}

fn has_affiliate(record: &PlatformRecord) -> bool {
    record.extra.get("has_affiliate") == Some(&JsonValue::Bool(true))
}

fn extra_text<'a>(record: &'a PlatformRecord, key: &str) -> Option<&'a str> {
    record.extra.get(key).and_then(JsonValue::as_str).filter(|s| !s.trim().is_empty())
}

/// Fills in the bookkeeping fields of a freshly accepted record.
fn stamp(mut record: PlatformRecord, taken_ids: &mut BTreeSet<String>) -> PlatformRecord {
    let mut slug = slugify(record.name().unwrap_or_default());
    if slug.is_empty() {
        slug = "platform".to_string();
    }
    let mut id = slug.clone();
    if taken_ids.contains(&id) {
        let suffix = Uuid::new_v4().simple().to_string();
        id = format!("{slug}-{}", &suffix[..8]);
    }
    taken_ids.insert(id.clone());

    record.id = id;
    record.slug = Some(slug);
    record.added_date = Some(JsonValue::String(Utc::now().to_rfc3339()));
    record.discovered_by = Some(DISCOVERED_BY.to_string());
    record.rating = None;
    record.featured = Some(false);
    record.clicks = Some(0.0);
    record
}

fn render_report(accepted: &[PlatformRecord], by_category: &BTreeMap<String, usize>) -> String {
    let mut out = String::from("# Mass Discovery Report\n\n");
    let _ = writeln!(out, "Date: {}\n", Utc::now().to_rfc3339());
    out.push_str("## Summary\n\n");
    let _ = writeln!(out, "- Discovered: {} platforms", accepted.len());
    let _ = writeln!(out, "- With affiliates: {}", accepted.iter().filter(|r| has_affiliate(r)).count());
    let _ = writeln!(out, "- Categories: {}\n", by_category.len());
    out.push_str("## New Platforms\n\n");
    for record in accepted {
        let _ = writeln!(out, "### {}", record.name().unwrap_or(&record.id));
        let _ = writeln!(out, "- **Category**: {}", record.category().unwrap_or("uncategorized"));
        let _ = writeln!(out, "- **URL**: {}", record.identity_url().unwrap_or_default());
        let pricing = extra_text(record, "monthly_pricing").or(record.pricing.as_deref());
        let _ = writeln!(out, "- **Pricing**: {}", pricing.unwrap_or("unknown"));
        if has_affiliate(record) {
            let terms = extra_text(record, "affiliate_commission").or_else(|| extra_text(record, "affiliate_info"));
            let _ = writeln!(out, "- **Affiliate**: {}", terms.unwrap_or("yes"));
        }
        let _ = writeln!(out, "- **Source**: {}", extra_text(record, "source").unwrap_or(DISCOVERED_BY));
        out.push('\n');
    }
    out
}

/// Runs discovery batches in concurrent groups and appends the unique finds.
///
/// Candidates are screened against the directory and everything accepted
/// earlier in the run. When credits run out, what was accepted so far is still
/// saved before the error is returned.
pub async fn discover(
    ctx: &OpsContext,
    client: Arc<dyn ChatClient>,
    options: DiscoverOptions,
) -> Result<DiscoverySummary> {
    let span = info_span!("discover", batches = options.batches, per_batch = options.per_batch);
    async {
        let (store, mut records) = ctx.open_store().await?;
        let rules = ctx.load_rules()?;
        let guard = DuplicateGuard::new(rules.similarity_config());
        let prompt_ctx = Arc::new(DiscoveryContext::from_records(&records));
        let mut taken_ids: BTreeSet<String> = records.iter().map(|r| r.id.clone()).collect();

        let starting_count = records.len();
        let workers = options.workers.max(1);
        let mut accepted: Vec<PlatformRecord> = Vec::new();
        let mut proposed = 0usize;
        let mut duplicates = 0usize;
        let mut stopped: Option<LlmError> = None;

        let mut group_start = 0;
        while group_start < options.batches {
            let group_end = (group_start + workers).min(options.batches);
            info!(from = group_start + 1, to = group_end, of = options.batches, "discovery group");

            let mut set = JoinSet::new();
            for batch_no in group_start..group_end {
                let client = Arc::clone(&client);
                let prompt_ctx = Arc::clone(&prompt_ctx);
                let per_batch = options.per_batch;
                set.spawn(async move {
                    let found = discover_batch(client.as_ref(), &prompt_ctx, batch_no, per_batch).await;
                    (batch_no, found)
                });
            }
            let mut results = Vec::new();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(err) => warn!(error = %err, "discovery task failed"),
                }
            }
            results.sort_by_key(|(batch_no, _)| *batch_no);

            for (batch_no, found) in results {
                let candidates = match found {
                    Ok(candidates) => candidates,
                    Err(err) => {
                        stopped.get_or_insert(err);
                        continue;
                    }
                };
                proposed += candidates.len();
                for candidate in candidates {
                    if let Some(hit) = guard.check(&candidate, &records, &accepted) {
                        duplicates += 1;
                        debug!(
                            batch_no,
                            name = ?candidate.name(),
                            matches = %hit.existing_name,
                            reason = ?hit.reason,
                            "skipping duplicate"
                        );
                        continue;
                    }
                    let record = stamp(candidate, &mut taken_ids);
                    info!(batch_no, name = ?record.name(), category = ?record.category(), "new platform");
                    accepted.push(record);
                }
            }

            if stopped.is_some() {
                warn!("AI credits exhausted; stopping discovery");
                break;
            }
            group_start = group_end;
            if group_start < options.batches && !options.cooldown.is_zero() {
                tokio::time::sleep(options.cooldown).await;
            }
        }

        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        for record in &accepted {
            *by_category
                .entry(record.category().unwrap_or("uncategorized").to_string())
                .or_default() += 1;
        }
        let with_affiliates = accepted.iter().filter(|r| has_affiliate(r)).count();
        let added = accepted.len();

        let mut saved = None;
        let mut report = None;
        if added > 0 {
            let markdown = render_report(&accepted, &by_category);
            records.extend(accepted);
            saved = ctx.save(&store, &records, "discovery").await?;
            if !ctx.dry_run {
                report = Some(ctx.writer().write_text(DISCOVERY_REPORT, &markdown).await?.path);
            }
        }
        info!(starting_count, proposed, duplicates, added, final_count = records.len(), "discovery complete");

        if let Some(err) = stopped {
            return Err(err).context(format!("discovery stopped after adding {added} platforms"));
        }
        Ok(DiscoverySummary {
            starting_count,
            proposed,
            duplicates,
            added,
            final_count: records.len(),
            by_category,
            with_affiliates,
            saved,
            report,
        })
    }
    .instrument(span)
    .await
}
