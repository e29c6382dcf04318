//! AI-assisted upkeep: enrichment, recategorisation and duplicate review.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use platdir_core::PlatformRecord;
use platdir_dedup::{ClusterStrategy, DedupEngine};
use platdir_llm::tasks::{enrich_platform, review_duplicate_group, suggest_categories, DuplicateDecision};
use platdir_llm::{ChatClient, ConfidenceGate, LlmError};
use platdir_storage::SaveReport;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::OpsContext;

pub const ORGANIZATION_REPORT: &str = "organization-report.json";

const GENERIC_CATEGORIES: &[&str] = &["generative-ai", "llms", "ml-frameworks"];
const THIN_DESCRIPTION_CHARS: usize = 50;

fn known_categories(records: &[PlatformRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(PlatformRecord::category)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Records that would benefit from enrichment: thin description, or no
/// features, use cases, or pricing details.
pub fn needs_enrichment(record: &PlatformRecord) -> bool {
    let thin = record
        .description()
        .map_or(true, |d| d.chars().count() < THIN_DESCRIPTION_CHARS);
    thin || record.feature_list().is_empty() || !record.has_extra("use_cases") || !record.has_extra("pricing_details")
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub max: usize,
    pub gate: ConfidenceGate,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            max: 20,
            gate: ConfidenceGate::ENRICHMENT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichSummary {
    pub candidates: usize,
    pub enriched: usize,
    pub low_confidence: usize,
    pub no_answer: usize,
    pub saved: Option<SaveReport>,
}

pub async fn enrich(ctx: &OpsContext, client: &dyn ChatClient, options: EnrichOptions) -> Result<EnrichSummary> {
    async {
        let (store, mut records) = ctx.open_store().await?;
        let categories = known_categories(&records);
        let targets: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name().is_some() && needs_enrichment(r))
            .map(|(index, _)| index)
            .take(options.max)
            .collect();
        info!(candidates = targets.len(), max = options.max, "enriching platforms");

        let mut summary = EnrichSummary {
            candidates: targets.len(),
            ..EnrichSummary::default()
        };
        let mut stopped: Option<LlmError> = None;
        for (n, &index) in targets.iter().enumerate() {
            if n > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            let proposal = match enrich_platform(client, &records[index], &categories).await {
                Ok(Some(proposal)) => proposal,
                Ok(None) => {
                    summary.no_answer += 1;
                    continue;
                }
                Err(err) => {
                    stopped = Some(err);
                    break;
                }
            };
            let record = &mut records[index];
            match options.gate.admit(proposal) {
                Ok(proposal) => {
                    let confidence = proposal.confidence;
                    let fields = proposal.merge_into(record);
                    record.enriched_at = Some(now_rfc3339());
                    summary.enriched += 1;
                    info!(name = ?record.name(), confidence, fields = ?fields, "enriched");
                }
                Err(low) => {
                    summary.low_confidence += 1;
                    debug!(name = ?record.name(), confidence = low.confidence, "enrichment below threshold");
                }
            }
        }

        if summary.enriched > 0 {
            summary.saved = ctx.save(&store, &records, "enrichment").await?;
        }
        if let Some(err) = stopped {
            return Err(err).context(format!("enrichment stopped after {} platforms", summary.enriched));
        }
        info!(enriched = summary.enriched, low_confidence = summary.low_confidence, "enrichment complete");
        Ok(summary)
    }
    .instrument(info_span!("enrich"))
    .await
}

#[derive(Debug, Clone)]
pub struct RecategorizeOptions {
    pub max: usize,
    pub batch_size: usize,
    pub gate: ConfidenceGate,
}

impl Default for RecategorizeOptions {
    fn default() -> Self {
        Self {
            max: 30,
            batch_size: 10,
            gate: ConfidenceGate::RECATEGORIZATION,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecategorizeSummary {
    pub checked: usize,
    /// Verdicts that cleared the gate, whether or not the category changed.
    pub reviewed: usize,
    pub moved: usize,
    pub saved: Option<SaveReport>,
}

/// Records never reviewed for category fit.
pub fn needs_recategorization(record: &PlatformRecord) -> bool {
    record.recategorized_date.is_none()
}

fn in_generic_category(record: &PlatformRecord) -> bool {
    record.category().is_some_and(|c| GENERIC_CATEGORIES.contains(&c))
}

pub async fn recategorize(
    ctx: &OpsContext,
    client: &dyn ChatClient,
    options: RecategorizeOptions,
) -> Result<RecategorizeSummary> {
    async {
        let (store, mut records) = ctx.open_store().await?;
        let categories = known_categories(&records);
        let mut targets: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name().is_some() && needs_recategorization(r))
            .map(|(index, _)| index)
            .collect();
        targets.sort_by_key(|&index| !in_generic_category(&records[index]));
        targets.truncate(options.max);
        info!(targets = targets.len(), categories = categories.len(), "recategorizing platforms");

        let mut summary = RecategorizeSummary {
            checked: targets.len(),
            ..RecategorizeSummary::default()
        };
        let mut stopped: Option<LlmError> = None;
        for (n, chunk) in targets.chunks(options.batch_size.max(1)).enumerate() {
            if n > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            let batch: Vec<&PlatformRecord> = chunk.iter().map(|&i| &records[i]).collect();
            let suggestions = match suggest_categories(client, &batch, &categories).await {
                Ok(suggestions) => suggestions,
                Err(err) => {
                    stopped = Some(err);
                    break;
                }
            };

            for suggestion in suggestions {
                let suggestion = match options.gate.admit(suggestion) {
                    Ok(suggestion) => suggestion,
                    Err(low) => {
                        debug!(confidence = low.confidence, "category suggestion below threshold");
                        continue;
                    }
                };
                let wanted = suggestion.name.trim().to_lowercase();
                let Some(&index) = chunk
                    .iter()
                    .find(|&&i| records[i].name().is_some_and(|n| n.to_lowercase() == wanted))
                else {
                    warn!(name = %suggestion.name, "suggestion names no platform in the batch");
                    continue;
                };
                let record = &mut records[index];
                record.recategorized_date = Some(now_rfc3339());
                summary.reviewed += 1;
                let Some(target) = suggestion
                    .proposed_category()
                    .filter(|target| record.category() != Some(*target))
                    .map(str::to_string)
                else {
                    debug!(name = ?record.name(), "category confirmed");
                    continue;
                };
                info!(
                    name = ?record.name(),
                    from = ?record.category(),
                    to = %target,
                    reasoning = %suggestion.reasoning,
                    "recategorized"
                );
                record.recategorized_from = record.category.take();
                record.category = Some(target);
                summary.moved += 1;
            }
        }

        if summary.reviewed > 0 {
            summary.saved = ctx.save(&store, &records, "recategorize").await?;
        }
        if let Some(err) = stopped {
            return Err(err).context(format!("recategorization stopped after {} moves", summary.moved));
        }
        Ok(summary)
    }
    .instrument(info_span!("recategorize"))
    .await
}

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub groups: usize,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self { groups: 5 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewedGroup {
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub decision: DuplicateDecision,
}

/// Contents of `organization-report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationReport {
    pub generated_at: DateTime<Utc>,
    pub candidate_groups: usize,
    pub reviewed: Vec<ReviewedGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub report: OrganizationReport,
    pub report_path: Option<PathBuf>,
}

/// Asks the model about the first fuzzy clusters. The directory is not modified.
pub async fn review_duplicates(ctx: &OpsContext, client: &dyn ChatClient, options: ReviewOptions) -> Result<ReviewSummary> {
    async {
        let (_store, records) = ctx.open_store().await?;
        let engine = DedupEngine::from_rules(ctx.load_rules()?, ClusterStrategy::default());
        let clusters = engine.clusters(&records);
        info!(groups = clusters.len(), reviewing = clusters.len().min(options.groups), "reviewing duplicate groups");

        let mut reviewed = Vec::new();
        for (n, cluster) in clusters.iter().take(options.groups).enumerate() {
            if n > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            let members: Vec<&PlatformRecord> = cluster.members.iter().map(|&i| &records[i]).collect();
            let Some(decision) = review_duplicate_group(client, &members).await? else {
                continue;
            };
            let names: Vec<String> = members.iter().filter_map(|r| r.name()).map(str::to_string).collect();
            info!(group = %names.join(" / "), action = ?decision.action, duplicates = decision.are_duplicates, "reviewed");
            reviewed.push(ReviewedGroup {
                ids: members.iter().map(|r| r.id.clone()).collect(),
                names,
                decision,
            });
        }

        let report = OrganizationReport {
            generated_at: Utc::now(),
            candidate_groups: clusters.len(),
            reviewed,
        };
        let report_path = if ctx.dry_run {
            None
        } else {
            Some(ctx.writer().write_json(ORGANIZATION_REPORT, &report).await?.path)
        };
        Ok(ReviewSummary { report, report_path })
    }
    .instrument(info_span!("review_duplicates"))
    .await
}
