use std::path::PathBuf;

use anyhow::Result;
use platdir_core::{validate_records, RecordIssue};
use platdir_dedup::{check_threshold, plan_id_dedup, ClusterStrategy, DedupEngine, DuplicateReport};
use platdir_storage::SaveReport;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::OpsContext;

#[derive(Debug, Clone, Default)]
pub struct DedupOptions {
    pub strategy: ClusterStrategy,
    /// Overrides the rules file's name threshold.
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupSummary {
    pub before: usize,
    pub after: usize,
    pub clusters: usize,
    pub removed: usize,
    pub saved: Option<SaveReport>,
}

pub async fn run_dedup(ctx: &OpsContext, options: DedupOptions) -> Result<DedupSummary> {
    async {
        let threshold = options.threshold.map(check_threshold).transpose()?;
        let (store, records) = ctx.open_store().await?;
        let mut engine = DedupEngine::from_rules(ctx.load_rules()?, options.strategy);
        if let Some(threshold) = threshold {
            engine = engine.with_threshold(threshold);
        }

        let plan = engine.plan(&records);
        let before = records.len();
        let clusters = plan.clusters.len();
        let removed = plan.removed_count();
        let records = plan.apply(records);

        let saved = if plan.is_empty() {
            info!("no duplicates found; platforms unchanged");
            None
        } else {
            ctx.save(&store, &records, "dedup").await?
        };
        info!(before, after = records.len(), clusters, removed, "dedup complete");
        Ok(DedupSummary {
            before,
            after: records.len(),
            clusters,
            removed,
            saved,
        })
    }
    .instrument(info_span!("dedup", strategy = ?options.strategy))
    .await
}

pub async fn run_id_dedup(ctx: &OpsContext) -> Result<DedupSummary> {
    async {
        let (store, records) = ctx.open_store().await?;
        let plan = plan_id_dedup(&records);
        let before = records.len();
        let clusters = plan.clusters.len();
        let removed = plan.removed_count();
        let records = plan.apply(records);

        let saved = if plan.is_empty() {
            info!("no duplicate ids; platforms unchanged");
            None
        } else {
            ctx.save(&store, &records, "id-dedup").await?
        };
        Ok(DedupSummary {
            before,
            after: records.len(),
            clusters,
            removed,
            saved,
        })
    }
    .instrument(info_span!("dedup_ids"))
    .await
}

/// Builds the duplicate overview; writes it as JSON when `report_path` is set.
pub async fn find_duplicates(ctx: &OpsContext, report_path: Option<PathBuf>) -> Result<DuplicateReport> {
    let (_store, records) = ctx.open_store().await?;
    let engine = DedupEngine::from_rules(ctx.load_rules()?, ClusterStrategy::default());
    let report = DuplicateReport::build(&engine, &records);
    info!(
        total = report.total_records,
        exact_names = report.exact_names.len(),
        shared_domains = report.shared_domains.len(),
        fuzzy_clusters = report.fuzzy_clusters.len(),
        redundant = report.redundant_records,
        "duplicate report built"
    );

    match report_path {
        Some(_) if ctx.dry_run => info!("dry run; duplicate report not written"),
        Some(path) => {
            let written = ctx.writer().write_json(&path, &report).await?;
            info!(path = %written.path.display(), "duplicate report written");
        }
        None => {}
    }
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total_records: usize,
    pub issues: Vec<RecordIssue>,
}

impl ValidationSummary {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub async fn validate(ctx: &OpsContext) -> Result<ValidationSummary> {
    let (_store, records) = ctx.open_store().await?;
    let issues = validate_records(&records);
    for issue in &issues {
        warn!(?issue, "record issue");
    }
    info!(records = records.len(), issues = issues.len(), "validation complete");
    Ok(ValidationSummary {
        total_records: records.len(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, read_platforms, write_platforms};
    use serde_json::json;
    use tempfile::tempdir;

    fn directory() -> serde_json::Value {
        json!([
            {"id": "runway", "name": "Runway", "url": "https://runwayml.com", "rating": 4.5},
            {"id": "claude", "name": "Claude", "url": "https://claude.ai", "rating": 4.8, "featured": true},
            {"id": "runway-ml", "name": "Runway ML", "url": "https://www.runwayml.com/"},
            {"id": "claude-ai", "name": "Claude AI", "url": "https://claude.ai"}
        ])
    }

    #[tokio::test]
    async fn dedup_saves_with_backup() {
        let dir = tempdir().expect("tempdir");
        write_platforms(dir.path(), directory());
        std::fs::create_dir_all(dir.path().join("rules")).expect("rules dir");
        std::fs::write(
            dir.path().join("rules/dedup.yaml"),
            "preferred_names:\n  - domain: runwayml.com\n    keep_name: Runway ML\n",
        )
        .expect("rules");
        let ctx = context(dir.path());

        let summary = run_dedup(&ctx, DedupOptions::default()).await.expect("dedup");
        assert_eq!((summary.before, summary.after, summary.clusters), (4, 2, 2));
        assert!(dir.path().join("platforms.before-dedup.json").exists());

        let saved = read_platforms(dir.path());
        let names: Vec<_> = saved
            .as_array()
            .expect("array")
            .iter()
            .map(|r| r["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["Claude", "Runway ML"]);

        let again = run_dedup(&ctx, DedupOptions::default()).await.expect("rerun");
        assert_eq!(again.removed, 0);
        assert!(again.saved.is_none());
    }

    #[tokio::test]
    async fn out_of_range_threshold_is_rejected() {
        let dir = tempdir().expect("tempdir");
        write_platforms(dir.path(), directory());
        let before = std::fs::read(dir.path().join("platforms.json")).expect("read");
        let options = DedupOptions {
            threshold: Some(1.5),
            ..DedupOptions::default()
        };

        assert!(run_dedup(&context(dir.path()), options).await.is_err());
        assert_eq!(std::fs::read(dir.path().join("platforms.json")).expect("read"), before);
    }

    #[tokio::test]
    async fn dry_run_leaves_file_alone() {
        let dir = tempdir().expect("tempdir");
        write_platforms(dir.path(), directory());
        let before = std::fs::read(dir.path().join("platforms.json")).expect("read");
        let ctx = context(dir.path()).dry_run(true);

        let summary = run_dedup(&ctx, DedupOptions::default()).await.expect("dedup");
        assert_eq!(summary.removed, 2);
        assert!(summary.saved.is_none());
        assert_eq!(std::fs::read(dir.path().join("platforms.json")).expect("read"), before);
        assert!(!dir.path().join("platforms.before-dedup.json").exists());

        find_duplicates(&ctx, Some(PathBuf::from("dupes.json"))).await.expect("report");
        assert!(!dir.path().join("dupes.json").exists());
    }

    #[tokio::test]
    async fn id_dedup_and_report() {
        let dir = tempdir().expect("tempdir");
        write_platforms(
            dir.path(),
            json!([
                {"id": "gamma", "name": "Gamma"},
                {"id": "gamma", "name": "Gamma", "rating": 4.0},
                {"id": "tome", "name": "Tome"}
            ]),
        );
        let ctx = context(dir.path());

        let report = find_duplicates(&ctx, Some(PathBuf::from("reports/dupes.json")))
            .await
            .expect("report");
        assert_eq!(report.exact_names.len(), 1);
        assert!(dir.path().join("reports/dupes.json").exists());

        let summary = run_id_dedup(&ctx).await.expect("id dedup");
        assert_eq!(summary.removed, 1);
        assert_eq!(read_platforms(dir.path())[0]["rating"], json!(4.0));
        assert!(dir.path().join("platforms.before-id-dedup.json").exists());
    }

    #[tokio::test]
    async fn validation_lists_issues() {
        let dir = tempdir().expect("tempdir");
        write_platforms(dir.path(), json!([{"id": "a", "name": "A", "url": "https://a.ai"}, {"name": "B"}]));

        let summary = validate(&context(dir.path())).await.expect("validate");
        assert_eq!(summary.total_records, 2);
        assert!(!summary.is_clean());
    }
}
