use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use platdir_storage::{ProbeConfig, ProbeOutcome, SaveReport, UrlProber};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::OpsContext;

pub const DEAD_URLS_REPORT: &str = "DEAD_URLS_REPORT.json";

#[derive(Debug, Clone)]
pub struct UrlCheckOptions {
    /// Drop records whose URL is dead for good.
    pub remove: bool,
    /// Only check the first N records.
    pub max: Option<usize>,
    pub concurrency: usize,
}

impl Default for UrlCheckOptions {
    fn default() -> Self {
        Self {
            remove: false,
            max: None,
            concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalCandidate {
    pub name: String,
    pub url: Option<String>,
    pub reason: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousRedirect {
    pub name: String,
    pub original_url: Option<String>,
    pub final_url: String,
}

/// Contents of `DEAD_URLS_REPORT.json`.
#[derive(Debug, Clone, Serialize)]
pub struct UrlCheckReport {
    pub checked_at: DateTime<Utc>,
    pub total_checked: usize,
    pub counts: BTreeMap<&'static str, usize>,
    pub platforms_to_remove: Vec<RemovalCandidate>,
    pub suspicious_redirects: Vec<SuspiciousRedirect>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlCheckSummary {
    pub report: UrlCheckReport,
    pub removed: usize,
    pub saved: Option<SaveReport>,
}

pub async fn validate_urls(ctx: &OpsContext, options: UrlCheckOptions) -> Result<UrlCheckSummary> {
    async {
        let (store, records) = ctx.open_store().await?;
        let prober = UrlProber::new(ProbeConfig {
            timeout: Duration::from_secs(ctx.config.http_timeout_secs),
            user_agent: ctx.config.user_agent.clone(),
            concurrency: options.concurrency,
            ..ProbeConfig::default()
        })?;

        let limit = options.max.unwrap_or(records.len()).min(records.len());
        let targets: Vec<(usize, Option<String>)> = records[..limit]
            .iter()
            .enumerate()
            .map(|(index, record)| (index, record.identity_url().map(str::to_string)))
            .collect();
        info!(checking = limit, total = records.len(), concurrency = options.concurrency, "checking platform URLs");
        let outcomes = prober.probe_all(targets).await;

        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut platforms_to_remove = Vec::new();
        let mut suspicious_redirects = Vec::new();
        let mut doomed = BTreeSet::new();
        for (index, outcome) in &outcomes {
            let record = &records[*index];
            let name = record.name().unwrap_or(&record.id).to_string();
            *counts.entry(outcome.status()).or_default() += 1;
            match outcome {
                ProbeOutcome::Redirected { final_url, .. } => suspicious_redirects.push(SuspiciousRedirect {
                    name,
                    original_url: record.identity_url().map(str::to_string),
                    final_url: final_url.clone(),
                }),
                outcome if outcome.is_removable() => {
                    warn!(name = %name, status = outcome.status(), "dead platform URL");
                    doomed.insert(*index);
                    platforms_to_remove.push(RemovalCandidate {
                        name,
                        url: record.identity_url().map(str::to_string),
                        reason: outcome.status(),
                        error: outcome.describe(),
                    });
                }
                _ => {}
            }
        }

        let report = UrlCheckReport {
            checked_at: Utc::now(),
            total_checked: outcomes.len(),
            counts,
            platforms_to_remove,
            suspicious_redirects,
        };
        info!(
            checked = report.total_checked,
            removable = report.platforms_to_remove.len(),
            redirects = report.suspicious_redirects.len(),
            "URL check complete"
        );

        if ctx.dry_run {
            info!("dry run; URL report not written");
        } else {
            ctx.writer().write_json(DEAD_URLS_REPORT, &report).await?;
        }

        let mut removed = 0;
        let mut saved = None;
        if options.remove && !doomed.is_empty() {
            let kept: Vec<_> = records
                .into_iter()
                .enumerate()
                .filter(|(index, _)| !doomed.contains(index))
                .map(|(_, record)| record)
                .collect();
            removed = doomed.len();
            saved = ctx.save(&store, &kept, "url-cleanup").await?;
        }

        Ok(UrlCheckSummary { report, removed, saved })
    }
    .instrument(info_span!("validate_urls"))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, read_platforms, write_platforms};
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reports_and_removes_dead_listings() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/alive"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        write_platforms(
            dir.path(),
            json!([
                {"id": "alive", "name": "Alive", "url": format!("{}/alive", server.uri())},
                {"id": "gone", "name": "Gone", "url": format!("{}/gone", server.uri())},
                {"id": "unchecked", "name": "Unchecked", "url": format!("{}/gone", server.uri())}
            ]),
        );
        let ctx = context(dir.path());

        let summary = validate_urls(
            &ctx,
            UrlCheckOptions {
                remove: true,
                max: Some(2),
                concurrency: 2,
            },
        )
        .await
        .expect("validate urls");

        assert_eq!(summary.report.total_checked, 2);
        assert_eq!(summary.report.counts.get("alive"), Some(&1));
        assert_eq!(summary.report.platforms_to_remove[0].name, "Gone");
        assert_eq!(summary.report.platforms_to_remove[0].reason, "dead");
        assert_eq!(summary.removed, 1);

        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(DEAD_URLS_REPORT)).expect("report")).expect("json");
        assert_eq!(report["total_checked"], json!(2));

        let ids: Vec<_> = read_platforms(dir.path())
            .as_array()
            .expect("array")
            .iter()
            .map(|r| r["id"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["alive", "unchecked"]);
        assert!(dir.path().join("platforms.before-url-cleanup.json").exists());
    }

    #[tokio::test]
    async fn report_only_by_default() {
        let dir = tempdir().expect("tempdir");
        write_platforms(dir.path(), json!([{"id": "nourl", "name": "No URL"}]));
        let ctx = context(dir.path());

        let summary = validate_urls(&ctx, UrlCheckOptions::default()).await.expect("validate urls");
        assert_eq!(summary.report.counts.get("missing_url"), Some(&1));
        assert_eq!(summary.removed, 0);
        assert!(summary.saved.is_none());
    }
}
