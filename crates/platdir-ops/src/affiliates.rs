//! Affiliate programme research across the directory.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use platdir_core::PlatformRecord;
use platdir_llm::tasks::{research_affiliate_program, AffiliateProgram};
use platdir_llm::{ChatClient, ConfidenceGate, LlmError};
use platdir_storage::SaveReport;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, info_span, Instrument};

use crate::OpsContext;

pub const AFFILIATE_RESULTS: &str = "affiliate-opportunities.json";
pub const AFFILIATE_REPORT: &str = "AFFILIATE_OPPORTUNITIES.md";
const CHECKED_KEY: &str = "affiliate_checked_at";

#[derive(Debug, Clone)]
pub struct AffiliateOptions {
    pub max: usize,
    /// Programmes below this confidence are reported but not written to records.
    pub gate: ConfidenceGate,
    /// Also research platforms checked on an earlier run.
    pub recheck: bool,
}

impl Default for AffiliateOptions {
    fn default() -> Self {
        Self {
            max: 50,
            gate: ConfidenceGate::above(0.5),
            recheck: false,
        }
    }
}

/// One researched platform, as written to [`AFFILIATE_RESULTS`].
#[derive(Debug, Clone, Serialize)]
pub struct AffiliateFinding {
    pub platform_id: String,
    pub platform_name: String,
    pub platform_url: String,
    pub category: Option<String>,
    pub confirmed: bool,
    #[serde(flatten)]
    pub program: AffiliateProgram,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AffiliateSummary {
    pub candidates: usize,
    pub researched: usize,
    pub confirmed: usize,
    pub high_value: usize,
    pub low_confidence: usize,
    pub no_program: usize,
    pub no_answer: usize,
    pub saved: Option<SaveReport>,
    pub report: Option<PathBuf>,
}

/// Positions worth researching: named platforms with a URL, featured first,
/// then by rating. Platforms already checked are skipped unless `recheck`.
pub fn affiliate_candidates(records: &[PlatformRecord], recheck: bool) -> Vec<usize> {
    let mut candidates: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.name().is_some() && r.identity_url().is_some())
        .filter(|(_, r)| recheck || !r.has_extra(CHECKED_KEY))
        .map(|(index, _)| index)
        .collect();
    candidates.sort_by(|&a, &b| {
        let (a, b) = (&records[a], &records[b]);
        b.is_featured()
            .cmp(&a.is_featured())
            .then_with(|| b.rating_or_zero().total_cmp(&a.rating_or_zero()))
    });
    candidates
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.trim().is_empty()).unwrap_or("unknown")
}

fn render_report(findings: &[AffiliateFinding]) -> String {
    let confirmed: Vec<&AffiliateFinding> = findings.iter().filter(|f| f.confirmed).collect();
    let (high, other): (Vec<&AffiliateFinding>, Vec<&AffiliateFinding>) =
        confirmed.iter().copied().partition(|f| f.program.is_high_value());

    let mut out = String::from("# Affiliate Program Opportunities\n\n");
    let _ = writeln!(out, "Generated: {}\n", Utc::now().format("%Y-%m-%d"));
    out.push_str("## Summary\n\n");
    let _ = writeln!(out, "- Total platforms scanned: **{}**", findings.len());
    let _ = writeln!(out, "- Affiliate programs found: **{}**", confirmed.len());
    let _ = writeln!(out, "- High-value opportunities: **{}**\n", high.len());

    out.push_str("## High-Value Opportunities\n\n");
    for finding in &high {
        let program = &finding.program;
        let _ = writeln!(out, "### {}\n", finding.platform_name);
        let _ = writeln!(out, "- **Category**: {}", finding.category.as_deref().unwrap_or("uncategorized"));
        let _ = writeln!(out, "- **Commission**: {}", or_unknown(&program.commission_rate));
        let _ = writeln!(out, "- **Network**: {}", or_unknown(&program.network));
        let _ = writeln!(out, "- **Cookie Duration**: {}", or_unknown(&program.cookie_duration));
        if let Some(url) = program.program_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let _ = writeln!(out, "- **Program URL**: {url}");
        }
        let _ = writeln!(out, "- **Revenue Potential**: {}", or_unknown(&program.revenue_potential));
        if let Some(notes) = program.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = writeln!(out, "- **Notes**: {notes}");
        }
        out.push('\n');
    }

    if !other.is_empty() {
        out.push_str("## Other Programs\n\n");
        for finding in &other {
            let _ = writeln!(
                out,
                "- **{}**: {} via {} ({})",
                finding.platform_name,
                or_unknown(&finding.program.commission_rate),
                or_unknown(&finding.program.network),
                or_unknown(&finding.program.revenue_potential)
            );
        }
        out.push('\n');
    }
    out
}

fn program_summary(program: &AffiliateProgram) -> JsonValue {
    json!({
        "type": program.program_type,
        "commission": program.commission_rate,
        "network": program.network,
        "url": program.program_url,
    })
}

/// Asks the model about affiliate programmes, marks confident finds on the
/// records (`has_affiliate`, `affiliate_program`), and writes the results file
/// and markdown report.
pub async fn hunt_affiliates(
    ctx: &OpsContext,
    client: &dyn ChatClient,
    options: AffiliateOptions,
) -> Result<AffiliateSummary> {
    async {
        let (store, mut records) = ctx.open_store().await?;
        let mut targets = affiliate_candidates(&records, options.recheck);
        targets.truncate(options.max);
        info!(candidates = targets.len(), max = options.max, "researching affiliate programs");

        let mut summary = AffiliateSummary {
            candidates: targets.len(),
            ..AffiliateSummary::default()
        };
        let mut findings: Vec<AffiliateFinding> = Vec::new();
        let mut stopped: Option<LlmError> = None;
        for (n, &index) in targets.iter().enumerate() {
            if n > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            let program = match research_affiliate_program(client, &records[index]).await {
                Ok(Some(program)) => program,
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
            summary.researched += 1;
            record
                .extra
                .insert(CHECKED_KEY.to_string(), JsonValue::String(Utc::now().to_rfc3339()));
            let confirmed = program.has_program && options.gate.passes(program.confidence);
            if confirmed {
                summary.confirmed += 1;
                if program.is_high_value() {
                    summary.high_value += 1;
                }
                record.extra.insert("has_affiliate".to_string(), JsonValue::Bool(true));
                record.extra.insert("affiliate_program".to_string(), program_summary(&program));
                info!(
                    name = ?record.name(),
                    kind = ?program.program_type,
                    commission = ?program.commission_rate,
                    "affiliate program found"
                );
            } else if program.has_program {
                summary.low_confidence += 1;
                debug!(name = ?record.name(), confidence = program.confidence, "affiliate program below threshold");
            } else {
                summary.no_program += 1;
            }

            findings.push(AffiliateFinding {
                platform_id: record.id.clone(),
                platform_name: record.name().unwrap_or(&record.id).to_string(),
                platform_url: record.identity_url().unwrap_or_default().to_string(),
                category: record.category().map(str::to_string),
                confirmed,
                program,
            });
        }

        if summary.researched > 0 {
            summary.saved = ctx.save(&store, &records, "affiliates").await?;
            if !ctx.dry_run {
                let writer = ctx.writer();
                writer.write_json(AFFILIATE_RESULTS, &findings).await?;
                summary.report = Some(writer.write_text(AFFILIATE_REPORT, &render_report(&findings)).await?.path);
            }
        }
        if let Some(err) = stopped {
            return Err(err).context(format!("affiliate research stopped after {} platforms", summary.researched));
        }
        info!(
            researched = summary.researched,
            confirmed = summary.confirmed,
            high_value = summary.high_value,
            "affiliate research complete"
        );
        Ok(summary)
    }
    .instrument(info_span!("affiliates"))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_credits_exhausted;
    use crate::testing::{context, read_platforms, write_platforms, ScriptedClient};
    use tempfile::tempdir;

    #[test]
    fn featured_and_rated_platforms_come_first() {
        let records: Vec<PlatformRecord> = serde_json::from_value(json!([
            {"id": "plain", "name": "Plain", "url": "https://plain.ai", "rating": 4.0},
            {"id": "nourl", "name": "No URL", "featured": true},
            {"id": "top", "name": "Top", "url": "https://top.ai", "rating": 4.9},
            {"id": "feat", "name": "Featured", "url": "https://feat.ai", "featured": true},
            {"id": "done", "name": "Done", "url": "https://done.ai", "affiliate_checked_at": "2026-01-01T00:00:00Z"}
        ]))
        .expect("decode");

        let order: Vec<&str> = affiliate_candidates(&records, false)
            .into_iter()
            .map(|i| records[i].id.as_str())
            .collect();
        assert_eq!(order, vec!["feat", "top", "plain"]);
        assert_eq!(affiliate_candidates(&records, true).len(), 4);
    }

    #[tokio::test]
    async fn confident_programs_are_recorded_and_reported() {
        let dir = tempdir().expect("tempdir");
        write_platforms(
            dir.path(),
            json!([
                {"id": "jasper", "name": "Jasper", "url": "https://jasper.ai", "category": "writing-ai", "rating": 4.6},
                {"id": "tiny", "name": "Tiny", "url": "https://tiny.ai", "rating": 3.0},
                {"id": "open", "name": "Open", "url": "https://open.ai", "rating": 2.0}
            ]),
        );
        let client = ScriptedClient::new(vec![
            Ok(json!({
                "has_program": true,
                "program_type": "affiliate",
                "commission_rate": "30% recurring",
                "network": "PartnerStack",
                "revenue_potential": "high",
                "confidence": 0.9
            })
            .to_string()),
            Ok(json!({"has_program": true, "commission_rate": "10%", "confidence": 0.3}).to_string()),
            Ok(json!({"has_program": false, "confidence": 0.8}).to_string()),
        ]);

        let summary = hunt_affiliates(&context(dir.path()), &client, AffiliateOptions::default())
            .await
            .expect("hunt");
        assert_eq!(
            (summary.researched, summary.confirmed, summary.high_value, summary.low_confidence, summary.no_program),
            (3, 1, 1, 1, 1)
        );

        let saved = read_platforms(dir.path());
        assert_eq!(saved[0]["has_affiliate"], json!(true));
        assert_eq!(saved[0]["affiliate_program"]["network"], json!("PartnerStack"));
        assert!(saved[1].get("has_affiliate").is_none());
        assert!(saved[2]["affiliate_checked_at"].is_string());

        let report = std::fs::read_to_string(dir.path().join(AFFILIATE_REPORT)).expect("report");
        assert!(report.contains("- Affiliate programs found: **1**"));
        assert!(report.contains("### Jasper"));
        assert!(!report.contains("### Tiny"));
        let results: JsonValue =
            serde_json::from_slice(&std::fs::read(dir.path().join(AFFILIATE_RESULTS)).expect("results")).expect("json");
        assert_eq!(results.as_array().map(Vec::len), Some(3));
        assert_eq!(results[0]["commission_rate"], json!("30% recurring"));

        let again = hunt_affiliates(&context(dir.path()), &client, AffiliateOptions::default())
            .await
            .expect("rerun");
        assert_eq!(again.candidates, 0);
    }

    #[tokio::test]
    async fn exhausted_credits_keep_earlier_finds() {
        let dir = tempdir().expect("tempdir");
        write_platforms(
            dir.path(),
            json!([
                {"id": "a", "name": "Alpha", "url": "https://alpha.ai", "rating": 5.0},
                {"id": "b", "name": "Beta", "url": "https://beta.ai"}
            ]),
        );
        let client = ScriptedClient::new(vec![
            Ok(json!({"has_program": false, "confidence": 0.9}).to_string()),
            Err(LlmError::CreditsExhausted("402".into())),
        ]);

        let err = hunt_affiliates(&context(dir.path()), &client, AffiliateOptions::default())
            .await
            .expect_err("credits");
        assert!(is_credits_exhausted(&err));
        assert!(read_platforms(dir.path())[0]["affiliate_checked_at"].is_string());
    }
}
