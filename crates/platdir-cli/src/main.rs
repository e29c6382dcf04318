use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use platdir_content::Publisher;
use platdir_dedup::{check_threshold, ClusterStrategy};
use platdir_llm::{client_for, ApiKeys, ChatClient, ProviderSelection};
use platdir_ops::{
    AffiliateOptions, BlogOptions, ContinuousOptions, DedupOptions, DirectoryConfig, DiscoverOptions, EnrichOptions,
    OpsContext, PillarOptions, RecategorizeOptions, ReviewOptions, UrlCheckOptions, WritingSummary,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status when the AI provider reports exhausted credits or quota.
const EXIT_CREDITS_EXHAUSTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "platdir")]
#[command(about = "Maintain the AI platforms directory")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Path to platforms.json, relative to the workspace.
    #[arg(long, global = true, env = "PLATDIR_PLATFORMS")]
    platforms: Option<PathBuf>,
    /// Directory holding platforms.json, content directories, and reports.
    #[arg(long, global = true, env = "PLATDIR_WORKSPACE")]
    workspace: Option<PathBuf>,
    /// Do everything except write files.
    #[arg(long, global = true)]
    dry_run: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    /// deepseek, claude, gpt, or auto (first provider with a key).
    #[arg(long, global = true, default_value = "auto")]
    provider: ProviderSelection,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Connected,
    Anchor,
}

impl From<Strategy> for ClusterStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Connected => ClusterStrategy::Connected,
            Strategy::Anchor => ClusterStrategy::AnchorSweep,
        }
    }
}

fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value.parse().map_err(|err| format!("{err}"))?;
    check_threshold(threshold).map_err(|err| err.to_string())
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge fuzzy duplicates into their best record.
    Dedup {
        #[arg(long, value_enum, default_value = "connected")]
        strategy: Strategy,
        /// Name similarity threshold in 0..=1; defaults to the rules file.
        #[arg(long, value_parser = parse_threshold)]
        threshold: Option<f64>,
    },
    /// Collapse records sharing an id.
    DedupIds,
    /// Report likely duplicates without changing anything.
    FindDuplicates {
        /// Also write the report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check record shape: ids, names, URLs, ratings.
    Validate,
    /// Probe every platform URL and report dead ones.
    ValidateUrls {
        /// Remove platforms whose URL is gone for good.
        #[arg(long)]
        remove: bool,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
    },
    /// Ask the AI provider for platforms missing from the directory.
    Discover(DiscoverArgs),
    /// Fill in thin listings with AI-researched details.
    Enrich {
        #[arg(long, default_value_t = 20)]
        max: usize,
    },
    /// Move platforms out of generic categories.
    Recategorize {
        #[arg(long, default_value_t = 30)]
        max: usize,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
    },
    /// Research affiliate programs; writes AFFILIATE_OPPORTUNITIES.md.
    Affiliates {
        #[arg(long, default_value_t = 50)]
        max: usize,
        /// Research platforms already checked on an earlier run.
        #[arg(long)]
        recheck: bool,
    },
    /// Have the AI provider judge duplicate candidates; writes organization-report.json.
    ReviewDuplicates {
        #[arg(long, default_value_t = 5)]
        groups: usize,
    },
    /// Run discovery on an interval until the daily target is met.
    Continuous {
        #[arg(long, default_value_t = 4)]
        interval_hours: u64,
        /// Platforms to add per day.
        #[arg(long, default_value_t = 3000)]
        target: u64,
        #[arg(long)]
        max_runs: Option<u64>,
        #[command(flatten)]
        discover: ContinuousDiscoverArgs,
    },
    /// Generate `<a>-vs-<b>` comparison pages.
    Comparisons {
        #[arg(long, default_value_t = 200)]
        target: usize,
    },
    /// Generate `<platform>-alternatives` pages.
    Alternatives {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Generate "best of" list pages.
    BestOf {
        #[arg(long, default_value_t = 300)]
        limit: usize,
    },
    /// Write public/sitemap.xml.
    Sitemap {
        #[arg(long, env = "PLATDIR_SITE_URL")]
        base_url: Option<String>,
    },
    /// Report content pages that link to platform slugs no record has.
    ValidateContentSlugs {
        /// Rewrite stale slugs that have a known replacement.
        #[arg(long)]
        fix: bool,
    },
    /// Write blog posts with the AI provider.
    Blog {
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Custom topic instead of the editorial rotation.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Write "ultimate guide" pillar pages per category.
    Pillar {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    /// Platforms requested per batch.
    #[arg(long = "batch", default_value_t = 100)]
    per_batch: usize,
    #[arg(long, default_value_t = 5)]
    batches: usize,
    /// Batches in flight at once.
    #[arg(long, default_value_t = 3)]
    workers: usize,
}

impl From<DiscoverArgs> for DiscoverOptions {
    fn from(args: DiscoverArgs) -> Self {
        Self {
            per_batch: args.per_batch,
            batches: args.batches,
            workers: args.workers,
            ..Self::default()
        }
    }
}

#[derive(Debug, Args)]
struct ContinuousDiscoverArgs {
    #[arg(long = "batch", default_value_t = 50)]
    per_batch: usize,
    #[arg(long, default_value_t = 10)]
    batches: usize,
    #[arg(long, default_value_t = 3)]
    workers: usize,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn context(global: &GlobalArgs) -> OpsContext {
    let mut config = DirectoryConfig::from_env();
    if let Some(platforms) = &global.platforms {
        config.platforms_path = platforms.clone();
    }
    if let Some(workspace) = &global.workspace {
        config.workspace_root = workspace.clone();
    }
    OpsContext::new(config).dry_run(global.dry_run)
}

fn llm_client(selection: ProviderSelection) -> Result<Arc<dyn ChatClient>> {
    let client = client_for(selection, &ApiKeys::from_env()).context("configuring AI provider")?;
    tracing::info!(provider = %client.provider(), "AI provider selected");
    Ok(Arc::from(client))
}

fn saved_note(saved: bool, dry_run: bool) -> &'static str {
    match (saved, dry_run) {
        (_, true) => " (dry run)",
        (true, false) => "",
        (false, false) => " (unchanged)",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if platdir_ops::is_credits_exhausted(&err) => {
            eprintln!("Error: {err:#}");
            eprintln!("AI provider credits exhausted; progress so far has been saved.");
            ExitCode::from(EXIT_CREDITS_EXHAUSTED)
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = context(&cli.global);
    let dry_run = ctx.dry_run;

    match cli.command {
        Commands::Dedup { strategy, threshold } => {
            let summary = platdir_ops::run_dedup(
                &ctx,
                DedupOptions {
                    strategy: strategy.into(),
                    threshold,
                },
            )
            .await?;
            println!(
                "dedup complete: before={} after={} clusters={} removed={}{}",
                summary.before,
                summary.after,
                summary.clusters,
                summary.removed,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::DedupIds => {
            let summary = platdir_ops::run_id_dedup(&ctx).await?;
            println!(
                "id dedup complete: before={} after={} removed={}{}",
                summary.before,
                summary.after,
                summary.removed,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::FindDuplicates { report } => {
            let report = platdir_ops::find_duplicates(&ctx, report).await?;
            println!(
                "duplicates: records={} exact_names={} shared_domains={} fuzzy_clusters={} redundant={} nameless={}",
                report.total_records,
                report.exact_names.len(),
                report.shared_domains.len(),
                report.fuzzy_clusters.len(),
                report.redundant_records,
                report.nameless.len()
            );
        }
        Commands::Validate => {
            let summary = platdir_ops::validate(&ctx).await?;
            for issue in &summary.issues {
                println!("{}", serde_json::to_string(issue)?);
            }
            println!(
                "validation: records={} issues={}",
                summary.total_records,
                summary.issues.len()
            );
        }
        Commands::ValidateUrls {
            remove,
            max,
            concurrency,
        } => {
            let summary = platdir_ops::validate_urls(
                &ctx,
                UrlCheckOptions {
                    remove,
                    max,
                    concurrency,
                },
            )
            .await?;
            let counts = summary
                .report
                .counts
                .iter()
                .map(|(status, n)| format!("{status}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "url check: checked={} {} removable={} redirects={} removed={}",
                summary.report.total_checked,
                counts,
                summary.report.platforms_to_remove.len(),
                summary.report.suspicious_redirects.len(),
                summary.removed
            );
        }
        Commands::Discover(args) => {
            let client = llm_client(cli.global.provider)?;
            let summary = platdir_ops::discover(&ctx, client, args.into()).await?;
            println!(
                "discovery complete: proposed={} duplicates={} added={} total={} with_affiliates={}{}",
                summary.proposed,
                summary.duplicates,
                summary.added,
                summary.final_count,
                summary.with_affiliates,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::Enrich { max } => {
            let client = llm_client(cli.global.provider)?;
            let summary = platdir_ops::enrich(
                &ctx,
                client.as_ref(),
                EnrichOptions {
                    max,
                    ..EnrichOptions::default()
                },
            )
            .await?;
            println!(
                "enrichment complete: candidates={} enriched={} low_confidence={} no_answer={}{}",
                summary.candidates,
                summary.enriched,
                summary.low_confidence,
                summary.no_answer,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::Recategorize { max, batch_size } => {
            let client = llm_client(cli.global.provider)?;
            let summary = platdir_ops::recategorize(
                &ctx,
                client.as_ref(),
                RecategorizeOptions {
                    max,
                    batch_size,
                    ..RecategorizeOptions::default()
                },
            )
            .await?;
            println!(
                "recategorization complete: checked={} reviewed={} moved={}{}",
                summary.checked,
                summary.reviewed,
                summary.moved,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::Affiliates { max, recheck } => {
            let client = llm_client(cli.global.provider)?;
            let summary = platdir_ops::hunt_affiliates(
                &ctx,
                client.as_ref(),
                AffiliateOptions {
                    max,
                    recheck,
                    ..AffiliateOptions::default()
                },
            )
            .await?;
            println!(
                "affiliate research: candidates={} researched={} programs={} high_value={} low_confidence={}{}",
                summary.candidates,
                summary.researched,
                summary.confirmed,
                summary.high_value,
                summary.low_confidence,
                saved_note(summary.saved.is_some(), dry_run)
            );
        }
        Commands::ReviewDuplicates { groups } => {
            let client = llm_client(cli.global.provider)?;
            let summary = platdir_ops::review_duplicates(&ctx, client.as_ref(), ReviewOptions { groups }).await?;
            println!(
                "duplicate review: candidate_groups={} reviewed={} report={}",
                summary.report.candidate_groups,
                summary.report.reviewed.len(),
                summary
                    .report_path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Commands::Continuous {
            interval_hours,
            target,
            max_runs,
            discover,
        } => {
            let client = llm_client(cli.global.provider)?;
            let options = ContinuousOptions {
                interval: Duration::from_secs(interval_hours * 3600),
                target_per_day: target,
                discover: DiscoverOptions {
                    per_batch: discover.per_batch,
                    batches: discover.batches,
                    workers: discover.workers,
                    ..DiscoverOptions::default()
                },
                max_runs,
            };
            let summary = platdir_ops::run_continuous(&ctx, client, options).await?;
            println!(
                "continuous discovery stopped: runs={} added={} added_today={} total_added={}{}",
                summary.runs,
                summary.added,
                summary.state.platforms_added_today,
                summary.state.total_platforms_added,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
        }
        Commands::Comparisons { target } => {
            let (_, records) = ctx.open_store().await?;
            let summary = platdir_content::generate_comparisons(&records, &publisher(&ctx), target).await?;
            print_generation(&summary);
        }
        Commands::Alternatives { limit } => {
            let (_, records) = ctx.open_store().await?;
            let summary = platdir_content::generate_alternatives(&records, &publisher(&ctx), limit).await?;
            print_generation(&summary);
        }
        Commands::BestOf { limit } => {
            let (_, records) = ctx.open_store().await?;
            let summary = platdir_content::generate_best_of(&records, &publisher(&ctx), limit).await?;
            print_generation(&summary);
        }
        Commands::Sitemap { base_url } => {
            let (_, records) = ctx.open_store().await?;
            let base_url = base_url.unwrap_or_else(|| ctx.config.site_url.clone());
            let summary = platdir_content::generate_sitemap(
                &records,
                &publisher(&ctx),
                &base_url,
                chrono::Utc::now().date_naive(),
            )
            .await?;
            println!(
                "sitemap: urls={} path={}",
                summary.urls,
                summary
                    .written
                    .map(|w| w.path.display().to_string())
                    .unwrap_or_else(|| "(dry run)".to_string())
            );
        }
        Commands::ValidateContentSlugs { fix } => {
            let (_, records) = ctx.open_store().await?;
            let corrections = ctx.load_rules()?.slug_corrections;
            let summary =
                platdir_content::validate_content_slugs(&records, &publisher(&ctx), &corrections, fix).await?;
            for missing in &summary.missing {
                println!("{}", serde_json::to_string(missing)?);
            }
            println!(
                "content slugs: pages={} references={} missing={} unresolved={} unreadable={} fixed_pages={}{}",
                summary.pages,
                summary.references,
                summary.missing.len(),
                summary.unresolved(),
                summary.unreadable.len(),
                summary.pages_fixed,
                if dry_run && fix { " (dry run)" } else { "" }
            );
        }
        Commands::Blog { count, topic } => {
            let client = llm_client(cli.global.provider)?;
            let options = BlogOptions {
                count,
                topic,
                ..BlogOptions::default()
            };
            let summary = platdir_ops::write_blog_posts(&ctx, client.as_ref(), options).await?;
            print_writing(&summary, dry_run);
        }
        Commands::Pillar { category, overwrite } => {
            let client = llm_client(cli.global.provider)?;
            let options = PillarOptions {
                category,
                overwrite,
                ..PillarOptions::default()
            };
            let summary = platdir_ops::write_pillar_guides(&ctx, client.as_ref(), options).await?;
            print_writing(&summary, dry_run);
        }
    }

    Ok(())
}

fn publisher(ctx: &OpsContext) -> Publisher {
    Publisher::new(ctx.writer()).dry_run(ctx.dry_run)
}

fn print_generation(summary: &platdir_content::GenerationSummary) {
    for (i, title) in summary.titles.iter().enumerate() {
        println!("{:>4}. {title}", i + 1);
    }
    println!(
        "{}: generated={} created={} updated={} unchanged={}",
        summary.dir,
        summary.generated(),
        summary.created,
        summary.updated,
        summary.unchanged
    );
}

fn print_writing(summary: &WritingSummary, dry_run: bool) {
    for slug in &summary.written {
        println!("{}/{slug}.json", summary.dir);
    }
    println!(
        "{}: written={} existing={} no_answer={}{}",
        summary.dir,
        summary.written.len(),
        summary.existing,
        summary.no_answer,
        saved_note(!summary.written.is_empty(), dry_run)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_must_be_a_fraction() {
        assert_eq!(parse_threshold("0.85"), Ok(0.85));
        assert_eq!(parse_threshold("1"), Ok(1.0));
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("-0.1").is_err());
        assert!(parse_threshold("NaN").is_err());
        assert!(parse_threshold("high").is_err());
    }

    #[test]
    fn dedup_rejects_out_of_range_threshold_at_parse_time() {
        assert!(Cli::try_parse_from(["platdir", "dedup", "--threshold", "1.5"]).is_err());
        let cli = Cli::try_parse_from(["platdir", "dedup", "--threshold", "0.9"]).expect("parse");
        assert!(matches!(cli.command, Commands::Dedup { threshold: Some(t), .. } if t == 0.9));
    }

    #[test]
    fn new_subcommands_parse() {
        let cli = Cli::try_parse_from(["platdir", "validate-content-slugs", "--fix"]).expect("slugs");
        assert!(matches!(cli.command, Commands::ValidateContentSlugs { fix: true }));
        let cli = Cli::try_parse_from(["platdir", "blog", "--count", "2", "--topic", "Voice AI"]).expect("blog");
        assert!(matches!(cli.command, Commands::Blog { count: 2, topic: Some(_) }));
        let cli = Cli::try_parse_from(["platdir", "--dry-run", "affiliates", "--max", "5"]).expect("affiliates");
        assert!(cli.global.dry_run);
        assert!(matches!(cli.command, Commands::Affiliates { max: 5, recheck: false }));
    }
}
