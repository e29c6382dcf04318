use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use platdir_llm::ChatClient;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::{discover, is_credits_exhausted, DiscoverOptions, OpsContext};

pub const STATE_FILE: &str = ".continuous-discovery-state.json";

/// Counters kept across runs in [`STATE_FILE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousState {
    pub runs_today: u64,
    pub platforms_added_today: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_reset: NaiveDate,
    pub total_runs: u64,
    pub total_platforms_added: u64,
}

impl ContinuousState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            runs_today: 0,
            platforms_added_today: 0,
            last_run: None,
            last_reset: today,
            total_runs: 0,
            total_platforms_added: 0,
        }
    }

    pub async fn load(path: &Path, today: NaiveDate) -> Result<Self> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(today)),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Zeroes the daily counters when the date has moved on. Returns whether it did.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset == today {
            return false;
        }
        info!(
            runs = self.runs_today,
            added = self.platforms_added_today,
            day = %self.last_reset,
            "new day; resetting discovery counters"
        );
        self.runs_today = 0;
        self.platforms_added_today = 0;
        self.last_reset = today;
        true
    }

    pub fn record_run(&mut self, added: u64, at: DateTime<Utc>) {
        self.runs_today += 1;
        self.platforms_added_today += added;
        self.total_runs += 1;
        self.total_platforms_added += added;
        self.last_run = Some(at);
    }
}

#[derive(Debug, Clone)]
pub struct ContinuousOptions {
    pub interval: Duration,
    pub target_per_day: u64,
    pub discover: DiscoverOptions,
    /// Stop after this many runs instead of looping forever.
    pub max_runs: Option<u64>,
}

impl Default for ContinuousOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4 * 3600),
            target_per_day: 3000,
            discover: DiscoverOptions {
                per_batch: 50,
                batches: 10,
                workers: 3,
                ..DiscoverOptions::default()
            },
            max_runs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContinuousSummary {
    pub runs: u64,
    pub added: u64,
    pub interrupted: bool,
    pub state: ContinuousState,
}

/// Time left until 01:00 UTC tomorrow.
fn until_tomorrow(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(1, 0, 0))
        .map(|at| at.and_utc());
    next.and_then(|at| (at - now).to_std().ok())
        .unwrap_or(Duration::from_secs(3600))
}

async fn persist(ctx: &OpsContext, state: &ContinuousState) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    ctx.writer().write_json(STATE_FILE, state).await?;
    Ok(())
}

/// Repeats discovery on an interval until Ctrl-C, `max_runs`, or exhausted credits.
pub async fn run_continuous(
    ctx: &OpsContext,
    client: Arc<dyn ChatClient>,
    options: ContinuousOptions,
) -> Result<ContinuousSummary> {
    let state_path = ctx.config.workspace_root.join(STATE_FILE);
    let mut state = ContinuousState::load(&state_path, Utc::now().date_naive()).await?;
    if state.roll_over(Utc::now().date_naive()) {
        persist(ctx, &state).await?;
    }
    info!(
        target_per_day = options.target_per_day,
        interval_secs = options.interval.as_secs(),
        added_today = state.platforms_added_today,
        total = state.total_platforms_added,
        "continuous discovery started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut runs = 0u64;
    let mut added = 0u64;
    let mut interrupted = false;
    'outer: loop {
        if state.roll_over(Utc::now().date_naive()) {
            persist(ctx, &state).await?;
        }

        let pause = if state.platforms_added_today >= options.target_per_day {
            info!(added_today = state.platforms_added_today, "daily target reached; waiting for tomorrow");
            until_tomorrow(Utc::now())
        } else {
            let run = tokio::select! {
                result = discover(ctx, Arc::clone(&client), options.discover.clone()) => result,
                _ = &mut shutdown => {
                    interrupted = true;
                    break 'outer;
                }
            };
            match run {
                Ok(summary) => {
                    runs += 1;
                    added += summary.added as u64;
                    state.record_run(summary.added as u64, Utc::now());
                    persist(ctx, &state).await?;
                    info!(
                        run = state.total_runs,
                        added = summary.added,
                        added_today = state.platforms_added_today,
                        "discovery run finished"
                    );
                }
                Err(err) if is_credits_exhausted(&err) => {
                    persist(ctx, &state).await?;
                    return Err(err);
                }
                Err(err) => warn!(error = %format!("{err:#}"), "discovery run failed; will retry next interval"),
            }
            if options.max_runs.is_some_and(|max| runs >= max) {
                break;
            }
            options.interval
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        info!(
            runs_today = state.runs_today,
            added_today = state.platforms_added_today,
            total = state.total_platforms_added,
            "stopping continuous discovery"
        );
    }
    Ok(ContinuousSummary {
        runs,
        added,
        interrupted,
        state,
    })
}
