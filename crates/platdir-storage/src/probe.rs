use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use platdir_core::domain_of;
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Substrings of a final URL that mean the domain is parked or for sale.
pub const PARKED_INDICATORS: &[&str] = &[
    "domain-for-sale",
    "parked-domain",
    "this-domain-is-for-sale",
    "godaddy.com/parking",
    "afternic.com",
    "sedo.com/search",
    "hugedomains.com",
    "dan.com",
];

/// How often a transient outcome is probed again before it is reported.
#[derive(Debug, Clone, Copy)]
pub struct Rechecks {
    pub max: usize,
    /// Wait before the first recheck; doubles for each later one, up to 16x.
    pub pause: Duration,
}

impl Default for Rechecks {
    fn default() -> Self {
        Self {
            max: 1,
            pause: Duration::from_millis(500),
        }
    }
}

impl Rechecks {
    pub fn pause_before(&self, recheck: usize) -> Duration {
        self.pause.saturating_mul(1 << recheck.min(4))
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub concurrency: usize,
    pub rechecks: Rechecks,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            concurrency: 10,
            rechecks: Rechecks::default(),
        }
    }
}

/// Result of checking one platform URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Alive { http_status: u16, final_url: String },
    Dead { http_status: u16 },
    ClientError { http_status: u16 },
    ServerError { http_status: u16 },
    /// 429; the site is up but throttling us.
    RateLimited { http_status: u16 },
    Parked { http_status: u16, final_url: String },
    /// Ended up on an unrelated host.
    Redirected { http_status: u16, final_url: String },
    Timeout,
    DnsError,
    ConnectionRefused,
    MissingUrl,
    Error { message: String },
}

impl ProbeOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Alive { .. } => "alive",
            Self::Dead { .. } => "dead",
            Self::ClientError { .. } => "client_error",
            Self::ServerError { .. } => "server_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Parked { .. } => "parked",
            Self::Redirected { .. } => "redirected",
            Self::Timeout => "timeout",
            Self::DnsError => "dns_error",
            Self::ConnectionRefused => "connection_refused",
            Self::MissingUrl => "missing_url",
            Self::Error { .. } => "error",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Alive { http_status, .. } => format!("ok ({http_status})"),
            Self::Dead { .. } => "page not found".to_string(),
            Self::ClientError { http_status } => format!("client error ({http_status})"),
            Self::ServerError { http_status } => format!("server error ({http_status})"),
            Self::RateLimited { http_status } => format!("rate limited ({http_status})"),
            Self::Parked { .. } => "domain is parked or for sale".to_string(),
            Self::Redirected { final_url, .. } => format!("redirects to {final_url}"),
            Self::Timeout => "request timeout".to_string(),
            Self::DnsError => "domain not found (DNS)".to_string(),
            Self::ConnectionRefused => "connection refused".to_string(),
            Self::MissingUrl => "no URL provided".to_string(),
            Self::Error { message } => message.clone(),
        }
    }

    /// Outcomes that mark a listing as dead for good.
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            Self::Dead { .. }
                | Self::ClientError { .. }
                | Self::Parked { .. }
                | Self::DnsError
                | Self::ConnectionRefused
        )
    }

    /// Outcomes that may read differently a moment later. Parked and
    /// off-site redirects are settled by where the request landed, whatever
    /// the status; refused and unresolvable hosts will not recover within a run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerError { .. } | Self::RateLimited { .. })
    }

    fn from_response(original_url: &str, status: StatusCode, final_url: String) -> Self {
        let http_status = status.as_u16();
        let lowered = final_url.to_ascii_lowercase();
        if PARKED_INDICATORS.iter().any(|needle| lowered.contains(needle)) {
            return Self::Parked { http_status, final_url };
        }

        if let (Some(original), Some(landed)) = (domain_of(original_url), domain_of(&final_url)) {
            let first_label = original.split('.').next().unwrap_or_default();
            if original != landed && !landed.contains(first_label) {
                return Self::Redirected { http_status, final_url };
            }
        }

        match http_status {
            404 => Self::Dead { http_status },
            429 => Self::RateLimited { http_status },
            500..=u16::MAX => Self::ServerError { http_status },
            400..=499 => Self::ClientError { http_status },
            _ => Self::Alive { http_status, final_url },
        }
    }

    fn from_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }

        let mut chain = err.to_string();
        let mut refused = false;
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                refused |= io.kind() == std::io::ErrorKind::ConnectionRefused;
            }
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        let lowered = chain.to_ascii_lowercase();

        if refused || lowered.contains("connection refused") {
            Self::ConnectionRefused
        } else if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            Self::DnsError
        } else {
            Self::Error { message: chain }
        }
    }
}

/// Bare hosts (`httpie.io`, `openai.com/api`) are checked over https.
fn request_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// HEAD-checks platform URLs under a global concurrency limit.
#[derive(Debug, Clone)]
pub struct UrlProber {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    rechecks: Rechecks,
}

impl UrlProber {
    pub fn new(config: ProbeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .redirect(Policy::limited(10))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            rechecks: config.rechecks,
        })
    }

    pub async fn probe(&self, url: Option<&str>) -> ProbeOutcome {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return ProbeOutcome::MissingUrl;
        };
        let target = request_url(url);

        let _permit = self.limit.acquire().await.expect("semaphore not closed");
        let outcome = self
            .probe_with_retries(&target)
            .instrument(info_span!("url_probe", url = %target))
            .await;
        debug!(url = %target, status = outcome.status(), "probed");
        outcome
    }

    async fn probe_with_retries(&self, url: &str) -> ProbeOutcome {
        let mut recheck = 0;
        loop {
            let outcome = self.probe_once(url).await;
            if !outcome.is_transient() || recheck >= self.rechecks.max {
                return outcome;
            }
            debug!(status = outcome.status(), recheck, "transient outcome; probing again");
            tokio::time::sleep(self.rechecks.pause_before(recheck)).await;
            recheck += 1;
        }
    }

    async fn probe_once(&self, url: &str) -> ProbeOutcome {
        let response = match self.request(Method::HEAD, url).await {
            // Some hosts refuse HEAD outright; ask again with GET before judging them.
            Ok(resp) if matches!(resp.status(), StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED) => {
                self.request(Method::GET, url).await
            }
            other => other,
        };
        match response {
            Ok(resp) => ProbeOutcome::from_response(url, resp.status(), resp.url().to_string()),
            Err(err) => ProbeOutcome::from_error(&err),
        }
    }

    async fn request(&self, method: Method, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client.request(method, url).send().await
    }

    /// Probes every `(key, url)` pair concurrently; results come back in input order.
    pub async fn probe_all<K>(&self, targets: Vec<(K, Option<String>)>) -> Vec<(K, ProbeOutcome)>
    where
        K: Send + 'static,
    {
        let total = targets.len();
        let mut set = JoinSet::new();
        for (position, (key, url)) in targets.into_iter().enumerate() {
            let prober = self.clone();
            set.spawn(async move {
                let outcome = prober.probe(url.as_deref()).await;
                (position, key, outcome)
            });
        }

        let mut slots: Vec<Option<(K, ProbeOutcome)>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, key, outcome)) => {
                    slots[position] = Some((key, outcome));
                    done += 1;
                    if done % 50 == 0 {
                        info!(done, total, "url probes completed");
                    }
                }
                Err(err) => warn!(error = %err, "url probe task failed"),
            }
        }
        slots.into_iter().flatten().collect()
    }
}
