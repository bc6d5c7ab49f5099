use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{CatalogError, Result};

pub const USER_AGENT: &str = concat!("shelfmark/", env!("CARGO_PKG_VERSION"));

// ─── RateLimiter ──────────────────────────────────────────────────────────────

/// Minimum spacing between calls, derived from a max-queries-per-second ceiling.
///
/// Clones share the same last-call timestamp, so every handle issued from one
/// client throttles against the same clock.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Option<Duration>,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// `max_qps <= 0` (or non-finite) disables throttling.
    pub fn new(max_qps: f64) -> Self {
        let min_interval = (max_qps.is_finite() && max_qps > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / max_qps));
        Self {
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Wait until the next call is permitted, then record it.
    pub async fn throttle(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let mut last = self.last_call.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limiter: waiting");
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// Status and decoded body of one GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

pub struct RateLimitedClient {
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl RateLimitedClient {
    pub fn new(limiter: RateLimiter, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, limiter })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// One GET. The caller throttles through [`Self::limiter`] first and owns
    /// retry policy.
    pub async fn fetch(&self, url: &str) -> Result<HttpResponse> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }

    /// Unthrottled binary fetch, for cover images hosted off the catalog API.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}
