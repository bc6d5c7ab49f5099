use std::future::Future;
use std::time::Duration;

use shelfmark_core::LookupConfig;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{CatalogError, Result};

/// Bounded exponential backoff, applied to `Throttled` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &LookupConfig) -> Self {
        Self {
            max_retries: config.catalog.throttle_retries,
            base_delay: Duration::from_millis(config.catalog.retry_base_delay_ms),
        }
    }

    /// `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Delay before retry number `attempt + 1`, or `None` to give up.
    pub fn retry_delay(&self, err: &CatalogError, attempt: u32) -> Option<Duration> {
        if !matches!(err, CatalogError::Throttled(_)) || attempt >= self.max_retries {
            return None;
        }
        Some(self.delay_for(attempt))
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Err(e) => match self.retry_delay(&e, attempt) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "throttled, backing off"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                ok => return ok,
            }
        }
    }
}
