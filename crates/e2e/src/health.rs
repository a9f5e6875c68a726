//! Reachability check for the target application
//!
//! Launching a browser against an origin that is down wastes a full login
//! timeout per suite. The runner checks the base URL first and reports
//! [`E2eError::AppUnreachable`] instead.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// URL that must answer
    pub url: String,
    /// Overall time allowed
    pub timeout: Duration,
    /// Delay between attempts
    pub interval: Duration,
}

impl HealthCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }

    /// Poll until the URL answers with anything other than a server error.
    ///
    /// Client errors (the login redirect answers 3xx/4xx to anonymous
    /// requests in some deployments) still prove the app is up.
    pub async fn wait_until_reachable(&self) -> E2eResult<u32> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match client.get(&self.url).send().await {
                Ok(resp) if !resp.status().is_server_error() => {
                    info!("{} reachable ({})", self.url, resp.status());
                    return Ok(attempts);
                }
                Ok(resp) => {
                    warn!("{} returned {}", self.url, resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} to respond...", self.url);
                    }
                    if !e.is_connect() && !e.is_timeout() {
                        warn!("Reachability check error: {}", e);
                    }
                }
            }

            if start.elapsed() >= self.timeout {
                return Err(E2eError::AppUnreachable {
                    url: self.url.clone(),
                    attempts: attempts as usize,
                });
            }
            sleep(self.interval).await;
        }
    }
}
