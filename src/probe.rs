use log::debug;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Health check against the service's base URL.
#[derive(Clone, Debug)]
pub struct Prober {
    client: Client,
    url: String,
    timeout: Duration,
}

impl Prober {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True only for an HTTP 200 within the timeout. Transport errors,
    /// timeouts and any other status read as "not available".
    pub async fn is_available(&self) -> bool {
        match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                debug!("health check {} returned {}", self.url, status);
                status == StatusCode::OK
            }
            Err(err) => {
                debug!("health check {} failed: {}", self.url, err);
                false
            }
        }
    }

    /// Retries [`is_available`](Self::is_available) with Fibonacci backoff.
    pub async fn wait_until_available(&self, attempts: u32, base: Duration) -> bool {
        for delay in fibonacci_delays(attempts, base) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.is_available().await {
                return true;
            }
        }
        false
    }
}

/// `0, base, base, 2*base, 3*base, ...` trimmed to `count` entries.
fn fibonacci_delays(count: u32, base: Duration) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(count as usize);
    let (mut prev, mut next) = (Duration::ZERO, base);
    for _ in 0..count {
        delays.push(prev);
        let sum = prev + next;
        prev = next;
        next = sum;
    }
    delays
}
