//! Health gate
//!
//! Polls `GET {base}/healthcheck` on each endpoint, one endpoint after the
//! other, until it answers with the expected status or its deadline passes.
//! Only the error kinds listed in the [`RetryPolicy`] count as "not ready
//! yet"; anything else aborts the gate immediately.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// An HTTP service that must report healthy before clients run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEndpoint {
    /// e.g. `http://localhost:8000`
    pub base_url: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_expected_status() -> u16 {
    200
}

impl HealthEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            expected_status: default_expected_status(),
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new(format!("http://localhost:{}", port))
    }

    pub fn probe_url(&self) -> String {
        format!("{}/healthcheck", self.base_url.trim_end_matches('/'))
    }
}

/// Probe failures that may resolve on their own while a service boots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// Connection refused or host unreachable
    Connect,
    /// No response within the probe timeout
    Timeout,
    /// Connection dropped while the request was in flight
    Interrupted,
    /// The service answered with another status than expected
    Status,
}

/// Deadline, pacing and retryable failures for one gate
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline per endpoint
    pub timeout: Duration,
    /// Fixed sleep between probes
    pub interval: Duration,
    /// Budget for a single probe request
    pub probe_timeout: Duration,
    pub transient: Vec<TransientKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// Policy retrying every [`TransientKind`]; a probe may take one interval
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            probe_timeout: interval,
            transient: vec![
                TransientKind::Connect,
                TransientKind::Timeout,
                TransientKind::Interrupted,
                TransientKind::Status,
            ],
        }
    }

    pub fn is_transient(&self, kind: TransientKind) -> bool {
        self.transient.contains(&kind)
    }
}

#[derive(Debug)]
enum ProbeFailure {
    Transient(TransientKind, String),
    Fatal(String),
}

/// Polls health endpoints with a fixed policy
pub struct HealthGate {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HealthGate {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.probe_timeout)
            .user_agent("sanity-checks")
            .no_proxy()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait for every endpoint, in declaration order
    ///
    /// The first endpoint that fails stops the gate; later endpoints are not
    /// probed.
    pub async fn wait_all(&self, endpoints: &[HealthEndpoint]) -> Result<()> {
        for endpoint in endpoints {
            self.wait(endpoint).await?;
        }
        Ok(())
    }

    /// Wait for one endpoint; returns how long it took
    pub async fn wait(&self, endpoint: &HealthEndpoint) -> Result<Duration> {
        let url = endpoint.probe_url();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.probe(&url, endpoint.expected_status).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::info!("Healthcheck at '{}' succeeded", endpoint.base_url);
                    tracing::debug!(%url, attempts, ?elapsed, "Endpoint ready");
                    return Ok(elapsed);
                }
                Err(ProbeFailure::Transient(TransientKind::Status, detail)) => {
                    tracing::warn!("Healthcheck at '{}' {}", endpoint.base_url, detail);
                }
                Err(ProbeFailure::Transient(kind, detail)) => {
                    tracing::debug!(%url, ?kind, "Not ready yet: {}", detail);
                }
                Err(ProbeFailure::Fatal(message)) => {
                    return Err(Error::HealthProbe { url, message });
                }
            }

            if started.elapsed() + self.policy.interval > self.policy.timeout {
                return Err(Error::HealthcheckTimeout {
                    url: endpoint.base_url.clone(),
                    timeout_secs: self.policy.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.policy.interval).await;
        }
    }

    async fn probe(&self, url: &str, expected: u16) -> std::result::Result<(), ProbeFailure> {
        let failure = match self.client.get(url).send().await {
            Ok(response) if response.status().as_u16() == expected => return Ok(()),
            Ok(response) => ProbeFailure::Transient(
                TransientKind::Status,
                format!("returned {} instead of {}", response.status().as_u16(), expected),
            ),
            Err(e) => match classify(&e) {
                Some(kind) => ProbeFailure::Transient(kind, e.to_string()),
                None => ProbeFailure::Fatal(e.to_string()),
            },
        };

        match failure {
            ProbeFailure::Transient(kind, detail) if !self.policy.is_transient(kind) => {
                Err(ProbeFailure::Fatal(detail))
            }
            failure => Err(failure),
        }
    }
}

/// Map a transport error onto a retryable kind, if it is one
fn classify(error: &reqwest::Error) -> Option<TransientKind> {
    if error.is_timeout() {
        Some(TransientKind::Timeout)
    } else if error.is_connect() {
        Some(TransientKind::Connect)
    } else if error.is_request() {
        Some(TransientKind::Interrupted)
    } else {
        None
    }
}

/// Wait for every endpoint with a one-off gate
pub async fn wait_all(endpoints: &[HealthEndpoint], policy: RetryPolicy) -> Result<()> {
    HealthGate::new(policy)?.wait_all(endpoints).await
}
