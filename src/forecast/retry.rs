//! HTTP GET with retries for transient provider failures.
//!
//! Transient outcomes are HTTP 429, any 5xx, and network-level errors
//! (timeouts, refused or reset connections). Every other status is returned
//! to the caller on the first attempt.

use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::utils::redact_credentials;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 1;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before the first retry; doubles after every attempt.
    pub initial_backoff: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based): initial * 2^retry.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff.saturating_mul(factor)
    }

    /// The sleeps a fully exhausted fetch goes through, in order.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.backoff_for_retry(retry))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Transient,
    Terminal,
}

pub fn classify_status(status: StatusCode) -> Classification {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Classification::Transient
    } else if status.is_success() {
        Classification::Success
    } else {
        Classification::Terminal
    }
}

/// A response the provider actually sent back.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: String,
    /// Attempts made up to and including the one that produced this response.
    pub attempts: u32,
}

impl Fetched {
    pub fn classification(&self) -> Classification {
        classify_status(self.status)
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no response after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: String },
    #[error("invalid request: {0}")]
    InvalidRequest(reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: Client,
    config: RetryConfig,
}

impl RetryingFetcher {
    pub fn new(config: RetryConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("weather-notifier/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// GET `url`, retrying transient outcomes with exponential backoff.
    ///
    /// Returns the last response received once attempts run out, even when
    /// its status is still an error. `FetchError::Unreachable` means no
    /// attempt produced a response at all.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut last_response: Option<Fetched> = None;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(url, attempt).await {
                Ok(fetched) => {
                    if fetched.classification() != Classification::Transient {
                        if attempt > 1 {
                            tracing::info!(
                                "Request to {} succeeded on attempt {}",
                                redact_credentials(url),
                                attempt
                            );
                        }
                        return Ok(fetched);
                    }

                    tracing::warn!(
                        "Transient status {} from {}, attempt {} of {}",
                        fetched.status,
                        redact_credentials(url),
                        attempt,
                        max_attempts
                    );
                    last_response = Some(fetched);
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::InvalidRequest(e.without_url()));
                }
                Err(e) => {
                    let e = e.without_url();
                    tracing::warn!(
                        "Network error on attempt {} of {}: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                tracing::debug!("Backing off {:?} before retry", backoff);
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        if let Some(response) = last_response {
            tracing::error!(
                "Retries exhausted for {}, last status {}",
                redact_credentials(url),
                response.status
            );
            return Ok(response);
        }

        tracing::error!(
            "All {} attempts to reach {} failed",
            max_attempts,
            redact_credentials(url)
        );
        Err(FetchError::Unreachable {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<Fetched, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(Fetched {
            status,
            body,
            attempts: attempt,
        })
    }
}
