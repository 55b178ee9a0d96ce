//! HTTP fetch job: one request per job, run through a gate.
//!
//! The job honours its cancellation token while waiting for the response head
//! and while reading the body. Non-success statuses optionally count as job
//! failures so they show up on the gate's error stream.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::{models::FetchConfig, validation::ConfigValidator},
    ports::job::Job,
};

/// Errors produced by [`FetchJob`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
    /// The target is not an absolute http(s) URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The job's cancellation fired before the exchange completed
    #[error("Request to {url} cancelled")]
    Cancelled { url: String },

    /// Transport failure (connect, timeout, body read)
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{method} {url} returned {status}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
    },
}

/// Summary of a finished exchange, sent to the optional reporter.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    pub status: StatusCode,
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Build the shared HTTP client used by fetch jobs.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    let timeout = config
        .timeout()
        .wrap_err_with(|| format!("Invalid fetch timeout '{}'", config.timeout))?;

    Client::builder()
        .timeout(timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .wrap_err("Failed to build HTTP client")
}

/// A single HTTP request executed as a gate job.
pub struct FetchJob {
    client: Client,
    method: Method,
    url: Url,
    fail_on_status: bool,
    reporter: Option<mpsc::UnboundedSender<FetchOutcome>>,
}

impl FetchJob {
    /// Create a job for `url`. Only absolute `http`/`https` URLs are accepted.
    pub fn new(client: Client, method: Method, url: &str) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if parsed.host_str().is_none() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            client,
            method,
            url: parsed,
            fail_on_status: true,
            reporter: None,
        })
    }

    /// Create a job using the method and status policy from configuration.
    pub fn from_config(client: Client, config: &FetchConfig, url: &str) -> Result<Self> {
        let method = ConfigValidator::validate_method(&config.method)?;
        let job = Self::new(client, method, url)?.fail_on_status(config.fail_on_status);
        Ok(job)
    }

    pub fn fail_on_status(mut self, enabled: bool) -> Self {
        self.fail_on_status = enabled;
        self
    }

    /// Send a [`FetchOutcome`] for every exchange that received a response.
    pub fn with_reporter(mut self, reporter: mpsc::UnboundedSender<FetchOutcome>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request_error(&self, source: reqwest::Error) -> FetchError {
        FetchError::Request {
            url: self.url.to_string(),
            source,
        }
    }

    fn cancelled(&self) -> FetchError {
        FetchError::Cancelled {
            url: self.url.to_string(),
        }
    }
}

#[async_trait]
impl Job for FetchJob {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let started = Instant::now();
        tracing::debug!(method = %self.method, url = %self.url, "Sending request");

        let request = self.client.request(self.method.clone(), self.url.clone());
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(self.cancelled().into()),
            sent = request.send() => sent.map_err(|e| self.request_error(e))?,
        };

        let status = response.status();
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(self.cancelled().into()),
            body = response.bytes() => body.map_err(|e| self.request_error(e))?,
        };

        let outcome = FetchOutcome {
            url: self.url.to_string(),
            status,
            bytes: body.len(),
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            url = %outcome.url,
            status = outcome.status.as_u16(),
            bytes = outcome.bytes,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Response received"
        );
        if let Some(reporter) = &self.reporter
            && reporter.send(outcome).is_err()
        {
            tracing::debug!(url = %self.url, "Outcome reporter gone, outcome not delivered");
        }

        if self.fail_on_status && !status.is_success() {
            return Err(FetchError::Status {
                method: self.method.clone(),
                url: self.url.to_string(),
                status,
            }
            .into());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fetch"
    }
}
