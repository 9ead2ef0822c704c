//! HTTP transport: POST the download-request payload to a chain of local
//! endpoints, first 2xx wins.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::DispatchOutcome;
use crate::payload::{CaptureCandidate, DownloadRequestItem};

/// Built-in endpoint tried when no override is configured (and after it).
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:15151/add";

/// Per-attempt timeout, enforced via request cancellation.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: Vec<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Endpoint order: configured override first, built-in default appended
    /// (deduplicated). The list is never empty.
    pub fn new(configured: Option<&str>) -> Self {
        let mut endpoints = Vec::new();
        if let Some(endpoint) = configured {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                endpoints.push(endpoint.to_string());
            }
        }
        if !endpoints.iter().any(|e| e == DEFAULT_ENDPOINT) {
            endpoints.push(DEFAULT_ENDPOINT.to_string());
        }
        Self::with_endpoints(endpoints, ATTEMPT_TIMEOUT)
    }

    pub fn with_endpoints(endpoints: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Try each endpoint in order, one attempt in flight at a time. Any
    /// non-2xx status, network error, or timeout advances the chain;
    /// exhaustion is overall failure.
    pub async fn post(&self, candidate: &CaptureCandidate) -> DispatchOutcome {
        let body = vec![DownloadRequestItem::from_candidate(candidate)];

        for endpoint in &self.endpoints {
            debug!(%endpoint, url = %candidate.url, "HTTP POST");
            let result = self
                .client
                .post(endpoint)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(%endpoint, status = %response.status(), "download manager accepted request");
                    return DispatchOutcome::Delivered;
                }
                Ok(response) => {
                    warn!(%endpoint, status = %response.status(), "endpoint rejected request");
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "endpoint unreachable");
                }
            }
        }

        DispatchOutcome::Failed
    }
}
