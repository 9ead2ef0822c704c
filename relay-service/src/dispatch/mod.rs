//! Multi-transport delivery of capture candidates to the download manager.
//!
//! Three interchangeable transports, selected by configuration:
//! - Http: POST to a local endpoint chain
//! - Protocol: open a custom scheme URI through the host
//! - Process: launch a configured executable
//!
//! `Auto` is a policy, not a transport: HTTP first, protocol as fallback.

pub mod http;
pub mod process;
pub mod protocol;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::payload::CaptureCandidate;
use http::HttpTransport;
use process::ProcessTransport;
use protocol::ProtocolTransport;

/// Configured transport strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMethod {
    #[default]
    Auto,
    Http,
    Protocol,
    Process,
}

impl DispatchMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto" => Some(Self::Auto),
            "http" => Some(Self::Http),
            "protocol" => Some(Self::Protocol),
            "process" => Some(Self::Process),
            _ => None,
        }
    }
}

/// Terminal result of one dispatch call. Failures are logged, never escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed,
}

impl DispatchOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Executes the configured transport (or chain) for accepted candidates.
pub struct DispatchEngine {
    method: DispatchMethod,
    http: HttpTransport,
    protocol: ProtocolTransport,
    process: ProcessTransport,
}

impl DispatchEngine {
    pub fn new(
        method: DispatchMethod,
        http: HttpTransport,
        protocol: ProtocolTransport,
        process: ProcessTransport,
    ) -> Self {
        Self {
            method,
            http,
            protocol,
            process,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        let method = DispatchMethod::parse(&config.method).unwrap_or_else(|| {
            warn!(method = %config.method, "unknown dispatch method, using auto");
            DispatchMethod::Auto
        });
        Self::new(
            method,
            HttpTransport::new(config.http_endpoint.as_deref()),
            ProtocolTransport::new(),
            ProcessTransport::new(&config.process_path, &config.process_args),
        )
    }

    /// Deliver one candidate. Endpoint fallback inside the HTTP transport is
    /// strictly sequential; `Auto` chains HTTP exhaustion into a single
    /// protocol-open attempt whose outcome becomes the overall one.
    pub async fn dispatch(&self, candidate: &CaptureCandidate) -> DispatchOutcome {
        info!(url = %candidate.url, method = ?self.method, "dispatching candidate");

        match self.method {
            DispatchMethod::Http => self.http.post(candidate).await,
            DispatchMethod::Protocol => self.protocol.open(&candidate.url).await,
            DispatchMethod::Process => self.process.launch(&candidate.url),
            DispatchMethod::Auto => {
                let outcome = self.http.post(candidate).await;
                if outcome.is_delivered() {
                    return outcome;
                }
                warn!(url = %candidate.url, "all HTTP endpoints failed, falling back to protocol");
                self.protocol.open(&candidate.url).await
            }
        }
    }
}
