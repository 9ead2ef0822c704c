//! Wire types shared between the page detector, the host relay, and the
//! external download manager.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A detected resource eligible for relay to the external application.
///
/// Immutable once created; consumed exactly once by the dispatch pipeline
/// (subject to dedupe suppression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCandidate {
    /// Resource URL, absolute.
    pub url: String,
    /// URL of the page the resource was detected on, when known.
    pub page_url: Option<String>,
    /// Preferred filename (anchor `download` attribute or disposition filename).
    pub suggested_name: Option<String>,
    /// Unix timestamp of the detection.
    pub detected_at: i64,
}

impl CaptureCandidate {
    pub fn new(
        url: impl Into<String>,
        page_url: Option<String>,
        suggested_name: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            page_url,
            suggested_name,
            detected_at: Utc::now().timestamp(),
        }
    }
}

/// Messages crossing the page/host boundary.
///
/// The page-context detector posts these through the generic cross-context
/// messaging channel; the host side never shares memory with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DetectorMessage {
    /// A capturable resource was detected in the page.
    #[serde(rename = "abdm-detected")]
    Detected {
        url: String,
        #[serde(rename = "pageUrl", default)]
        page_url: Option<String>,
        #[serde(rename = "suggestedName", default)]
        suggested_name: Option<String>,
    },
    /// One-shot injection confirmation.
    #[serde(rename = "abdm-ready")]
    Ready,
}

impl DetectorMessage {
    pub fn detected(
        url: impl Into<String>,
        page_url: Option<String>,
        suggested_name: Option<String>,
    ) -> Self {
        Self::Detected {
            url: url.into(),
            page_url,
            suggested_name,
        }
    }

}

/// Host-level response metadata relayed by the embedding browser shim so the
/// network interceptor can decide whether to abort default handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetResponseMsg {
    /// Final URL after redirects.
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_disposition: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    /// The request's declared content purpose was a full-document load.
    #[serde(default)]
    pub is_document_purpose: bool,
    /// The channel carried the host's document-load flag.
    #[serde(default)]
    pub has_document_load_flag: bool,
}

/// Any frame accepted on the relay socket, discriminated by its `type` tag.
///
/// An unknown tag is a parse error, never silently coerced into another
/// frame kind. The detected/ready variants are wire-identical to
/// [`DetectorMessage`]; the host forwards page messages verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RelayFrame {
    #[serde(rename = "abdm-detected")]
    Detected {
        url: String,
        #[serde(rename = "pageUrl", default)]
        page_url: Option<String>,
        #[serde(rename = "suggestedName", default)]
        suggested_name: Option<String>,
    },
    #[serde(rename = "abdm-ready")]
    Ready,
    #[serde(rename = "net-response")]
    NetResponse(NetResponseMsg),
}

/// Single element of the HTTP dispatch body.
///
/// The download manager expects a JSON array of these; absent fields must be
/// serialized as explicit `null`s, never omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestItem {
    pub link: String,
    pub download_page: Option<String>,
    pub headers: Option<serde_json::Value>,
    pub description: Option<String>,
    pub suggested_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DownloadRequestItem {
    pub fn from_candidate(candidate: &CaptureCandidate) -> Self {
        Self {
            link: candidate.url.clone(),
            download_page: candidate.page_url.clone(),
            headers: None,
            description: None,
            suggested_name: candidate.suggested_name.clone(),
            kind: "http".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Acknowledgement written back to the detector host for each frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayAck {
    pub status: AckStatus,
    /// For `net-response` frames: whether the host must abort its default
    /// handling of the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RelayAck {
    pub fn ok() -> Self {
        Self {
            status: AckStatus::Ok,
            abort: None,
            message: None,
        }
    }

    pub fn verdict(abort: bool) -> Self {
        Self {
            status: AckStatus::Ok,
            abort: Some(abort),
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: AckStatus::Error,
            abort: None,
            message: Some(message.to_string()),
        }
    }
}
