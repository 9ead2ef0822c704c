//! Host-level response observation.
//!
//! Watches every outgoing HTTP response the host sees, regardless of
//! originating page, and decides before the host's own download handling
//! fires whether the response should be captured. Matched responses are
//! aborted host-side; the candidate handoff happens on the next scheduling
//! tick, never inline in the observer callback.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::dedupe::{DedupeGuard, DedupeWindow};
use crate::payload::{CaptureCandidate, NetResponseMsg};

lazy_static! {
    static ref FILENAME_STAR: Regex = Regex::new(r"(?i)filename\*=UTF-8''([^;]+)$").unwrap();
    static ref FILENAME: Regex = Regex::new(r#"(?i)filename="?([^";]+)"?"#).unwrap();
}

/// One observed response, as relayed by the embedding host.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// Final URL after redirects.
    pub url: String,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    /// Referrer, used as the candidate's page URL.
    pub referrer: Option<String>,
    /// The request's declared content purpose was a full-document load.
    pub is_document_purpose: bool,
    /// The host's document-load flag was set on the channel.
    pub has_document_load_flag: bool,
}

impl ResponseEvent {
    pub fn is_top_level(&self) -> bool {
        self.is_document_purpose || self.has_document_load_flag
    }
}

impl From<NetResponseMsg> for ResponseEvent {
    fn from(msg: NetResponseMsg) -> Self {
        Self {
            url: msg.url,
            content_type: msg.content_type,
            content_disposition: msg.content_disposition,
            referrer: msg.referrer,
            is_document_purpose: msg.is_document_purpose,
            has_document_load_flag: msg.has_document_load_flag,
        }
    }
}

/// Host-level interceptor; enabled by the auto-capture configuration flag.
pub struct NetworkInterceptor {
    classifier: Arc<Classifier>,
    guard: Arc<Mutex<DedupeGuard>>,
    tx: mpsc::Sender<CaptureCandidate>,
    ignore_patterns: Vec<String>,
    registered: AtomicBool,
}

impl NetworkInterceptor {
    /// `ignore_patterns` is the raw newline-separated configuration value.
    pub fn new(
        classifier: Arc<Classifier>,
        guard: Arc<Mutex<DedupeGuard>>,
        tx: mpsc::Sender<CaptureCandidate>,
        ignore_patterns: &str,
    ) -> Self {
        let ignore_patterns = ignore_patterns
            .lines()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        Self {
            classifier,
            guard,
            tx,
            ignore_patterns,
            registered: AtomicBool::new(false),
        }
    }

    /// Register with the host observation hook. Enabling twice is a no-op.
    pub fn enable(&self) {
        if self.registered.swap(true, Ordering::SeqCst) {
            debug!("network observer already registered");
        } else {
            info!("network observer registered");
        }
    }

    /// Deterministically stop further callbacks. Disabling when not
    /// registered is a no-op.
    pub fn disable(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            info!("network observer unregistered");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Observer callback for one response. Returns true when the response
    /// was captured and the host must abort its default handling.
    pub async fn observe(&self, event: &ResponseEvent) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let url = &event.url;
        {
            let guard = self.guard.lock().await;
            if guard.seen_recently(url, DedupeWindow::Observer, Instant::now()) {
                debug!(%url, "response already handled recently");
                return false;
            }
        }

        if self.ignore_patterns.iter().any(|p| url.contains(p)) {
            debug!(%url, "response matches ignored pattern");
            return false;
        }

        let disposition = event.content_disposition.as_deref();
        let is_attachment = disposition
            .map(|d| d.to_ascii_lowercase().contains("attachment"))
            .unwrap_or(false);
        let filename =
            filename_from_disposition(disposition).or_else(|| filename_from_url(url));

        // Attachments always match. Otherwise only a top-level navigation to
        // a registered extension does; plain in-page sub-resource loads are
        // left alone.
        let matched = is_attachment
            || (event.is_top_level() && self.matches_registered(filename.as_deref(), event));
        if !matched {
            return false;
        }

        info!(%url, ?filename, "network observer captured auto download");

        let candidate = CaptureCandidate::new(url.clone(), event.referrer.clone(), filename);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tx.send(candidate).await.is_err() {
                warn!("capture pipeline is gone, dropping candidate");
            }
        });
        true
    }

    fn matches_registered(&self, filename: Option<&str>, event: &ResponseEvent) -> bool {
        let lower_filename = filename.map(|f| f.to_ascii_lowercase());
        let lower_type = event.content_type.as_deref().map(|t| t.to_ascii_lowercase());

        self.classifier.extensions().any(|ext| {
            if let Some(name) = &lower_filename {
                if name.ends_with(&format!(".{}", ext)) {
                    return true;
                }
            }
            if let Some(ct) = &lower_type {
                if ct.contains(ext) {
                    return true;
                }
            }
            false
        })
    }
}

/// Parse the filename parameter out of a `Content-Disposition` header,
/// preferring the RFC 5987 `filename*` form.
pub fn filename_from_disposition(disposition: Option<&str>) -> Option<String> {
    let disposition = disposition?;
    if let Some(caps) = FILENAME_STAR.captures(disposition) {
        let raw = caps[1].replace('"', "");
        return Some(
            urlencoding::decode(&raw)
                .map(Cow::into_owned)
                .unwrap_or(raw),
        );
    }
    FILENAME.captures(disposition).map(|caps| caps[1].to_string())
}

/// Last path segment of the URL, query/fragment stripped, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() || segment.contains(':') {
        return None;
    }
    Some(
        urlencoding::decode(segment)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| segment.to_string()),
    )
}
