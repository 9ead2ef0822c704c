//! Resource classification: decides whether a URL names a capturable
//! resource, by extension, content type, disposition, or manifest signature.

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

/// MIME type of an Apple HLS playlist.
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// Magic marker at the start of an HLS manifest body.
pub const HLS_MAGIC: &str = "EXTM3U";

/// Extension set registered out of the box, space separated.
pub const DEFAULT_FILE_TYPES: &str =
    "zip rar 7z iso tar gz exe msi deb jar apk bin mp3 aac pdf mp4 3gp avi mkv wav mpeg srt";

/// Classification result for a single URL/response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceClass {
    /// The URL path ends in a registered file extension.
    RegisteredExtension(String),
    /// Playlist/manifest resource (HLS), by URL, MIME type, or body marker.
    StreamManifest,
    /// The response carries an `attachment` content disposition.
    AttachmentDisposition,
    /// Nothing matched; callers drop these silently.
    Unclassified,
}

impl ResourceClass {
    pub fn is_capturable(&self) -> bool {
        !matches!(self, ResourceClass::Unclassified)
    }
}

/// Pure classifier over a configured extension set.
pub struct Classifier {
    extensions: HashSet<String>,
}

impl Classifier {
    /// Build from a whitespace/comma separated extension list.
    pub fn new(registered: &str) -> Self {
        let extensions = registered
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_FILE_TYPES)
    }

    pub fn is_registered(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Classify a URL together with whatever response metadata is available.
    ///
    /// Manifest signals win over the extension match: a `.m3u8` URL is a
    /// playlist even when `m3u8` happens to be in the registered set.
    pub fn classify(
        &self,
        url: &str,
        content_type: Option<&str>,
        content_disposition: Option<&str>,
        body_prefix: Option<&str>,
    ) -> ResourceClass {
        if url.contains(".m3u8") {
            return ResourceClass::StreamManifest;
        }
        if let Some(ct) = content_type {
            if ct.to_ascii_lowercase().contains(HLS_MIME) {
                return ResourceClass::StreamManifest;
            }
        }
        if let Some(body) = body_prefix {
            if body.contains(HLS_MAGIC) {
                return ResourceClass::StreamManifest;
            }
        }

        if let Some(ext) = extension_of(url) {
            if self.is_registered(&ext) {
                return ResourceClass::RegisteredExtension(ext);
            }
        }

        if let Some(disp) = content_disposition {
            if disp.to_ascii_lowercase().contains("attachment") {
                return ResourceClass::AttachmentDisposition;
            }
        }

        ResourceClass::Unclassified
    }

    /// Depth-first scan of a JSON document for the first string value that is
    /// an `http` URL classifying as a registered extension or manifest.
    ///
    /// Surfaced URLs become independent candidates; JSON values are acyclic
    /// so no cycle protection is needed.
    pub fn scan_json_for_url(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => {
                if !s.starts_with("http") {
                    return None;
                }
                match self.classify(s, None, None, None) {
                    ResourceClass::RegisteredExtension(_) | ResourceClass::StreamManifest => {
                        Some(s.clone())
                    }
                    _ => None,
                }
            }
            Value::Array(items) => items.iter().find_map(|v| self.scan_json_for_url(v)),
            Value::Object(map) => map.values().find_map(|v| self.scan_json_for_url(v)),
            _ => None,
        }
    }
}

/// Extract the file extension from the URL path (last `.` segment, lowercase).
///
/// Query and fragment never contribute to the extension.
pub fn extension_of(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        // Relative or otherwise unparseable: strip query/fragment by hand.
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_string(),
    };
    let dot = path.rfind('.')?;
    let ext = &path[dot + 1..];
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
