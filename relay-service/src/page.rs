//! Per-document detector session.
//!
//! Models the page-context half of the capture pipeline as an event
//! processor: the embedding host feeds it DOM and network events observed in
//! one browsed document, and it answers with the actions the host must apply
//! (suppress navigation, mark an anchor, post a detector message across the
//! page/host boundary).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::classify::{Classifier, ResourceClass};
use crate::payload::DetectorMessage;

/// Grace delay before aborting a navigation other handlers already started.
pub const NAVIGATION_ABORT_DELAY: Duration = Duration::from_millis(20);

/// The nearest ancestor anchor resolved from an event target, if any.
#[derive(Debug, Clone, Default)]
pub struct AnchorTarget {
    /// Resolved absolute href.
    pub href: Option<String>,
    /// Value of the anchor's `download` attribute.
    pub download_attr: Option<String>,
}

impl AnchorTarget {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            download_attr: None,
        }
    }

    pub fn with_download(mut self, name: impl Into<String>) -> Self {
        self.download_attr = Some(name.into());
        self
    }
}

/// A `<video>`, `<audio>` or `<source>` element; `<source>` elements fall
/// back to their parent media element's src.
#[derive(Debug, Clone, Default)]
pub struct MediaSource {
    pub src: Option<String>,
    pub parent_src: Option<String>,
}

impl MediaSource {
    pub fn resolved(&self) -> Option<&str> {
        self.src.as_deref().or(self.parent_src.as_deref())
    }
}

/// Events the host observes in the page and forwards to the session.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Primary-button click somewhere in the document.
    Click(AnchorTarget),
    /// Mouse press; some sites begin downloads on press.
    PointerDown(AnchorTarget),
    /// A media element with a resolvable source URL.
    MediaElement(MediaSource),
    /// A completed in-page request (XHR or fetch) after redirects. The body
    /// prefix is read from a clone of the stream; the page's own copy is
    /// never consumed.
    ResponseCompleted {
        final_url: String,
        content_type: Option<String>,
        body_prefix: Option<String>,
    },
}

/// Actions the host must apply in the page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    /// Prevent the default navigation/download, stop further propagation,
    /// and abort any navigation already started after the grace delay.
    SuppressNavigation { abort_delay: Duration },
    /// Post a message across the page/host boundary.
    Emit(DetectorMessage),
}

/// Result of the initial document scan.
#[derive(Debug, Clone, Default)]
pub struct InitialScan {
    /// Indices of anchors whose target already classifies as capturable;
    /// marked for the host UI, never dispatched unsolicited.
    pub marked_anchors: Vec<usize>,
    /// Media emissions followed by the one-shot ready signal.
    pub actions: Vec<PageAction>,
}

/// One session per browsed document.
pub struct PageSession {
    classifier: Arc<Classifier>,
    page_url: String,
}

impl PageSession {
    pub fn new(classifier: Arc<Classifier>, page_url: impl Into<String>) -> Self {
        Self {
            classifier,
            page_url: page_url.into(),
        }
    }

    /// Scan the freshly parsed document: mark capturable anchors, emit
    /// candidates for media sources (media elements start loading as soon as
    /// they are parsed, so no user action is required), then announce
    /// readiness so the host can detect failed injection.
    pub fn initial_scan(&self, anchors: &[AnchorTarget], media: &[MediaSource]) -> InitialScan {
        let mut scan = InitialScan::default();

        for (index, anchor) in anchors.iter().enumerate() {
            if let Some(href) = &anchor.href {
                if matches!(
                    self.classifier.classify(href, None, None, None),
                    ResourceClass::RegisteredExtension(_)
                ) {
                    scan.marked_anchors.push(index);
                }
            }
        }

        for source in media {
            if let Some(src) = source.resolved() {
                if self.is_capturable(src) {
                    debug!(url = %src, "media source detected on scan");
                    scan.actions.push(self.emit(src, None));
                }
            }
        }

        scan.actions.push(PageAction::Emit(DetectorMessage::Ready));
        scan
    }

    /// Process one page event into zero or more host actions.
    pub fn handle_event(&self, event: &PageEvent) -> Vec<PageAction> {
        match event {
            PageEvent::Click(target) | PageEvent::PointerDown(target) => {
                self.handle_pointer(target)
            }
            PageEvent::MediaElement(source) => match source.resolved() {
                Some(src) if self.is_capturable(src) => vec![self.emit(src, None)],
                _ => Vec::new(),
            },
            PageEvent::ResponseCompleted {
                final_url,
                content_type,
                body_prefix,
            } => self.handle_response(final_url, content_type.as_deref(), body_prefix.as_deref()),
        }
    }

    fn handle_pointer(&self, target: &AnchorTarget) -> Vec<PageAction> {
        let href = match &target.href {
            Some(href) => href,
            None => return Vec::new(),
        };
        if !self.is_capturable(href) {
            return Vec::new();
        }

        debug!(url = %href, "capturable anchor activated");
        vec![
            PageAction::SuppressNavigation {
                abort_delay: NAVIGATION_ABORT_DELAY,
            },
            self.emit(href, target.download_attr.clone()),
        ]
    }

    /// Re-run classification against the final URL, content type and a
    /// decoded body prefix; JSON bodies are additionally scanned for nested
    /// resource URLs.
    fn handle_response(
        &self,
        final_url: &str,
        content_type: Option<&str>,
        body_prefix: Option<&str>,
    ) -> Vec<PageAction> {
        let class = self
            .classifier
            .classify(final_url, content_type, None, body_prefix);
        if class.is_capturable() {
            debug!(url = %final_url, ?class, "in-page response classified");
            return vec![self.emit(final_url, None)];
        }

        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);
        if is_json {
            if let Some(body) = body_prefix {
                // Truncated or malformed JSON is silently ignored.
                if let Ok(doc) = serde_json::from_str::<serde_json::Value>(body) {
                    if let Some(nested) = self.classifier.scan_json_for_url(&doc) {
                        debug!(url = %nested, "nested manifest URL found in JSON response");
                        return vec![self.emit(&nested, None)];
                    }
                }
            }
        }

        Vec::new()
    }

    fn is_capturable(&self, url: &str) -> bool {
        self.classifier
            .classify(url, None, None, None)
            .is_capturable()
    }

    fn emit(&self, url: &str, suggested_name: Option<String>) -> PageAction {
        PageAction::Emit(DetectorMessage::detected(
            url,
            Some(self.page_url.clone()),
            suggested_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PageSession {
        PageSession::new(Arc::new(Classifier::with_defaults()), "http://page/")
    }

    fn emitted(actions: &[PageAction]) -> Vec<&DetectorMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                PageAction::Emit(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_click_on_registered_link_suppresses_and_emits() {
        let actions = session().handle_event(&PageEvent::Click(AnchorTarget::new(
            "http://host/setup.exe",
        )));

        assert_eq!(
            actions[0],
            PageAction::SuppressNavigation {
                abort_delay: NAVIGATION_ABORT_DELAY
            }
        );
        assert_eq!(
            actions[1],
            PageAction::Emit(DetectorMessage::detected(
                "http://host/setup.exe",
                Some("http://page/".to_string()),
                None,
            ))
        );
    }

    #[test]
    fn test_download_attribute_becomes_suggested_name() {
        let actions = session().handle_event(&PageEvent::PointerDown(
            AnchorTarget::new("http://host/f.bin").with_download("installer.bin"),
        ));

        match &actions[1] {
            PageAction::Emit(DetectorMessage::Detected { suggested_name, .. }) => {
                assert_eq!(suggested_name.as_deref(), Some("installer.bin"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_click_on_plain_link_untouched() {
        let actions = session().handle_event(&PageEvent::Click(AnchorTarget::new(
            "http://host/article.html",
        )));
        assert!(actions.is_empty());

        let actions = session().handle_event(&PageEvent::Click(AnchorTarget::default()));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_m3u8_link_captured_beyond_extension_set() {
        let actions = session().handle_event(&PageEvent::Click(AnchorTarget::new(
            "http://cdn/live/playlist.m3u8",
        )));
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_media_element_emits_without_user_action() {
        let actions = session().handle_event(&PageEvent::MediaElement(MediaSource {
            src: Some("http://cdn/video.mp4".to_string()),
            parent_src: None,
        }));
        assert_eq!(emitted(&actions).len(), 1);
    }

    #[test]
    fn test_source_element_falls_back_to_parent_src() {
        let actions = session().handle_event(&PageEvent::MediaElement(MediaSource {
            src: None,
            parent_src: Some("http://cdn/audio.mp3".to_string()),
        }));
        assert_eq!(emitted(&actions).len(), 1);
    }

    #[test]
    fn test_initial_scan_marks_but_does_not_emit_anchors() {
        let anchors = [
            AnchorTarget::new("http://host/a.zip"),
            AnchorTarget::new("http://host/about.html"),
            AnchorTarget::new("http://host/b.iso"),
        ];
        let scan = session().initial_scan(&anchors, &[]);

        assert_eq!(scan.marked_anchors, vec![0, 2]);
        // Only the ready signal; marked anchors are never relayed unsolicited.
        assert_eq!(
            scan.actions,
            vec![PageAction::Emit(DetectorMessage::Ready)]
        );
    }

    #[test]
    fn test_initial_scan_emits_media_then_ready() {
        let media = [MediaSource {
            src: Some("http://cdn/clip.mkv".to_string()),
            parent_src: None,
        }];
        let scan = session().initial_scan(&[], &media);

        assert_eq!(scan.actions.len(), 2);
        assert_eq!(
            scan.actions[1],
            PageAction::Emit(DetectorMessage::Ready)
        );
    }

    #[test]
    fn test_response_with_manifest_body_emits_final_url() {
        let actions = session().handle_event(&PageEvent::ResponseCompleted {
            final_url: "http://cdn/master".to_string(),
            content_type: Some("text/plain".to_string()),
            body_prefix: Some("#EXTM3U\n#EXT-X-STREAM-INF".to_string()),
        });

        match emitted(&actions).as_slice() {
            [DetectorMessage::Detected { url, .. }] => assert_eq!(url, "http://cdn/master"),
            other => panic!("unexpected emissions: {:?}", other),
        }
    }

    #[test]
    fn test_json_response_surfaces_nested_url() {
        let actions = session().handle_event(&PageEvent::ResponseCompleted {
            final_url: "http://api/manifest".to_string(),
            content_type: Some("application/json; charset=utf-8".to_string()),
            body_prefix: Some(r#"{"streams":[{"src":"http://cdn/hls/index.m3u8"}]}"#.to_string()),
        });

        match emitted(&actions).as_slice() {
            [DetectorMessage::Detected { url, .. }] => {
                assert_eq!(url, "http://cdn/hls/index.m3u8")
            }
            other => panic!("unexpected emissions: {:?}", other),
        }
    }

    #[test]
    fn test_uninteresting_response_ignored() {
        let actions = session().handle_event(&PageEvent::ResponseCompleted {
            final_url: "http://api/session".to_string(),
            content_type: Some("application/json".to_string()),
            body_prefix: Some(r#"{"ok":true}"#.to_string()),
        });
        assert!(actions.is_empty());
    }
}
