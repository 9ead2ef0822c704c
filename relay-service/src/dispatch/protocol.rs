//! Protocol transport: hand the URL to the download manager through its
//! registered custom URI scheme.

use std::process::Stdio;
use std::sync::Arc;

use tracing::{error, info};

use super::DispatchOutcome;

/// Scheme the download manager registers with the OS.
pub const PROTOCOL_SCHEME: &str = "abdm";

/// Build the scheme URI carrying the target URL.
pub fn add_uri(url: &str) -> String {
    format!("{}://add?url={}", PROTOCOL_SCHEME, urlencoding::encode(url))
}

/// Host facility for opening a URI in its default handler.
#[async_trait::async_trait]
pub trait UriOpener: Send + Sync {
    async fn open(&self, uri: &str) -> std::io::Result<()>;
}

/// Spawns the platform opener without waiting for it to exit.
pub struct SystemOpener;

#[async_trait::async_trait]
impl UriOpener for SystemOpener {
    async fn open(&self, uri: &str) -> std::io::Result<()> {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        tokio::process::Command::new(program)
            .arg(uri)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

pub struct ProtocolTransport {
    opener: Arc<dyn UriOpener>,
}

impl ProtocolTransport {
    pub fn new() -> Self {
        Self::with_opener(Arc::new(SystemOpener))
    }

    pub fn with_opener(opener: Arc<dyn UriOpener>) -> Self {
        Self { opener }
    }

    /// Fire-and-forget: success means the open call raised no error.
    pub async fn open(&self, url: &str) -> DispatchOutcome {
        let uri = add_uri(url);
        info!(%uri, "opening protocol URI");
        match self.opener.open(&uri).await {
            Ok(()) => DispatchOutcome::Delivered,
            Err(e) => {
                error!(%uri, error = %e, "protocol open failed");
                DispatchOutcome::Failed
            }
        }
    }
}

impl Default for ProtocolTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_add_uri_percent_encodes_target() {
        assert_eq!(
            add_uri("http://host/a file.zip?x=1&y=2"),
            "abdm://add?url=http%3A%2F%2Fhost%2Fa%20file.zip%3Fx%3D1%26y%3D2"
        );
    }

    struct RecordingOpener {
        uris: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl UriOpener for RecordingOpener {
        async fn open(&self, uri: &str) -> std::io::Result<()> {
            self.uris.lock().unwrap().push(uri.to_string());
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no handler"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_open_success() {
        let opener = Arc::new(RecordingOpener {
            uris: Mutex::new(Vec::new()),
            fail: false,
        });
        let transport = ProtocolTransport::with_opener(opener.clone());

        assert!(transport.open("http://x/y.zip").await.is_delivered());
        assert_eq!(
            *opener.uris.lock().unwrap(),
            vec!["abdm://add?url=http%3A%2F%2Fx%2Fy.zip"]
        );
    }

    #[tokio::test]
    async fn test_open_failure_is_terminal_not_fatal() {
        let opener = Arc::new(RecordingOpener {
            uris: Mutex::new(Vec::new()),
            fail: true,
        });
        let transport = ProtocolTransport::with_opener(opener);

        assert_eq!(
            transport.open("http://x/y.zip").await,
            DispatchOutcome::Failed
        );
    }
}
