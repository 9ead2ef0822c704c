//! Unix socket server for receiving detector frames.
//!
//! The detector host relays page messages and observed network responses
//! over this socket as newline-delimited JSON; every frame is answered with
//! a one-line acknowledgement. Network-response acks carry the abort
//! verdict the host must apply to the response.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

use crate::interceptor::NetworkInterceptor;
use crate::payload::{CaptureCandidate, RelayAck, RelayFrame};
use crate::pipeline::PipelineHandle;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Shared state each connection handler needs.
struct ServerState {
    handle: PipelineHandle,
    interceptor: Arc<NetworkInterceptor>,
}

/// Relay server that listens on a Unix socket
pub struct RelayServer {
    socket_path: PathBuf,
    state: Arc<ServerState>,
}

impl RelayServer {
    pub fn new(
        socket_path: PathBuf,
        handle: PipelineHandle,
        interceptor: Arc<NetworkInterceptor>,
    ) -> Self {
        Self {
            socket_path,
            state: Arc::new(ServerState {
                handle,
                interceptor,
            }),
        }
    }

    /// Start the server and listen for connections
    pub async fn run(&self) -> Result<(), ServeError> {
        // Remove existing socket file if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("Relay server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, state: Arc<ServerState>) -> Result<(), ServeError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Read one JSON frame per line
    while reader.read_line(&mut line).await? > 0 {
        let ack = match serde_json::from_str::<RelayFrame>(&line) {
            Ok(frame) => process_frame(&state, frame).await,
            Err(e) => {
                warn!("Failed to parse frame: {}", e);
                RelayAck::error(&format!("Parse error: {}", e))
            }
        };

        // Send acknowledgement
        let ack_json = serde_json::to_string(&ack)?;
        writer.write_all(ack_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

/// Process a single frame
async fn process_frame(state: &ServerState, frame: RelayFrame) -> RelayAck {
    match frame {
        RelayFrame::Ready => {
            info!("detector session ready");
            RelayAck::ok()
        }
        RelayFrame::Detected {
            url,
            page_url,
            suggested_name,
        } => {
            let candidate = CaptureCandidate::new(url, page_url, suggested_name);
            info!(url = %candidate.url, "received page detection");
            if state.handle.interactive_tx.send(candidate).await.is_err() {
                error!("capture pipeline unavailable");
                return RelayAck::error("pipeline unavailable");
            }
            RelayAck::ok()
        }
        RelayFrame::NetResponse(msg) => {
            let abort = state.interceptor.observe(&msg.into()).await;
            RelayAck::verdict(abort)
        }
    }
}
