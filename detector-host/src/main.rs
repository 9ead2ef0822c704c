//! Native Messaging Host - Thin relay to the capture relay service
//!
//! This binary receives frames from the browser extension via stdin/stdout
//! and forwards them to the relay daemon via Unix socket. Acknowledgements
//! (including abort verdicts for observed network responses) flow back the
//! same way.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEFAULT_SOCKET_PATH: &str = "/tmp/capture-relay.sock";
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the page detector may take to confirm injection. This host
/// starts together with the extension session, so the watch is armed here
/// rather than per socket connection (connections are one per frame).
const READY_TIMEOUT: Duration = Duration::from_millis(2500);

/// Watches for the detector's one-shot ready signal.
struct ReadyWatch {
    ready: Arc<AtomicBool>,
}

impl ReadyWatch {
    /// Arm at session start; `on_missed` runs once if no ready frame passes
    /// through within `timeout`. Non-fatal, the relay keeps serving.
    fn arm<F>(timeout: Duration, on_missed: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let ready = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ready);
        thread::spawn(move || {
            thread::sleep(timeout);
            if !flag.load(Ordering::SeqCst) {
                on_missed();
            }
        });
        Self { ready }
    }

    /// Inspect one outbound frame; a ready signal clears the watch.
    fn observe(&self, frame: &[u8]) {
        if is_ready_frame(frame) {
            self.ready.store(true, Ordering::SeqCst);
        }
    }
}

fn is_ready_frame(frame: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(frame)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(|t| t == "abdm-ready")))
        .unwrap_or(false)
}

fn socket_path() -> String {
    std::env::var("CAPTURE_RELAY_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}

/// Read a native messaging frame from stdin
fn read_frame() -> io::Result<Option<Vec<u8>>> {
    let mut length_bytes = [0u8; 4];

    match io::stdin().read_exact(&mut length_bytes) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let length = u32::from_ne_bytes(length_bytes) as usize;
    if length == 0 {
        return Ok(None);
    }

    let mut frame = vec![0u8; length];
    io::stdin().read_exact(&mut frame)?;

    Ok(Some(frame))
}

/// Write a native messaging frame to stdout
fn write_frame(frame: &[u8]) -> io::Result<()> {
    let length = frame.len() as u32;
    let length_bytes = length.to_ne_bytes();

    let mut stdout = io::stdout().lock();
    stdout.write_all(&length_bytes)?;
    stdout.write_all(frame)?;
    stdout.flush()?;

    Ok(())
}

/// Forward a frame to the relay daemon via Unix socket
fn forward_to_service(path: &str, frame: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = UnixStream::connect(path)?;
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
    stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;

    // Send frame with newline delimiter
    stream.write_all(frame)?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    // Read acknowledgement (newline-delimited JSON)
    let mut ack = Vec::new();
    let mut buf = [0u8; 1];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => break, // EOF
            Ok(_) => {
                if buf[0] == b'\n' {
                    break;
                }
                ack.push(buf[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }

    Ok(ack)
}

/// Create an error acknowledgement
fn error_ack(message: &str) -> Vec<u8> {
    serde_json::json!({
        "status": "error",
        "message": message,
    })
    .to_string()
    .into_bytes()
}

fn main() {
    let path = socket_path();
    eprintln!("Detector host started, relaying to {}", path);

    let watch = ReadyWatch::arm(READY_TIMEOUT, || {
        eprintln!("Detector never signalled ready, page capture may be inert");
    });

    // Main frame loop
    loop {
        match read_frame() {
            Ok(Some(frame)) => {
                watch.observe(&frame);
                let ack = match forward_to_service(&path, &frame) {
                    Ok(ack) => ack,
                    Err(e) => {
                        eprintln!("Service error: {}", e);
                        error_ack(&format!("Service unavailable: {}", e))
                    }
                };

                if let Err(e) = write_frame(&ack) {
                    eprintln!("Failed to write acknowledgement: {}", e);
                    break;
                }
            }
            Ok(None) => {
                eprintln!("Extension closed the channel");
                break;
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missed_flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        (fired, move || flag.store(true, Ordering::SeqCst))
    }

    #[test]
    fn test_missed_ready_fires_once_after_timeout() {
        let (fired, on_missed) = missed_flag();
        let _watch = ReadyWatch::arm(Duration::from_millis(20), on_missed);

        assert!(!fired.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ready_frame_clears_the_watch() {
        let (fired, on_missed) = missed_flag();
        let watch = ReadyWatch::arm(Duration::from_millis(20), on_missed);

        watch.observe(br#"{"type":"abdm-ready"}"#);
        thread::sleep(Duration::from_millis(200));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_other_frames_do_not_clear_the_watch() {
        let (fired, on_missed) = missed_flag();
        let watch = ReadyWatch::arm(Duration::from_millis(20), on_missed);

        watch.observe(br#"{"type":"abdm-detected","url":"http://h/a.zip"}"#);
        watch.observe(b"not json");
        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_is_ready_frame() {
        assert!(is_ready_frame(br#"{"type":"abdm-ready"}"#));
        assert!(!is_ready_frame(br#"{"type":"net-response","url":"http://h/"}"#));
        assert!(!is_ready_frame(br#"{"no":"type"}"#));
        assert!(!is_ready_frame(b"garbage"));
    }
}
