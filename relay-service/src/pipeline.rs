//! Coordinating task joining page detections and network captures.
//!
//! One pipeline per daemon session owns the dedupe guard and the dispatch
//! engine. Candidates arrive on two channels, one per capture path, because
//! the paths use different dedupe windows. Dispatch runs inline in the
//! coordinating task, so candidates are delivered strictly in arrival order.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::dedupe::{DedupeGuard, DedupeWindow};
use crate::dispatch::DispatchEngine;
use crate::payload::CaptureCandidate;

const CHANNEL_CAPACITY: usize = 64;

/// Sending half of the pipeline. The pipeline task ends once every clone of
/// both senders is dropped.
#[derive(Clone)]
pub struct PipelineHandle {
    /// Candidates from user interaction in the page (clicks, media elements).
    pub interactive_tx: mpsc::Sender<CaptureCandidate>,
    /// Candidates from the host-level network observer.
    pub observer_tx: mpsc::Sender<CaptureCandidate>,
}

pub struct Pipeline {
    guard: Arc<Mutex<DedupeGuard>>,
    engine: Arc<DispatchEngine>,
    interactive_rx: mpsc::Receiver<CaptureCandidate>,
    observer_rx: mpsc::Receiver<CaptureCandidate>,
}

impl Pipeline {
    pub fn new(guard: Arc<Mutex<DedupeGuard>>, engine: Arc<DispatchEngine>) -> (Self, PipelineHandle) {
        let (interactive_tx, interactive_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (observer_tx, observer_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                guard,
                engine,
                interactive_rx,
                observer_rx,
            },
            PipelineHandle {
                interactive_tx,
                observer_tx,
            },
        )
    }

    /// Drive the pipeline until both input channels close.
    pub async fn run(mut self) {
        info!("capture pipeline started");
        loop {
            tokio::select! {
                candidate = self.interactive_rx.recv() => match candidate {
                    Some(candidate) => {
                        self.process(candidate, DedupeWindow::Interactive).await
                    }
                    None => {
                        if self.drain_observer().await {
                            break;
                        }
                    }
                },
                candidate = self.observer_rx.recv() => match candidate {
                    Some(candidate) => {
                        self.process(candidate, DedupeWindow::Observer).await
                    }
                    None => {
                        if self.drain_interactive().await {
                            break;
                        }
                    }
                },
            }
        }
        info!("capture pipeline stopped");
    }

    /// After one channel closes, finish the other before stopping.
    async fn drain_observer(&mut self) -> bool {
        while let Some(candidate) = self.observer_rx.recv().await {
            self.process(candidate, DedupeWindow::Observer).await;
        }
        true
    }

    async fn drain_interactive(&mut self) -> bool {
        while let Some(candidate) = self.interactive_rx.recv().await {
            self.process(candidate, DedupeWindow::Interactive).await;
        }
        true
    }

    async fn process(&self, candidate: CaptureCandidate, window: DedupeWindow) {
        let accepted = {
            let mut guard = self.guard.lock().await;
            guard.accept(&candidate.url, window, Instant::now())
        };
        if !accepted {
            debug!(url = %candidate.url, ?window, "duplicate candidate suppressed");
            return;
        }

        let outcome = self.engine.dispatch(&candidate).await;
        if !outcome.is_delivered() {
            warn!(url = %candidate.url, "dispatch failed, candidate dropped");
        }

        // Dispatch resolved either way, so the in-flight marker can go now
        // instead of waiting out its expiry.
        self.guard.lock().await.complete(&candidate.url);
    }
}
