//! Capture Relay Library
//!
//! Detects downloadable resources during browsing, deduplicates them, and
//! relays them to an external download manager over HTTP, a protocol URI,
//! or a spawned process.

pub mod classify;
pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod interceptor;
pub mod page;
pub mod payload;
pub mod pipeline;
pub mod server;

pub use classify::Classifier;
pub use config::Config;
pub use dedupe::DedupeGuard;
pub use dispatch::DispatchEngine;
pub use payload::CaptureCandidate;
pub use server::RelayServer;
