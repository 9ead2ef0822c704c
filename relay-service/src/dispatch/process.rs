//! Process transport: launch a configured executable with the target URL.

use std::path::PathBuf;
use std::process::Stdio;

use tracing::{error, info, warn};

use super::DispatchOutcome;

/// Literal token substituted with the target URL in the argument template.
pub const URL_PLACEHOLDER: &str = "%URL%";

pub struct ProcessTransport {
    path: Option<PathBuf>,
    args_template: Vec<String>,
}

impl ProcessTransport {
    pub fn new(path: &str, args: &str) -> Self {
        let path = {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        };
        Self {
            path,
            args_template: args.split_whitespace().map(String::from).collect(),
        }
    }

    /// Substitute the placeholder token, or append the URL as the last
    /// argument when the template never names it.
    pub fn build_args(&self, url: &str) -> Vec<String> {
        if self.args_template.iter().any(|a| a == URL_PLACEHOLDER) {
            self.args_template
                .iter()
                .map(|a| {
                    if a == URL_PLACEHOLDER {
                        url.to_string()
                    } else {
                        a.clone()
                    }
                })
                .collect()
        } else {
            let mut args = self.args_template.clone();
            args.push(url.to_string());
            args
        }
    }

    /// Launch without waiting for completion. A missing configured path is a
    /// logged no-op failure.
    pub fn launch(&self, url: &str) -> DispatchOutcome {
        let path = match &self.path {
            Some(p) => p,
            None => {
                warn!("process dispatch: no executable path configured");
                return DispatchOutcome::Failed;
            }
        };

        let args = self.build_args(url);
        match tokio::process::Command::new(path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_child) => {
                info!(path = %path.display(), ?args, "launched download manager process");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "process launch failed");
                DispatchOutcome::Failed
            }
        }
    }
}
