//! Debug hooks invoked with every response the client receives.
//!
//! Observers are best effort: they cannot fail a call and they see the
//! response before payload errors are raised.

use std::path::{Path, PathBuf};

use crate::response::Response;

/// Receives each [`Response`] built by [`SipayClient`](crate::client::SipayClient).
pub trait ResponseObserver: Send + Sync {
    fn on_response(&self, response: &Response);
}

impl<F> ResponseObserver for F
where
    F: Fn(&Response) + Send + Sync,
{
    fn on_response(&self, response: &Response) {
        self(response)
    }
}

/// Overwrites a file with a JSON snapshot of the last response.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResponseObserver for SnapshotFile {
    fn on_response(&self, response: &Response) {
        let bytes = match serde_json::to_vec_pretty(&response.snapshot()) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(error = %err, "Failed to serialize response snapshot");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, bytes) {
            tracing::debug!(
                path = %self.path.display(),
                error = %err,
                "Failed to write response snapshot"
            );
        }
    }
}
