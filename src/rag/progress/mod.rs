#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Lifecycle of one indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingPhase {
    Starting,
    Chunking,
    Embedding,
    Saving,
    Completed,
    Error,
}

impl IndexingPhase {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, IndexingPhase::Completed | IndexingPhase::Error)
    }
}

impl std::fmt::Display for IndexingPhase {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IndexingPhase::Starting => write!(f, "Starting"),
            IndexingPhase::Chunking => write!(f, "Chunking"),
            IndexingPhase::Embedding => write!(f, "Embedding"),
            IndexingPhase::Saving => write!(f, "Saving"),
            IndexingPhase::Completed => write!(f, "Completed"),
            IndexingPhase::Error => write!(f, "Error"),
        }
    }
}

/// Advisory progress report; never used for control flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingProgress {
    pub phase: IndexingPhase,
    /// 0 to 100
    pub progress: u8,
    pub message: String,
}

impl IndexingProgress {
    #[inline]
    pub fn new(phase: IndexingPhase, progress: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            progress: progress.min(100),
            message: message.into(),
        }
    }
}

/// Receiver of indexing progress reports
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, progress: IndexingProgress);
}

impl ProgressObserver for UnboundedSender<IndexingProgress> {
    #[inline]
    fn notify(&self, progress: IndexingProgress) {
        if self.send(progress).is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

/// Observer that discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    #[inline]
    fn notify(&self, _progress: IndexingProgress) {}
}
