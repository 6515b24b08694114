//! Listener that forwards lifecycle callbacks over a channel

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ports::CompressionListener;

/// One listener callback as a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CompressionEvent {
    Started { index: usize },
    Progress { index: usize, percent: f32 },
    Succeeded { index: usize, size: u64, path: PathBuf },
    Failed { index: usize, message: String },
    Cancelled { index: usize },
}

impl CompressionEvent {
    pub fn index(&self) -> usize {
        match self {
            CompressionEvent::Started { index }
            | CompressionEvent::Progress { index, .. }
            | CompressionEvent::Succeeded { index, .. }
            | CompressionEvent::Failed { index, .. }
            | CompressionEvent::Cancelled { index } => *index,
        }
    }

    /// Success, failure or cancellation
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompressionEvent::Started { .. } | CompressionEvent::Progress { .. })
    }
}

/// Sends every callback as a [`CompressionEvent`]; events after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<CompressionEvent>,
}

impl ChannelListener {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CompressionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: CompressionEvent) {
        let _ = self.tx.send(event);
    }
}

impl CompressionListener for ChannelListener {
    fn on_start(&self, index: usize) {
        self.send(CompressionEvent::Started { index });
    }

    fn on_progress(&self, index: usize, percent: f32) {
        self.send(CompressionEvent::Progress { index, percent });
    }

    fn on_success(&self, index: usize, size: u64, path: &Path) {
        self.send(CompressionEvent::Succeeded { index, size, path: path.to_path_buf() });
    }

    fn on_failure(&self, index: usize, message: &str) {
        self.send(CompressionEvent::Failed { index, message: message.to_string() });
    }

    fn on_cancelled(&self, index: usize) {
        self.send(CompressionEvent::Cancelled { index });
    }
}
