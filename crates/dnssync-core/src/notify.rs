//! Built-in notifiers
//!
//! Network sinks (e.g. webhooks) live in their own crates; these two cover
//! the log-only default and composing several sinks.

use std::sync::Arc;
use tracing::error;

use crate::traits::Notifier;

/// Notifier that only writes error log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_sync_failed(&self, server_name: &str, server_type: &str, err: &str) {
        error!("Sync failed: {} ({}): {}", server_name, server_type, err);
    }

    fn notify_hub_unreachable(&self, server_name: &str, server_type: &str, err: &str) {
        error!("Hub unreachable: {} ({}): {}", server_name, server_type, err);
    }
}

/// Forwards every notification to each inner notifier
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are attached
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn notify_sync_failed(&self, server_name: &str, server_type: &str, err: &str) {
        for sink in &self.sinks {
            sink.notify_sync_failed(server_name, server_type, err);
        }
    }

    fn notify_hub_unreachable(&self, server_name: &str, server_type: &str, err: &str) {
        for sink in &self.sinks {
            sink.notify_hub_unreachable(server_name, server_type, err);
        }
    }
}
