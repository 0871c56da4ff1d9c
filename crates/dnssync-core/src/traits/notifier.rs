// # Notifier Trait
//
// Best-effort failure notifications.
//
// Both methods are synchronous and must return immediately: implementations
// that do network I/O spawn it and only log their own failures. A notifier
// can never fail or stall a sync cycle.

/// Trait for notification sinks
pub trait Notifier: Send + Sync {
    /// A spoke sync failed
    fn notify_sync_failed(&self, server_name: &str, server_type: &str, error: &str);

    /// The hub could not be refreshed
    fn notify_hub_unreachable(&self, server_name: &str, server_type: &str, error: &str);
}
