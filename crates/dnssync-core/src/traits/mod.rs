//! Core traits for the DNS sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ServerAdapter`]: Read and mutate one DNS-admin server's rewrite records
//! - [`SyncStore`]: Authoritative cache, spoke state and sync history
//! - [`CredentialStore`]: Secret lookup for adapter auth fields
//! - [`Notifier`]: Fire-and-forget failure notifications

pub mod credential_store;
pub mod notifier;
pub mod server_adapter;
pub mod sync_store;

pub use credential_store::CredentialStore;
pub use notifier::Notifier;
pub use server_adapter::{AdapterContext, ServerAdapter, ServerAdapterFactory};
pub use sync_store::{Snapshot, SyncRun, SyncStatus, SyncStore};
