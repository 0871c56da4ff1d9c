//! Sync worker
//!
//! Manual triggers ("sync now", startup bootstrap, signals) go through a
//! [`SyncHandle`]. The handle only enqueues a request and hands back a
//! oneshot receiver; adapter I/O happens on the worker task, never on the
//! caller's path.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::engine::SyncStats;
use crate::error::{Error, Result};
use crate::orchestrator::{CycleReport, HubRefresh, SpokeReport, SyncOrchestrator};

/// A queued sync request
#[derive(Debug)]
pub enum SyncRequest {
    /// Refresh the hub cache only
    RefreshHub {
        reply: oneshot::Sender<HubRefresh>,
    },
    /// Reconcile every enabled spoke from the cache
    SyncAll {
        reply: oneshot::Sender<BTreeMap<String, SpokeReport>>,
    },
    /// Refresh the hub, then reconcile every enabled spoke
    RunCycle {
        reply: oneshot::Sender<CycleReport>,
    },
    /// Refresh the hub, then reconcile one spoke
    SyncSpoke {
        spoke: String,
        reply: oneshot::Sender<Result<Option<SpokeReport>>>,
    },
    /// Remove every record from one spoke
    ClearSpoke {
        spoke: String,
        reply: oneshot::Sender<Result<SyncStats>>,
    },
}

/// Cloneable trigger surface for the worker
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    /// Queue a hub refresh
    pub async fn refresh_hub(&self) -> Result<oneshot::Receiver<HubRefresh>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncRequest::RefreshHub { reply }).await?;
        Ok(rx)
    }

    /// Queue a batch sync from the cache
    pub async fn sync_all(&self) -> Result<oneshot::Receiver<BTreeMap<String, SpokeReport>>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncRequest::SyncAll { reply }).await?;
        Ok(rx)
    }

    /// Queue a full refresh-and-sync cycle
    pub async fn run_cycle(&self) -> Result<oneshot::Receiver<CycleReport>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncRequest::RunCycle { reply }).await?;
        Ok(rx)
    }

    /// Queue a single-spoke sync (with hub refresh)
    pub async fn sync_spoke(
        &self,
        spoke: impl Into<String>,
    ) -> Result<oneshot::Receiver<Result<Option<SpokeReport>>>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncRequest::SyncSpoke {
            spoke: spoke.into(),
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Queue a spoke clear
    pub async fn clear_spoke(
        &self,
        spoke: impl Into<String>,
    ) -> Result<oneshot::Receiver<Result<SyncStats>>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncRequest::ClearSpoke {
            spoke: spoke.into(),
            reply,
        })
        .await?;
        Ok(rx)
    }

    async fn submit(&self, request: SyncRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| Error::Other("Sync worker has stopped".to_string()))
    }
}

/// Task that executes queued requests one at a time
pub struct SyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    requests: ReceiverStream<SyncRequest>,
}

impl SyncWorker {
    /// Create a worker and its handle
    ///
    /// # Parameters
    ///
    /// - `orchestrator`: Shared orchestrator
    /// - `capacity`: Maximum queued requests before `submit` waits
    pub fn new(orchestrator: Arc<SyncOrchestrator>, capacity: usize) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            orchestrator,
            requests: ReceiverStream::new(rx),
        };
        (worker, SyncHandle { tx })
    }

    /// Process requests until every handle is dropped
    pub async fn run(mut self) {
        info!("Sync worker started");
        while let Some(request) = self.requests.next().await {
            self.handle(request).await;
        }
        info!("Sync worker stopped");
    }

    async fn handle(&self, request: SyncRequest) {
        // A dropped receiver means the caller stopped waiting; the work
        // itself still completed.
        match request {
            SyncRequest::RefreshHub { reply } => {
                debug!("Worker: refresh hub");
                let _ = reply.send(self.orchestrator.refresh_hub_cache().await);
            }
            SyncRequest::SyncAll { reply } => {
                debug!("Worker: sync all spokes");
                let _ = reply.send(self.orchestrator.sync_all_enabled_spokes().await);
            }
            SyncRequest::RunCycle { reply } => {
                debug!("Worker: run cycle");
                let _ = reply.send(self.orchestrator.run_cycle().await);
            }
            SyncRequest::SyncSpoke { spoke, reply } => {
                debug!("Worker: sync spoke {}", spoke);
                let _ = reply.send(self.orchestrator.perform_sync(&spoke).await);
            }
            SyncRequest::ClearSpoke { spoke, reply } => {
                debug!("Worker: clear spoke {}", spoke);
                let _ = reply.send(self.orchestrator.clear_spoke(&spoke).await);
            }
        }
    }
}
