// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser-pool provider: lease a page, run the extraction pipeline, release.

use super::ProtestProvider;
use crate::error::Result;
use crate::extraction::ExtractionPipeline;
use crate::pool::{maintenance, PagePool};
use crate::types::{ConsultationResult, DocumentId, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const MAINTENANCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BrowserPoolProvider {
    pool: Arc<PagePool>,
    pipeline: ExtractionPipeline,
    shutdown: Arc<Notify>,
    maintenance: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BrowserPoolProvider {
    pub fn new(pool: Arc<PagePool>, pipeline: ExtractionPipeline) -> Self {
        Self {
            pool,
            pipeline,
            shutdown: Arc::new(Notify::new()),
            maintenance: std::sync::Mutex::new(None),
        }
    }

    fn take_maintenance(&self) -> Option<JoinHandle<()>> {
        self.maintenance.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl ProtestProvider for BrowserPoolProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BrowserPool
    }

    async fn initialize(&self) -> Result<()> {
        self.pool.initialize().await?;
        if let Ok(mut slot) = self.maintenance.lock() {
            if slot.is_none() {
                *slot = Some(maintenance::spawn(
                    Arc::downgrade(&self.pool),
                    self.pool.config().keepalive_interval,
                    Arc::clone(&self.shutdown),
                ));
            }
        }
        Ok(())
    }

    async fn consult(&self, document: &DocumentId) -> Result<ConsultationResult> {
        let lease = self.pool.lease(self.pool.config().lease_timeout).await?;
        tracing::debug!(
            handle = lease.id(),
            usage = lease.usage_count(),
            "running extraction on leased page"
        );
        let result = self.pipeline.run(lease.page(), document).await;
        lease.release().await;
        result
    }

    async fn cleanup(&self) {
        if let Some(handle) = self.take_maintenance() {
            self.shutdown.notify_one();
            let abort = handle.abort_handle();
            if tokio::time::timeout(MAINTENANCE_STOP_TIMEOUT, handle).await.is_err() {
                tracing::warn!("keep-alive loop did not stop in time; aborting it");
                abort.abort();
            }
        }
        self.pool.close().await;
    }
}
