// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Keep-alive loop for idle pool pages.
//!
//! Runs until shutdown is signaled or the pool is dropped.

use super::PagePool;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// Spawn the keep-alive loop.
///
/// Holds only a weak reference so a dropped pool ends the loop on the next tick.
pub fn spawn(
    pool: Weak<PagePool>,
    every: Duration,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("pool keep-alive started: every={}s", every.as_secs());
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("pool keep-alive stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(pool) = pool.upgrade() else {
                        tracing::debug!("pool dropped; keep-alive exiting");
                        break;
                    };
                    tick_count = tick_count.saturating_add(1);
                    let report = pool.refresh_idle_handles().await;
                    if report.failed > 0 {
                        tracing::warn!(
                            "keep-alive tick {tick_count}: refreshed={} skipped_leased={} failed={}",
                            report.refreshed,
                            report.skipped_leased,
                            report.failed
                        );
                    } else {
                        tracing::debug!(
                            "keep-alive tick {tick_count}: refreshed={} skipped_leased={}",
                            report.refreshed,
                            report.skipped_leased
                        );
                    }
                }
            }
        }
    })
}
