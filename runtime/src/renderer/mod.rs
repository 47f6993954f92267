// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Automation driver capability.
//!
//! Defines the `PageFactory` and `PortalPage` traits the engine depends on.
//! The only production implementation drives Chromium via chromiumoxide;
//! tests supply scripted fakes.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open pages.
#[async_trait]
pub trait PageFactory: Send + Sync {
    /// Open a new tab.
    async fn new_page(&self) -> Result<Arc<dyn PortalPage>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open pages.
    fn active_pages(&self) -> usize;
}

/// One browser tab.
///
/// Methods take `&self`: a page is shared behind an `Arc` between the pool
/// and whoever holds its lease, and the pool guarantees a single user at a time.
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Replace the value of the input matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;
    /// Click the `index`-th element matching `selector`.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;
    /// Visible text of the first element matching `selector`, if any.
    async fn query_text(&self, selector: &str) -> Result<Option<String>>;
    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;
    /// Full page HTML.
    async fn content(&self) -> Result<String>;
    /// Current URL.
    async fn current_url(&self) -> Result<String>;
    /// Wait until the page stops loading.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<()>;
    /// Reload the current document.
    async fn reload(&self, timeout: Duration) -> Result<()>;
    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Close the tab.
    async fn close(&self) -> Result<()>;
}

/// Poll until `selector` matches at least one element or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout; driver errors propagate.
pub async fn wait_for_selector(
    page: &dyn PortalPage,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.count(selector).await? > 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}
