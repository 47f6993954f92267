// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded pool of authenticated portal pages.
//!
//! Pages are created lazily, one login per page, up to `capacity`. A caller
//! leases a page, uses it exclusively, and hands it back through
//! [`Lease::release`]. Once the shared login outlives the freshness window the
//! whole pool is torn down and rebuilt before any further lease is granted.

pub mod maintenance;

use crate::auth::Authenticator;
use crate::config::PoolConfig;
use crate::error::{AuthStep, ProtestoError, Result};
use crate::renderer::{PageFactory, PortalPage};
use crate::types::PoolStatus;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// One browser tab bound to one authenticated portal session.
struct PageHandle {
    page: Arc<dyn PortalPage>,
    created_at: Instant,
    usage_count: u64,
    logged_in: bool,
    last_used_at: Option<Instant>,
    last_refreshed_at: Option<Instant>,
    generation: u64,
}

/// Read-only view of one handle.
#[derive(Debug, Clone, Serialize)]
pub struct HandleInfo {
    pub id: u64,
    pub usage_count: u64,
    pub leased: bool,
    pub logged_in: bool,
    pub age_secs: u64,
    pub idle_secs: Option<u64>,
    pub refreshed_secs_ago: Option<u64>,
}

/// Outcome of one keep-alive pass over the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub skipped_leased: usize,
    pub failed: usize,
}

/// What happened to one handle during keep-alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    SkippedLeased,
    Failed,
    /// The handle is gone or mid-refresh elsewhere.
    Missing,
}

#[derive(Default)]
struct PoolState {
    handles: HashMap<u64, PageHandle>,
    idle: VecDeque<u64>,
    leased: HashSet<u64>,
    refreshing: HashSet<u64>,
    /// Enrolled handles plus in-flight creations.
    created: usize,
    last_login_at: Option<Instant>,
    generation: u64,
    rebuilding: bool,
    closed: bool,
}

enum Step {
    Ready(Lease),
    Create(u64),
    Wait,
}

pub struct PagePool {
    factory: Arc<dyn PageFactory>,
    auth: Arc<Authenticator>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    returned: Notify,
    rebuild: Mutex<()>,
    next_id: AtomicU64,
}

impl PagePool {
    pub fn new(
        factory: Arc<dyn PageFactory>,
        auth: Arc<Authenticator>,
        config: PoolConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            auth,
            config,
            state: Mutex::new(PoolState::default()),
            returned: Notify::new(),
            rebuild: Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    /// Log in one page and enroll it as the pool's only handle.
    ///
    /// The remaining capacity is filled lazily by [`lease`](Self::lease).
    pub async fn initialize(&self) -> Result<()> {
        let _rebuild = self.rebuild.lock().await;
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(ProtestoError::PoolClosed);
            }
            if !state.handles.is_empty() {
                return Ok(());
            }
        }
        self.seed().await
    }

    async fn seed(&self) -> Result<()> {
        let generation = {
            let mut state = self.state.lock().await;
            state.created += 1;
            state.generation
        };
        let page = match self.open_logged_in().await {
            Ok(page) => page,
            Err(e) => {
                self.abandon_slot().await;
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().await;
            state.handles.insert(id, PageHandle::new(page, generation));
            state.idle.push_back(id);
            state.last_login_at = Some(Instant::now());
        }
        self.returned.notify_waiters();
        tracing::info!(
            handle = id,
            capacity = self.config.capacity,
            "page pool initialized with one logged-in page"
        );
        Ok(())
    }

    async fn open_logged_in(&self) -> Result<Arc<dyn PortalPage>> {
        let page = self.factory.new_page().await.map_err(ProtestoError::Browser)?;
        if let Err(e) = self.auth.login(page.as_ref()).await {
            if let Err(close_err) = page.close().await {
                tracing::debug!("closing page after failed login: {close_err:#}");
            }
            return Err(e);
        }
        Ok(page)
    }

    async fn abandon_slot(&self) {
        {
            let mut state = self.state.lock().await;
            state.created = state.created.saturating_sub(1);
        }
        self.returned.notify_waiters();
    }

    /// Lease a page for exclusive use, waiting up to `timeout`.
    ///
    /// Returns an idle page when one exists, otherwise logs in a new page
    /// while under capacity, otherwise waits for a release.
    ///
    /// `timeout` bounds only the wait for a release. A stale-session rebuild
    /// or a new page's login runs to completion under its own step and OTP
    /// timeouts; abandoning either midway would leave the pool half torn down.
    pub async fn lease(self: &Arc<Self>, timeout: Duration) -> Result<Lease> {
        let started = Instant::now();
        let deadline = started + timeout;
        self.ensure_logged_in().await?;

        loop {
            let mut notified = pin!(self.returned.notified());
            notified.as_mut().enable();

            let step = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(ProtestoError::PoolClosed);
                }
                if state.rebuilding {
                    Step::Wait
                } else if let Some(id) = state.idle.pop_front() {
                    match self.grant(&mut state, id) {
                        Some(lease) => Step::Ready(lease),
                        None => continue,
                    }
                } else if state.created < self.config.capacity {
                    state.created += 1;
                    Step::Create(state.generation)
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Ready(lease) => {
                    tracing::debug!(handle = lease.id, "leased idle page");
                    return Ok(lease);
                }
                Step::Create(generation) => {
                    if let Some(lease) = self.grow(generation).await? {
                        return Ok(lease);
                    }
                }
                Step::Wait => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero()
                        || tokio::time::timeout(remaining, notified).await.is_err()
                    {
                        return Err(ProtestoError::PoolTimeout {
                            waited: started.elapsed(),
                            capacity: self.config.capacity,
                        });
                    }
                }
            }
        }
    }

    fn grant(self: &Arc<Self>, state: &mut PoolState, id: u64) -> Option<Lease> {
        let handle = state.handles.get_mut(&id)?;
        handle.usage_count += 1;
        handle.last_used_at = Some(Instant::now());
        let lease = Lease {
            pool: Arc::clone(self),
            id,
            page: Arc::clone(&handle.page),
            usage_count: handle.usage_count,
            generation: handle.generation,
            released: false,
        };
        state.leased.insert(id);
        Some(lease)
    }

    /// Log in one more page and hand it out already leased.
    ///
    /// Returns `Ok(None)` when the pool was rebuilt while the login ran; the
    /// page is discarded and the caller retries against the new generation.
    async fn grow(self: &Arc<Self>, generation: u64) -> Result<Option<Lease>> {
        tracing::info!("no idle page; logging in a new page");
        let page = match self.open_logged_in().await {
            Ok(page) => page,
            Err(e) => {
                self.abandon_slot().await;
                return Err(as_authentication(e));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        if state.closed || state.generation != generation {
            state.created = state.created.saturating_sub(1);
            let closed = state.closed;
            drop(state);
            self.returned.notify_waiters();
            if let Err(e) = page.close().await {
                tracing::debug!("closing superseded page: {e:#}");
            }
            return if closed {
                Err(ProtestoError::PoolClosed)
            } else {
                Ok(None)
            };
        }
        state.handles.insert(id, PageHandle::new(page, generation));
        if state.last_login_at.is_none() {
            state.last_login_at = Some(Instant::now());
        }
        let lease = self.grant(&mut state, id).ok_or_else(|| {
            ProtestoError::Browser(anyhow::anyhow!("page {id} vanished while being enrolled"))
        })?;
        tracing::info!(
            handle = id,
            created = state.created,
            capacity = self.config.capacity,
            "pool grew by one page"
        );
        Ok(Some(lease))
    }

    /// Park a leased page on the home view and make it idle again.
    async fn release_handle(&self, id: u64) {
        let page = {
            let state = self.state.lock().await;
            state.handles.get(&id).map(|h| Arc::clone(&h.page))
        };
        if let Some(page) = page {
            let home = self.auth.profile().home_url();
            let timeout = self.auth.navigation_timeout();
            match tokio::time::timeout(timeout, page.navigate(&home, timeout)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(handle = id, "could not park page at home: {e:#}"),
                Err(_) => tracing::warn!(handle = id, "parking page at home timed out"),
            }
        }

        {
            let mut state = self.state.lock().await;
            if state.leased.remove(&id) && state.handles.contains_key(&id) {
                state.idle.push_back(id);
                if let Some(handle) = state.handles.get_mut(&id) {
                    handle.last_used_at = Some(Instant::now());
                }
            }
        }
        self.returned.notify_waiters();
        tracing::debug!(handle = id, "page released");
    }

    /// Rebuild the pool if the shared login has gone stale.
    pub async fn ensure_logged_in(&self) -> Result<()> {
        if !self.is_stale().await? {
            return Ok(());
        }
        let _rebuild = self.rebuild.lock().await;
        if !self.is_stale().await? {
            return Ok(());
        }
        tracing::info!(
            "session older than {:?}; rebuilding page pool",
            self.config.freshness_window
        );
        self.teardown().await;
        self.seed().await
    }

    async fn is_stale(&self) -> Result<bool> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(ProtestoError::PoolClosed);
        }
        Ok(state
            .last_login_at
            .is_some_and(|at| at.elapsed() >= self.config.freshness_window))
    }

    /// Tear down every page and log in from scratch.
    pub async fn renew_session(&self) -> Result<()> {
        let _rebuild = self.rebuild.lock().await;
        if self.state.lock().await.closed {
            return Err(ProtestoError::PoolClosed);
        }
        tracing::info!("session renewal requested; rebuilding page pool");
        self.teardown().await;
        self.seed().await
    }

    /// Close every handle; leased ones get `drain_timeout` to come back first.
    async fn teardown(&self) {
        let idle_pages = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.rebuilding = true;
            let idle: Vec<u64> = state.idle.drain(..).collect();
            let pages: Vec<_> = idle
                .iter()
                .filter_map(|id| state.handles.remove(id).map(|h| h.page))
                .collect();
            state.created = state.created.saturating_sub(pages.len());
            pages
        };
        close_all(idle_pages).await;

        let drain_deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let mut notified = pin!(self.returned.notified());
            notified.as_mut().enable();
            let outstanding = {
                let state = self.state.lock().await;
                state.leased.len() + state.refreshing.len()
            };
            if outstanding == 0 {
                break;
            }
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                tracing::warn!("{outstanding} page(s) still in use after drain timeout; closing them");
                break;
            }
        }

        let remaining_pages = {
            let mut state = self.state.lock().await;
            let pages: Vec<_> = state.handles.drain().map(|(_, h)| h.page).collect();
            state.created = state.created.saturating_sub(pages.len());
            state.idle.clear();
            state.leased.clear();
            state.refreshing.clear();
            state.last_login_at = None;
            state.rebuilding = false;
            pages
        };
        close_all(remaining_pages).await;
        self.returned.notify_waiters();
    }

    /// Keep one idle handle alive by navigating it to the home view.
    ///
    /// The handle is taken out of the idle queue under the lock, after
    /// re-checking that nobody leased it, so a lease cannot grab it mid-refresh.
    pub async fn refresh_if_idle(&self, id: u64) -> RefreshOutcome {
        let page = {
            let mut state = self.state.lock().await;
            if state.leased.contains(&id) || state.rebuilding {
                return RefreshOutcome::SkippedLeased;
            }
            let Some(pos) = state.idle.iter().position(|&idle| idle == id) else {
                return RefreshOutcome::Missing;
            };
            state.idle.remove(pos);
            state.refreshing.insert(id);
            match state.handles.get(&id) {
                Some(handle) => Arc::clone(&handle.page),
                None => {
                    state.refreshing.remove(&id);
                    return RefreshOutcome::Missing;
                }
            }
        };

        let profile = self.auth.profile();
        let timeout = self.auth.navigation_timeout();
        let outcome = match tokio::time::timeout(timeout, page.navigate(&profile.home_url(), timeout)).await
        {
            Ok(Ok(nav)) if profile.is_login_url(&nav.final_url) => {
                tracing::warn!(handle = id, "keep-alive found the page logged out");
                Err(false)
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(handle = id, "keep-alive navigation failed: {e:#}");
                Err(true)
            }
            Err(_) => {
                tracing::warn!(handle = id, "keep-alive navigation timed out");
                Err(true)
            }
        };

        {
            let mut state = self.state.lock().await;
            state.refreshing.remove(&id);
            if let Some(handle) = state.handles.get_mut(&id) {
                match outcome {
                    Ok(()) => {
                        handle.logged_in = true;
                        handle.last_refreshed_at = Some(Instant::now());
                    }
                    Err(still_logged_in) => handle.logged_in &= still_logged_in,
                }
                state.idle.push_back(id);
            }
        }
        self.returned.notify_waiters();

        match outcome {
            Ok(()) => RefreshOutcome::Refreshed,
            Err(_) => RefreshOutcome::Failed,
        }
    }

    /// One keep-alive pass over every handle.
    pub async fn refresh_idle_handles(&self) -> RefreshReport {
        let ids: Vec<u64> = {
            let state = self.state.lock().await;
            let mut ids: Vec<u64> = state.handles.keys().copied().collect();
            ids.sort_unstable();
            ids
        };
        let mut report = RefreshReport::default();
        for id in ids {
            match self.refresh_if_idle(id).await {
                RefreshOutcome::Refreshed => report.refreshed += 1,
                RefreshOutcome::SkippedLeased => report.skipped_leased += 1,
                RefreshOutcome::Failed => report.failed += 1,
                RefreshOutcome::Missing => {}
            }
        }
        report
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let mut leased_ids: Vec<u64> = state.leased.iter().copied().collect();
        leased_ids.sort_unstable();
        let session_age = state.last_login_at.map(|at| at.elapsed());
        PoolStatus {
            capacity: self.config.capacity,
            created: state.created,
            idle_count: state.idle.len(),
            leased_ids,
            session_age_secs: session_age.map(|age| age.as_secs()),
            fresh: session_age.is_some_and(|age| age < self.config.freshness_window),
        }
    }

    pub async fn handle_info(&self, id: u64) -> Option<HandleInfo> {
        let state = self.state.lock().await;
        let handle = state.handles.get(&id)?;
        Some(HandleInfo {
            id,
            usage_count: handle.usage_count,
            leased: state.leased.contains(&id),
            logged_in: handle.logged_in,
            age_secs: handle.created_at.elapsed().as_secs(),
            idle_secs: handle.last_used_at.map(|at| at.elapsed().as_secs()),
            refreshed_secs_ago: handle.last_refreshed_at.map(|at| at.elapsed().as_secs()),
        })
    }

    /// Close every page and refuse further leases.
    pub async fn close(&self) {
        let pages = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.clear();
            state.leased.clear();
            state.refreshing.clear();
            state.created = 0;
            state.last_login_at = None;
            state.handles.drain().map(|(_, h)| h.page).collect::<Vec<_>>()
        };
        let count = pages.len();
        close_all(pages).await;
        self.returned.notify_waiters();
        if let Err(e) = self.factory.shutdown().await {
            tracing::warn!("browser shutdown failed: {e:#}");
        }
        tracing::info!("page pool closed ({count} page(s))");
    }
}

impl PageHandle {
    fn new(page: Arc<dyn PortalPage>, generation: u64) -> Self {
        Self {
            page,
            created_at: Instant::now(),
            usage_count: 0,
            logged_in: true,
            last_used_at: None,
            last_refreshed_at: None,
            generation,
        }
    }
}

async fn close_all(pages: Vec<Arc<dyn PortalPage>>) {
    for page in pages {
        if let Err(e) = page.close().await {
            tracing::debug!("page close failed: {e:#}");
        }
    }
}

/// A login failure during lazy growth always surfaces as an authentication error.
fn as_authentication(err: ProtestoError) -> ProtestoError {
    match err {
        e @ ProtestoError::Authentication { .. } => e,
        e @ (ProtestoError::OtpTimeout { .. } | ProtestoError::OtpInvalid { .. }) => {
            ProtestoError::auth(AuthStep::OtpValidation, e.to_string())
        }
        e @ ProtestoError::PoolClosed => e,
        e => ProtestoError::auth(AuthStep::Start, e.to_string()),
    }
}

/// Exclusive use of one pooled page.
///
/// Call [`release`](Self::release) when done. A lease dropped without it is
/// released on a background task.
pub struct Lease {
    pool: Arc<PagePool>,
    id: u64,
    page: Arc<dyn PortalPage>,
    usage_count: u64,
    generation: u64,
    released: bool,
}

impl Lease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> &dyn PortalPage {
        self.page.as_ref()
    }

    /// Times this handle has been leased, this lease included.
    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub async fn release(mut self) {
        self.released = true;
        self.pool.release_handle(self.id).await;
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("usage_count", &self.usage_count)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let pool = Arc::clone(&self.pool);
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                tracing::debug!(handle = id, "lease dropped without release; releasing in background");
                rt.spawn(async move { pool.release_handle(id).await });
            }
            Err(_) => tracing::warn!(handle = id, "lease dropped outside a runtime; page stays leased"),
        }
    }
}
