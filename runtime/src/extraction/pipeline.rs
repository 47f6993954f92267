// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! One consultation on a leased, authenticated page.
//!
//! Revalidate, search, classify, then drill into each office under one
//! global deadline. A deadline that expires before classification is an
//! [`ProtestoError::ExtractionTimeout`]; one that expires during drill-down
//! yields a partial result. The detail view is closed after every row.

use super::classify::{classify, SearchOutcome};
use super::parse::{parse_detail, parse_summary, OfficeDetail, StateSection};
use crate::auth::{Authenticator, SessionCheck};
use crate::config::ExtractionLimits;
use crate::error::{ProtestoError, Result};
use crate::portal::PortalProfile;
use crate::renderer::{wait_for_selector, PortalPage};
use crate::types::{
    ConsultationResult, DocumentId, NotaryOfficeRecord, PartialMarker, PartialReason,
    ProviderKind, StateCode,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(200);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// The rendered answer to one search.
struct SearchView {
    outcome: SearchOutcome,
    html: String,
}

pub struct ExtractionPipeline {
    auth: Arc<Authenticator>,
    limits: ExtractionLimits,
}

impl ExtractionPipeline {
    pub fn new(auth: Arc<Authenticator>, limits: ExtractionLimits) -> Self {
        Self { auth, limits }
    }

    fn profile(&self) -> &PortalProfile {
        self.auth.profile()
    }

    pub async fn run(&self, page: &dyn PortalPage, document: &DocumentId) -> Result<ConsultationResult> {
        let started = Instant::now();
        let deadline = started + self.limits.global_deadline;

        let view = match tokio::time::timeout(self.limits.global_deadline, self.search(page, document)).await {
            Ok(view) => view?,
            Err(_) => {
                return Err(ProtestoError::ExtractionTimeout {
                    stage: "search".to_string(),
                })
            }
        };

        match view.outcome {
            SearchOutcome::NoRecords => {
                tracing::info!(document = %document, "portal reports no protests");
                Ok(ConsultationResult::empty(document.clone(), ProviderKind::BrowserPool))
            }
            SearchOutcome::Ambiguous(reason) => Err(ProtestoError::TechnicalSite(reason)),
            SearchOutcome::Found => {
                let sections = parse_summary(&view.html, &self.profile().search)?;
                let seen: usize = sections.iter().map(|s| s.offices.len()).sum();
                if seen == 0 {
                    return Err(ProtestoError::TechnicalSite(
                        "positive title but no office rows rendered".to_string(),
                    ));
                }
                let (by_state, partial) = self.drill_down(page, sections, deadline).await;
                tracing::info!(
                    document = %document,
                    offices = seen,
                    partial = partial.is_some(),
                    "consultation extracted in {}ms",
                    started.elapsed().as_millis()
                );
                Ok(ConsultationResult::new(
                    document.clone(),
                    ProviderKind::BrowserPool,
                    by_state,
                    partial,
                ))
            }
        }
    }

    async fn search(&self, page: &dyn PortalPage, document: &DocumentId) -> Result<SearchView> {
        if self.auth.revalidate(page).await? == SessionCheck::Relogged {
            tracing::info!("page re-authenticated inline before search");
        }

        let profile = self.profile();
        let sel = &profile.search;
        let url = page.current_url().await.map_err(ProtestoError::Browser)?;
        if !profile.is_search_url(&url) {
            page.navigate(&profile.search_url(), self.auth.navigation_timeout())
                .await
                .map_err(ProtestoError::Browser)?;
        }
        let ready = wait_for_selector(page, &sel.document_input, self.auth.navigation_timeout(), POLL)
            .await
            .map_err(ProtestoError::Browser)?;
        if !ready {
            return Err(ProtestoError::TechnicalSite("search form did not render".to_string()));
        }

        page.fill(&sel.document_input, document.as_str())
            .await
            .map_err(ProtestoError::Browser)?;
        page.click(&sel.submit).await.map_err(ProtestoError::Browser)?;

        // A placeholder or a half-rendered answer classifies as ambiguous;
        // only the last snapshot of an exhausted budget is reported as such.
        let mut last_ambiguous: Option<String> = None;
        for attempt in 1..=self.limits.search_poll_attempts.max(1) {
            let body = page
                .query_text(&sel.results_container)
                .await
                .map_err(ProtestoError::Browser)?
                .unwrap_or_default();
            let title = page
                .query_text(&sel.results_title)
                .await
                .map_err(ProtestoError::Browser)?
                .unwrap_or_default();
            if !body.trim().is_empty() || !title.trim().is_empty() {
                match classify(&title, &body, &profile.texts) {
                    SearchOutcome::Ambiguous(reason) => {
                        tracing::debug!(attempt, "results not conclusive yet: {reason}");
                        last_ambiguous = Some(reason);
                    }
                    outcome => {
                        tracing::debug!("results rendered after {attempt} poll(s)");
                        let html = page.content().await.map_err(ProtestoError::Browser)?;
                        return Ok(SearchView { outcome, html });
                    }
                }
            }
            tokio::time::sleep(self.limits.search_poll_interval).await;
        }
        match last_ambiguous {
            Some(reason) => Ok(SearchView {
                outcome: SearchOutcome::Ambiguous(reason),
                html: String::new(),
            }),
            None => Err(ProtestoError::ExtractionTimeout {
                stage: format!(
                    "search results ({} polls)",
                    self.limits.search_poll_attempts
                ),
            }),
        }
    }

    async fn drill_down(
        &self,
        page: &dyn PortalPage,
        sections: Vec<StateSection>,
        deadline: Instant,
    ) -> (BTreeMap<StateCode, Vec<NotaryOfficeRecord>>, Option<PartialMarker>) {
        let seen: usize = sections.iter().map(|s| s.offices.len()).sum();
        let mut by_state: BTreeMap<StateCode, Vec<NotaryOfficeRecord>> = BTreeMap::new();
        let mut processed = 0;
        let mut stop: Option<PartialReason> = None;

        for section in sections {
            let records = by_state.entry(section.state.clone()).or_default();
            for office in section.offices {
                let mut record = NotaryOfficeRecord {
                    name: office.name,
                    city: office.city,
                    address: None,
                    phone: None,
                    title_count: office.title_count,
                    titles: Vec::new(),
                    details_loaded: false,
                };

                if stop.is_none() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if processed >= self.limits.max_offices {
                        stop = Some(PartialReason::OfficeCap);
                    } else if remaining.is_zero() {
                        stop = Some(PartialReason::GlobalDeadline);
                    } else {
                        let budget = self.limits.row_timeout.min(remaining);
                        let loaded =
                            tokio::time::timeout(budget, self.load_detail(page, office.row_index)).await;
                        self.close_detail(page).await;
                        match loaded {
                            Ok(Ok(detail)) => {
                                apply_detail(&mut record, detail);
                                processed += 1;
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(row = office.row_index, "detail view failed: {e}");
                                processed += 1;
                            }
                            Err(_) => {
                                let reason = if budget < self.limits.row_timeout {
                                    PartialReason::GlobalDeadline
                                } else {
                                    PartialReason::RowTimeout
                                };
                                tracing::warn!(
                                    row = office.row_index,
                                    "detail view exceeded its budget ({reason:?}); stopping drill-down"
                                );
                                stop = Some(reason);
                            }
                        }
                    }
                }
                records.push(record);
            }
        }

        let partial = stop.map(|reason| PartialMarker {
            reason,
            offices_processed: processed,
            offices_seen: seen,
        });
        (by_state, partial)
    }

    async fn load_detail(&self, page: &dyn PortalPage, row_index: usize) -> Result<OfficeDetail> {
        let profile = self.profile();
        page.click_nth(&profile.search.detail_button, row_index)
            .await
            .map_err(ProtestoError::Browser)?;
        let open = wait_for_selector(page, &profile.detail.modal, self.limits.row_timeout, POLL)
            .await
            .map_err(ProtestoError::Browser)?;
        if !open {
            return Err(ProtestoError::TechnicalSite(format!(
                "detail view for row {row_index} did not open"
            )));
        }
        let html = page.content().await.map_err(ProtestoError::Browser)?;
        parse_detail(&html, &profile.detail)
    }

    /// Close the detail view if it is open. Never fails; bounded by its own timeout.
    async fn close_detail(&self, page: &dyn PortalPage) {
        let detail = &self.profile().detail;
        let attempt = async {
            if page.count(&detail.modal).await? == 0 {
                return Ok(true);
            }
            page.click(&detail.close_button).await?;
            let deadline = Instant::now() + CLOSE_TIMEOUT;
            while page.count(&detail.modal).await? > 0 {
                if Instant::now() >= deadline {
                    return Ok(false);
                }
                tokio::time::sleep(POLL).await;
            }
            anyhow::Ok(true)
        };
        match tokio::time::timeout(CLOSE_TIMEOUT * 2, attempt).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => tracing::warn!("detail view still open after close"),
            Ok(Err(e)) => tracing::warn!("closing detail view failed: {e:#}"),
            Err(_) => tracing::warn!("closing detail view timed out"),
        }
    }
}

fn apply_detail(record: &mut NotaryOfficeRecord, detail: OfficeDetail) {
    record.address = detail.address;
    record.phone = detail.phone;
    if record.title_count == 0 {
        record.title_count = u32::try_from(detail.titles.len()).unwrap_or(u32::MAX);
    }
    record.titles = detail.titles;
    record.details_loaded = true;
}
