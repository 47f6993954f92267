// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing engine: lifecycle, consultation, pool health.

use crate::auth::Authenticator;
use crate::config::EngineConfig;
use crate::error::{ConsultError, ProtestoError, Result};
use crate::extraction::ExtractionPipeline;
use crate::mail::imap::ImapMailbox;
use crate::mail::Mailbox;
use crate::otp::extract::CodeExtractor;
use crate::otp::OtpChannel;
use crate::pool::PagePool;
use crate::portal::PortalProfile;
use crate::provider::api::OfficialApiClient;
use crate::provider::browser::BrowserPoolProvider;
use crate::provider::{ProtestProvider, ProviderSelector};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::PageFactory;
use crate::types::{ConsultationResult, DocumentId, PoolStatus, ProviderKind};
use std::sync::Arc;

pub struct ProtestEngine {
    selector: ProviderSelector,
    pool: Option<Arc<PagePool>>,
    api: Option<Arc<OfficialApiClient>>,
    mailbox: Arc<dyn Mailbox>,
}

impl ProtestEngine {
    /// Production wiring: IMAP mailbox, and Chromium when the browser pool is enabled.
    pub async fn build(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(config.mailbox.clone()));
        let factory: Option<Arc<dyn PageFactory>> = if config.provider.uses_browser() {
            let renderer = ChromiumRenderer::launch(&config.portal)
                .await
                .map_err(ProtestoError::Browser)?;
            Some(Arc::new(renderer))
        } else {
            None
        };
        Self::from_parts(config, factory, mailbox)
    }

    /// Wire an engine from explicit capabilities.
    ///
    /// `factory` is required when the configured mode uses the browser pool.
    pub fn from_parts(
        config: EngineConfig,
        factory: Option<Arc<dyn PageFactory>>,
        mailbox: Arc<dyn Mailbox>,
    ) -> Result<Self> {
        let profile = Arc::new(PortalProfile::new(&config.portal.base_url));
        let otp = Arc::new(OtpChannel::new(
            Arc::clone(&mailbox),
            CodeExtractor::for_portal(&profile.texts),
            &config.mailbox,
        ));

        let api = if config.provider.uses_api() {
            Some(Arc::new(OfficialApiClient::new(
                &config.api,
                &config.portal.login_document,
                Arc::clone(&otp),
                config.otp.clone(),
            )?))
        } else {
            None
        };

        let (pool, browser) = if config.provider.uses_browser() {
            let factory = factory.ok_or_else(|| {
                ProtestoError::Config("browser provider needs a page factory".to_string())
            })?;
            let auth = Arc::new(Authenticator::new(
                Arc::clone(&profile),
                Arc::clone(&otp),
                config.otp.clone(),
                &config.portal,
            ));
            let pool = PagePool::new(factory, Arc::clone(&auth), config.pool.clone());
            let pipeline = ExtractionPipeline::new(auth, config.extraction.clone());
            let provider = Arc::new(BrowserPoolProvider::new(Arc::clone(&pool), pipeline));
            (Some(pool), Some(provider))
        } else {
            (None, None)
        };

        let selector = ProviderSelector::new(
            api.clone().map(|a| a as Arc<dyn ProtestProvider>),
            browser.map(|b| b as Arc<dyn ProtestProvider>),
        )?;
        tracing::info!(
            mode = config.provider.as_str(),
            active = %selector.active(),
            fallback = selector.has_fallback(),
            "engine wired"
        );

        Ok(Self {
            selector,
            pool,
            api,
            mailbox,
        })
    }

    /// Connect the mailbox and bring every provider up.
    pub async fn initialize(&self) -> Result<()> {
        self.mailbox.connect().await.map_err(ProtestoError::Mailbox)?;
        self.selector.initialize().await
    }

    /// Look up protests for `document`.
    pub async fn consult(&self, document: &str) -> std::result::Result<ConsultationResult, ConsultError> {
        let document =
            DocumentId::parse(document).map_err(|e| ConsultError::new(self.selector.active(), e))?;
        let result = self.selector.consult(&document).await;
        match &result {
            Ok(r) => tracing::info!(
                document = %document,
                provider = %r.provider_used(),
                offices = r.office_count(),
                "consultation finished"
            ),
            Err(e) => tracing::warn!(document = %document, kind = e.kind(), "consultation failed: {e}"),
        }
        result
    }

    pub fn active_provider(&self) -> ProviderKind {
        self.selector.active()
    }

    /// Pool snapshot, or `None` when the browser pool is not configured.
    pub async fn pool_status(&self) -> Option<PoolStatus> {
        match &self.pool {
            Some(pool) => Some(pool.status().await),
            None => None,
        }
    }

    /// Force a fresh login: rebuild the page pool and drop any API token.
    pub async fn renew_session(&self) -> Result<()> {
        if let Some(api) = &self.api {
            api.reset().await;
        }
        match &self.pool {
            Some(pool) => pool.renew_session().await,
            None => Ok(()),
        }
    }

    pub async fn cleanup(&self) {
        self.selector.cleanup().await;
        if let Err(e) = self.mailbox.disconnect().await {
            tracing::debug!("mailbox disconnect failed: {e:#}");
        }
        tracing::info!("engine stopped");
    }
}
