// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition providers and the selector that falls back between them.
//!
//! The official API, when configured, is tried first; the browser pool is
//! the provider of last resort and never falls back to the API.

pub mod api;
pub mod browser;
pub mod http;

use crate::error::{ConsultError, ProtestoError, Result};
use crate::types::{ConsultationResult, DocumentId, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;

/// One acquisition strategy.
#[async_trait]
pub trait ProtestProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn initialize(&self) -> Result<()>;

    async fn consult(&self, document: &DocumentId) -> Result<ConsultationResult>;

    async fn cleanup(&self);
}

/// Holds zero or one provider of each kind; one is active.
pub struct ProviderSelector {
    api: Option<Arc<dyn ProtestProvider>>,
    browser: Option<Arc<dyn ProtestProvider>>,
    active: ProviderKind,
}

impl ProviderSelector {
    /// The API is active whenever it is configured.
    pub fn new(
        api: Option<Arc<dyn ProtestProvider>>,
        browser: Option<Arc<dyn ProtestProvider>>,
    ) -> Result<Self> {
        let active = match (&api, &browser) {
            (Some(_), _) => ProviderKind::OfficialApi,
            (None, Some(_)) => ProviderKind::BrowserPool,
            (None, None) => {
                return Err(ProtestoError::Config(
                    "at least one provider must be configured".to_string(),
                ))
            }
        };
        Ok(Self {
            api,
            browser,
            active,
        })
    }

    pub fn active(&self) -> ProviderKind {
        self.active
    }

    pub fn has_fallback(&self) -> bool {
        self.active == ProviderKind::OfficialApi && self.browser.is_some()
    }

    fn provider(&self, kind: ProviderKind) -> Option<&Arc<dyn ProtestProvider>> {
        match kind {
            ProviderKind::OfficialApi => self.api.as_ref(),
            ProviderKind::BrowserPool => self.browser.as_ref(),
        }
    }

    fn configured(&self) -> impl Iterator<Item = &Arc<dyn ProtestProvider>> {
        self.api.iter().chain(self.browser.iter())
    }

    pub async fn initialize(&self) -> Result<()> {
        for provider in self.configured() {
            provider.initialize().await?;
            tracing::info!(provider = %provider.kind(), "provider initialized");
        }
        Ok(())
    }

    pub async fn cleanup(&self) {
        for provider in self.configured() {
            provider.cleanup().await;
        }
    }

    /// Consult the active provider, falling back to the browser pool once.
    pub async fn consult(
        &self,
        document: &DocumentId,
    ) -> std::result::Result<ConsultationResult, ConsultError> {
        let Some(primary) = self.provider(self.active) else {
            return Err(ConsultError::new(
                self.active,
                ProtestoError::Config("active provider missing".to_string()),
            ));
        };

        let primary_err = match primary.consult(document).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let fallback = match (&self.browser, self.has_fallback()) {
            (Some(browser), true) if primary_err.allows_fallback() => browser,
            _ => return Err(ConsultError::new(self.active, primary_err)),
        };

        tracing::warn!(
            from = %self.active,
            to = %ProviderKind::BrowserPool,
            kind = primary_err.kind(),
            "primary provider failed ({primary_err}); falling back"
        );
        match fallback.consult(document).await {
            Ok(result) => Ok(result.with_fallback_from(self.active)),
            Err(fallback_err) => Err(ConsultError::new(
                ProviderKind::BrowserPool,
                ProtestoError::FallbackExhausted {
                    primary: Box::new(ConsultError::new(self.active, primary_err)),
                    fallback: Box::new(ConsultError::new(ProviderKind::BrowserPool, fallback_err)),
                },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: ProviderKind,
        fail_with: Option<fn() -> ProtestoError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_with: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: ProviderKind, err: fn() -> ProtestoError) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_with: Some(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProtestProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn consult(&self, document: &DocumentId) -> Result<ConsultationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(err) => Err(err()),
                None => Ok(ConsultationResult::empty(document.clone(), self.kind)),
            }
        }

        async fn cleanup(&self) {}
    }

    fn doc() -> DocumentId {
        DocumentId::parse("11222333000181").unwrap()
    }

    fn schema_error() -> ProtestoError {
        ProtestoError::Provider("missing field has_protests".into())
    }

    fn site_error() -> ProtestoError {
        ProtestoError::TechnicalSite("title only".into())
    }

    #[tokio::test]
    async fn test_api_failure_falls_back_to_browser() {
        let api = Scripted::failing(ProviderKind::OfficialApi, schema_error);
        let browser = Scripted::ok(ProviderKind::BrowserPool);
        let selector = ProviderSelector::new(Some(api.clone() as _), Some(browser.clone() as _)).unwrap();

        let result = selector.consult(&doc()).await.unwrap();
        assert_eq!(result.provider_used(), ProviderKind::BrowserPool);
        assert_eq!(result.fallback_from(), Some(ProviderKind::OfficialApi));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_browser_never_falls_back_to_api() {
        let browser = Scripted::failing(ProviderKind::BrowserPool, site_error);
        let selector = ProviderSelector::new(None, Some(browser as _)).unwrap();

        let err = selector.consult(&doc()).await.unwrap_err();
        assert_eq!(err.provider, ProviderKind::BrowserPool);
        assert_eq!(err.kind(), "technical_site");
    }

    #[tokio::test]
    async fn test_single_api_error_propagates_unchanged() {
        let api = Scripted::failing(ProviderKind::OfficialApi, schema_error);
        let selector = ProviderSelector::new(Some(api as _), None).unwrap();

        let err = selector.consult(&doc()).await.unwrap_err();
        assert_eq!(err.provider, ProviderKind::OfficialApi);
        assert_eq!(err.kind(), "provider");
    }

    #[tokio::test]
    async fn test_both_failing_is_fallback_exhausted() {
        let api = Scripted::failing(ProviderKind::OfficialApi, schema_error);
        let browser = Scripted::failing(ProviderKind::BrowserPool, site_error);
        let selector = ProviderSelector::new(Some(api as _), Some(browser as _)).unwrap();

        let err = selector.consult(&doc()).await.unwrap_err();
        match err.error {
            ProtestoError::FallbackExhausted { primary, fallback } => {
                assert_eq!(primary.provider, ProviderKind::OfficialApi);
                assert_eq!(fallback.kind(), "technical_site");
            }
            other => panic!("expected FallbackExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_selector_requires_a_provider() {
        assert!(ProviderSelector::new(None, None).is_err());
    }
}
