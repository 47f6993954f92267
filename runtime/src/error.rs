// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the lookup engine.
//!
//! Every failure a caller can observe maps to one [`ProtestoError`] variant.
//! Failures that leave the provider layer are wrapped in [`ConsultError`] so
//! the provider that produced them travels with the error.

use crate::types::ProviderKind;
use std::time::Duration;

/// Login step at which an authentication run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    /// Opening the login page and locating the document field.
    Start,
    /// Submitting the login document.
    DocumentEntry,
    /// Ticking the account-holder confirmation.
    TitularConfirmation,
    /// Requesting the email code.
    ChallengeTrigger,
    /// Submitting the code and waiting for the dashboard.
    OtpValidation,
    /// Token exchange against the official API.
    TokenExchange,
}

impl AuthStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::DocumentEntry => "document_entry",
            Self::TitularConfirmation => "titular_confirmation",
            Self::ChallengeTrigger => "challenge_trigger",
            Self::OtpValidation => "otp_validation",
            Self::TokenExchange => "token_exchange",
        }
    }
}

impl std::fmt::Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors the engine can produce.
#[derive(thiserror::Error, Debug)]
pub enum ProtestoError {
    #[error("authentication failed at {step}: {reason}")]
    Authentication { step: AuthStep, reason: String },

    #[error("no OTP code arrived within {waited:?}")]
    OtpTimeout { waited: Duration },

    #[error("portal rejected OTP code on attempt {attempt}")]
    OtpInvalid { attempt: u32 },

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("no page available within {waited:?} (capacity {capacity})")]
    PoolTimeout { waited: Duration, capacity: usize },

    #[error("page pool is closed")]
    PoolClosed,

    #[error("technical site error: {0}")]
    TechnicalSite(String),

    #[error("extraction exceeded its deadline during {stage}")]
    ExtractionTimeout { stage: String },

    #[error("provider returned an unexpected response: {0}")]
    Provider(String),

    #[error("all providers failed: {primary}; fallback: {fallback}")]
    FallbackExhausted {
        primary: Box<ConsultError>,
        fallback: Box<ConsultError>,
    },

    #[error("invalid document id: {0}")]
    InvalidDocument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("browser error: {0:#}")]
    Browser(anyhow::Error),

    #[error("mailbox error: {0:#}")]
    Mailbox(anyhow::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProtestoError {
    /// Stable tag for logs and external status mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::OtpTimeout { .. } => "otp_timeout",
            Self::OtpInvalid { .. } => "otp_invalid",
            Self::SessionExpired(_) => "session_expired",
            Self::PoolTimeout { .. } => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::TechnicalSite(_) => "technical_site",
            Self::ExtractionTimeout { .. } => "extraction_timeout",
            Self::Provider(_) => "provider",
            Self::FallbackExhausted { .. } => "fallback_exhausted",
            Self::InvalidDocument(_) => "invalid_document",
            Self::Config(_) => "config",
            Self::Browser(_) => "browser",
            Self::Mailbox(_) => "mailbox",
            Self::Http(_) => "http",
        }
    }

    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::OtpTimeout { .. }
                | Self::SessionExpired(_)
                | Self::PoolTimeout { .. }
                | Self::TechnicalSite(_)
                | Self::ExtractionTimeout { .. }
                | Self::Browser(_)
                | Self::Mailbox(_)
                | Self::Http(_)
        )
    }

    /// Whether a hybrid selector may try the other provider after this error.
    ///
    /// Caller mistakes are not worth a second provider round-trip.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, Self::InvalidDocument(_) | Self::Config(_))
    }

    pub(crate) fn auth(step: AuthStep, reason: impl Into<String>) -> Self {
        Self::Authentication {
            step,
            reason: reason.into(),
        }
    }
}

/// A failure tagged with the provider that produced it.
#[derive(thiserror::Error, Debug)]
#[error("[{provider}] {error}")]
pub struct ConsultError {
    pub provider: ProviderKind,
    #[source]
    pub error: ProtestoError,
}

impl ConsultError {
    pub fn new(provider: ProviderKind, error: ProtestoError) -> Self {
        Self { provider, error }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

pub type Result<T> = std::result::Result<T, ProtestoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_distinct_for_caller_facing_outcomes() {
        let site = ProtestoError::TechnicalSite("title without explanation".into());
        let timeout = ProtestoError::ExtractionTimeout {
            stage: "details".into(),
        };
        let pool = ProtestoError::PoolTimeout {
            waited: Duration::from_secs(1),
            capacity: 2,
        };
        assert_eq!(site.kind(), "technical_site");
        assert_eq!(timeout.kind(), "extraction_timeout");
        assert_eq!(pool.kind(), "pool_timeout");
    }

    #[test]
    fn test_invalid_document_never_falls_back() {
        assert!(!ProtestoError::InvalidDocument("123".into()).allows_fallback());
        assert!(ProtestoError::Provider("missing field".into()).allows_fallback());
        assert!(ProtestoError::auth(AuthStep::OtpValidation, "rejected").allows_fallback());
    }

    #[test]
    fn test_consult_error_display_carries_provider() {
        let err = ConsultError::new(
            ProviderKind::OfficialApi,
            ProtestoError::Provider("bad schema".into()),
        );
        let text = err.to_string();
        assert!(text.starts_with("[official_api]"));
        assert!(text.contains("bad schema"));
        assert_eq!(err.kind(), "provider");
    }
}
