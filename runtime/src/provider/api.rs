// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Official-API provider.
//!
//! Authenticates with the same email code as the portal, caches the bearer
//! token for its lifetime and re-authenticates exactly once when a call comes
//! back 401.

use super::http::{HttpClient, HttpResponse};
use super::ProtestProvider;
use crate::config::{ApiConfig, OtpConfig};
use crate::error::{AuthStep, ProtestoError, Result};
use crate::otp::{run_challenge, ChallengeTarget, OtpChallenge, OtpChannel, Verdict};
use crate::types::{
    parse_br_date, ConsultationResult, DocumentId, Money, NotaryOfficeRecord, ProtestLineItem,
    ProviderKind, StateCode,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Bearer token cache with an explicit reset.
#[derive(Default)]
pub struct TokenCache {
    current: Option<CachedToken>,
}

impl TokenCache {
    /// The cached token, if it has not expired.
    pub fn valid(&self) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.value.as_str())
    }

    pub fn store(&mut self, value: String, ttl: Duration) {
        self.current = Some(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        });
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    challenge_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ConsultationBody {
    has_protests: bool,
    #[serde(default)]
    states: Vec<StateBody>,
}

#[derive(Debug, Deserialize)]
struct StateBody {
    state: String,
    offices: Vec<OfficeBody>,
}

#[derive(Debug, Deserialize)]
struct OfficeBody {
    name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    title_count: Option<u32>,
    #[serde(default)]
    titles: Vec<TitleBody>,
}

#[derive(Debug, Deserialize)]
struct TitleBody {
    value: Amount,
    #[serde(default)]
    protest_date: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    cancellation_authorized: bool,
    #[serde(default)]
    cancellation_cost: Option<Amount>,
}

/// Amounts arrive either as JSON numbers or as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn to_money(&self) -> Option<Money> {
        match self {
            Self::Number(n) => Money::from_decimal(&format!("{n:.2}")),
            Self::Text(s) => Money::from_decimal(s).or_else(|| Money::from_brl(s)),
        }
    }
}

fn api_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_br_date(raw))
}

pub struct OfficialApiClient {
    http: HttpClient,
    base_url: String,
    login_document: String,
    token_ttl: Duration,
    otp: Arc<OtpChannel>,
    otp_config: OtpConfig,
    token: Mutex<TokenCache>,
}

impl OfficialApiClient {
    pub fn new(
        config: &ApiConfig,
        login_document: &str,
        otp: Arc<OtpChannel>,
        otp_config: OtpConfig,
    ) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ProtestoError::Config("official API base URL is not set".to_string()))?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: HttpClient::new(config.request_timeout, config.headers.clone())?,
            base_url,
            login_document: login_document.to_string(),
            token_ttl: config.token_ttl,
            otp,
            otp_config,
            token: Mutex::new(TokenCache::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Drop the cached token; the next call authenticates again.
    pub async fn reset(&self) {
        self.token.lock().await.reset();
    }

    /// Cached token, or a fresh one from a full code exchange.
    ///
    /// The cache lock is held across authentication so concurrent callers
    /// share one exchange.
    pub async fn token(&self) -> Result<String> {
        let mut cache = self.token.lock().await;
        if let Some(token) = cache.valid() {
            return Ok(token.to_string());
        }
        let (token, ttl) = self.authenticate().await?;
        cache.store(token.clone(), ttl);
        Ok(token)
    }

    async fn refresh_token(&self, rejected: &str) -> Result<String> {
        let mut cache = self.token.lock().await;
        if let Some(current) = cache.valid() {
            if current != rejected {
                return Ok(current.to_string());
            }
        }
        cache.reset();
        let (token, ttl) = self.authenticate().await?;
        cache.store(token.clone(), ttl);
        Ok(token)
    }

    async fn authenticate(&self) -> Result<(String, Duration)> {
        let started = Instant::now();
        let _mailbox = self.otp.exclusive().await;
        if let Err(e) = self.otp.purge_stale().await {
            tracing::warn!("could not purge stale OTP messages: {e}");
        }

        let resp = self
            .http
            .post_json(
                &self.url("/auth/login"),
                &json!({ "document": self.login_document }),
                None,
            )
            .await?;
        if !resp.is_success() {
            return Err(ProtestoError::auth(
                AuthStep::ChallengeTrigger,
                format!("login request returned HTTP {}", resp.status),
            ));
        }
        let login: LoginResponse = decode(&resp, "login")?;

        let mut target = TokenExchange {
            client: self,
            challenge_id: login.challenge_id,
        };
        let issued = run_challenge(&self.otp, &self.otp_config, &mut target).await?;
        let ttl = issued
            .expires_in
            .map(Duration::from_secs)
            .map_or(self.token_ttl, |server| server.min(self.token_ttl));
        tracing::info!(
            "official API token issued in {}ms, valid for {}s",
            started.elapsed().as_millis(),
            ttl.as_secs()
        );
        Ok((issued.access_token, ttl))
    }

    async fn fetch(&self, document: &DocumentId, token: &str) -> Result<HttpResponse> {
        self.http
            .get_bearer(&self.url(&format!("/v1/protests/{}", document.as_str())), token)
            .await
    }

    pub async fn consult(&self, document: &DocumentId) -> Result<ConsultationResult> {
        let token = self.token().await?;
        let mut resp = self.fetch(document, &token).await?;
        if resp.status == 401 {
            tracing::warn!("official API rejected the cached token; re-authenticating once");
            let fresh = self.refresh_token(&token).await?;
            resp = self.fetch(document, &fresh).await?;
            if resp.status == 401 {
                self.reset().await;
                return Err(ProtestoError::auth(
                    AuthStep::TokenExchange,
                    "fresh token rejected with HTTP 401",
                ));
            }
        }
        if !resp.is_success() {
            return Err(ProtestoError::Provider(format!(
                "consultation returned HTTP {}",
                resp.status
            )));
        }
        let body: ConsultationBody = decode(&resp, "consultation")?;
        into_result(document, body)
    }
}

fn decode<T: serde::de::DeserializeOwned>(resp: &HttpResponse, what: &str) -> Result<T> {
    serde_json::from_str(&resp.body)
        .map_err(|e| ProtestoError::Provider(format!("malformed {what} response: {e}")))
}

fn into_result(document: &DocumentId, body: ConsultationBody) -> Result<ConsultationResult> {
    if !body.has_protests {
        if !body.states.is_empty() {
            return Err(ProtestoError::Provider(
                "response denies protests but lists states".to_string(),
            ));
        }
        return Ok(ConsultationResult::empty(document.clone(), ProviderKind::OfficialApi));
    }
    if body.states.iter().all(|s| s.offices.is_empty()) {
        return Err(ProtestoError::Provider(
            "response reports protests but lists no offices".to_string(),
        ));
    }

    let mut by_state: BTreeMap<StateCode, Vec<NotaryOfficeRecord>> = BTreeMap::new();
    for state in body.states {
        let code = StateCode::parse(&state.state)
            .ok_or_else(|| ProtestoError::Provider(format!("unknown state '{}'", state.state)))?;
        let offices = by_state.entry(code).or_default();
        for office in state.offices {
            let titles = office
                .titles
                .iter()
                .map(|t| {
                    Ok(ProtestLineItem {
                        value: t.value.to_money().ok_or_else(|| {
                            ProtestoError::Provider(format!("unreadable amount {:?}", t.value))
                        })?,
                        protest_date: api_date(t.protest_date.as_deref()),
                        due_date: api_date(t.due_date.as_deref()),
                        cancellation_authorized: t.cancellation_authorized,
                        cancellation_cost: t.cancellation_cost.as_ref().and_then(Amount::to_money),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            offices.push(NotaryOfficeRecord {
                name: office.name,
                city: office.city,
                address: office.address,
                phone: office.phone,
                title_count: office
                    .title_count
                    .unwrap_or_else(|| u32::try_from(titles.len()).unwrap_or(u32::MAX)),
                titles,
                details_loaded: true,
            });
        }
    }
    Ok(ConsultationResult::new(
        document.clone(),
        ProviderKind::OfficialApi,
        by_state,
        None,
    ))
}

/// Submits codes to the token endpoint.
struct TokenExchange<'a> {
    client: &'a OfficialApiClient,
    challenge_id: String,
}

#[async_trait]
impl ChallengeTarget for TokenExchange<'_> {
    type Output = TokenResponse;

    async fn submit(&mut self, challenge: &OtpChallenge) -> Result<Verdict<TokenResponse>> {
        let resp = self
            .client
            .http
            .post_json(
                &self.client.url("/auth/verify"),
                &json!({ "challenge_id": self.challenge_id, "code": challenge.code }),
                None,
            )
            .await?;
        match resp.status {
            200..=299 => Ok(Verdict::Accepted(decode(&resp, "token")?)),
            400 | 401 | 422 => Ok(Verdict::Rejected),
            status => Err(ProtestoError::auth(
                AuthStep::TokenExchange,
                format!("code verification returned HTTP {status}"),
            )),
        }
    }

    async fn resend(&mut self, next_attempt: u32) -> Result<()> {
        let resp = self
            .client
            .http
            .post_json(
                &self.client.url("/auth/resend"),
                &json!({ "challenge_id": self.challenge_id }),
                None,
            )
            .await?;
        if resp.is_success() {
            tracing::debug!("requested a new API code for attempt {next_attempt}");
            Ok(())
        } else {
            Err(ProtestoError::auth(
                AuthStep::ChallengeTrigger,
                format!("code resend returned HTTP {}", resp.status),
            ))
        }
    }
}

#[async_trait]
impl ProtestProvider for OfficialApiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OfficialApi
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn consult(&self, document: &DocumentId) -> Result<ConsultationResult> {
        OfficialApiClient::consult(self, document).await
    }

    async fn cleanup(&self) {
        self.reset().await;
    }
}
