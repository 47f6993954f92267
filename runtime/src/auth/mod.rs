// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Portal login state machine.
//!
//! One [`LoginFlow`] drives one page through
//! `Start → DocumentEntered → TitularConfirmed → ChallengeTriggered → Authenticated`.
//! Each transition is a guarded UI action followed by a check for the
//! element or URL the next state requires; a failed check moves the flow to
//! `Failed` with the step that broke.

use crate::config::{OtpConfig, PortalConfig};
use crate::error::{AuthStep, ProtestoError, Result};
use crate::otp::{run_challenge, ChallengeTarget, OtpChallenge, OtpChannel, Verdict};
use crate::portal::PortalProfile;
use crate::renderer::{wait_for_selector, PortalPage};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Start,
    DocumentEntered,
    TitularConfirmed,
    ChallengeTriggered,
    Authenticated,
    Failed(AuthStep),
}

/// What a successful login went through.
#[derive(Debug, Clone)]
pub struct LoginReport {
    pub transitions: Vec<AuthState>,
    pub otp_round_trip: bool,
    pub elapsed: Duration,
}

/// Result of re-validating a page that may have been logged out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Valid,
    Relogged,
}

/// Shared login machinery; each run gets its own [`LoginFlow`].
pub struct Authenticator {
    profile: Arc<PortalProfile>,
    otp: Arc<OtpChannel>,
    otp_config: OtpConfig,
    login_document: String,
    navigation_timeout: Duration,
    step_timeout: Duration,
    screenshot_dir: Option<PathBuf>,
}

impl Authenticator {
    pub fn new(
        profile: Arc<PortalProfile>,
        otp: Arc<OtpChannel>,
        otp_config: OtpConfig,
        portal: &PortalConfig,
    ) -> Self {
        Self {
            profile,
            otp,
            otp_config,
            login_document: portal.login_document.clone(),
            navigation_timeout: portal.navigation_timeout,
            step_timeout: portal.step_timeout,
            screenshot_dir: portal.screenshot_dir.clone(),
        }
    }

    pub fn profile(&self) -> &PortalProfile {
        &self.profile
    }

    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    /// Log `page` in from scratch.
    pub async fn login(&self, page: &dyn PortalPage) -> Result<LoginReport> {
        LoginFlow::new(self, page).run().await
    }

    /// Reload `page` and log it back in if the portal bounced it to the login screen.
    pub async fn revalidate(&self, page: &dyn PortalPage) -> Result<SessionCheck> {
        page.reload(self.navigation_timeout)
            .await
            .map_err(|e| ProtestoError::SessionExpired(format!("reload failed: {e:#}")))?;
        let url = page.current_url().await.map_err(ProtestoError::Browser)?;
        if !self.profile.is_login_url(&url) {
            return Ok(SessionCheck::Valid);
        }
        let expired = ProtestoError::SessionExpired(format!("page landed on {url}"));
        tracing::warn!("{expired}; logging the page back in");
        self.login(page).await?;
        Ok(SessionCheck::Relogged)
    }

    async fn capture_failure(&self, page: &dyn PortalPage, step: AuthStep) {
        let shot = match page.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("failure screenshot unavailable: {e:#}");
                return;
            }
        };
        tracing::info!(step = %step, bytes = shot.len(), "captured login failure screenshot");
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let name = format!(
            "login-failure-{}-{}.png",
            step,
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
        );
        let path = dir.join(name);
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!("cannot create screenshot dir {}: {e}", dir.display());
            return;
        }
        match tokio::fs::write(&path, &shot).await {
            Ok(()) => tracing::info!("login failure screenshot saved to {}", path.display()),
            Err(e) => tracing::warn!("cannot write {}: {e}", path.display()),
        }
    }
}

/// One run of the login state machine on one page.
pub struct LoginFlow<'a> {
    auth: &'a Authenticator,
    page: &'a dyn PortalPage,
    state: AuthState,
    transitions: Vec<AuthState>,
    otp_round_trip: bool,
}

impl<'a> LoginFlow<'a> {
    pub fn new(auth: &'a Authenticator, page: &'a dyn PortalPage) -> Self {
        Self {
            auth,
            page,
            state: AuthState::Start,
            transitions: vec![AuthState::Start],
            otp_round_trip: false,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub async fn run(mut self) -> Result<LoginReport> {
        let started = Instant::now();
        let outcome = self.drive().await;
        match outcome {
            Ok(()) => {
                tracing::info!(
                    "portal login completed in {}ms",
                    started.elapsed().as_millis()
                );
                Ok(LoginReport {
                    transitions: self.transitions,
                    otp_round_trip: self.otp_round_trip,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => {
                let step = self.failing_step();
                self.advance(AuthState::Failed(step));
                tracing::warn!(step = %step, "portal login failed: {e}");
                self.auth.capture_failure(self.page, step).await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        if self.open_login().await? {
            self.advance(AuthState::Authenticated);
            return Ok(());
        }
        self.enter_document().await?;
        self.confirm_titular().await?;

        let _mailbox = self.auth.otp.exclusive().await;
        self.trigger_challenge().await?;
        self.validate_code().await
    }

    fn advance(&mut self, next: AuthState) {
        tracing::debug!("login state {:?} -> {next:?}", self.state);
        self.state = next;
        self.transitions.push(next);
    }

    fn failing_step(&self) -> AuthStep {
        match self.state {
            AuthState::Start => AuthStep::DocumentEntry,
            AuthState::DocumentEntered => AuthStep::TitularConfirmation,
            AuthState::TitularConfirmed => AuthStep::ChallengeTrigger,
            AuthState::ChallengeTriggered | AuthState::Authenticated => AuthStep::OtpValidation,
            AuthState::Failed(step) => step,
        }
    }

    async fn expect(&self, selector: &str, step: AuthStep, what: &str) -> Result<()> {
        let present = wait_for_selector(self.page, selector, self.auth.step_timeout, POLL)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        if present {
            Ok(())
        } else {
            Err(ProtestoError::auth(
                step,
                format!("{what} did not appear within {:?}", self.auth.step_timeout),
            ))
        }
    }

    /// Returns true when the portal already considers this page logged in.
    async fn open_login(&mut self) -> Result<bool> {
        let profile = &self.auth.profile;
        let nav = self
            .page
            .navigate(&profile.login_url(), self.auth.navigation_timeout)
            .await
            .map_err(|e| ProtestoError::auth(AuthStep::Start, format!("{e:#}")))?;
        if profile.is_dashboard_url(&nav.final_url) {
            tracing::info!("login page redirected to the dashboard; page already authenticated");
            return Ok(true);
        }
        self.expect(&profile.login.document_input, AuthStep::Start, "document field")
            .await?;
        Ok(false)
    }

    async fn enter_document(&mut self) -> Result<()> {
        let sel = &self.auth.profile.login;
        let step = AuthStep::DocumentEntry;
        self.page
            .fill(&sel.document_input, &self.auth.login_document)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        self.page
            .click(&sel.document_submit)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        self.expect(&sel.titular_checkbox, step, "account holder confirmation")
            .await?;
        self.advance(AuthState::DocumentEntered);
        Ok(())
    }

    async fn confirm_titular(&mut self) -> Result<()> {
        let sel = &self.auth.profile.login;
        let step = AuthStep::TitularConfirmation;
        for target in [&sel.titular_checkbox, &sel.titular_confirm] {
            self.page
                .click(target)
                .await
                .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        }
        let ready = wait_for_selector(
            self.page,
            &format!("{}, {}", sel.send_code_button, sel.otp_input),
            self.auth.step_timeout,
            POLL,
        )
        .await
        .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        if !ready {
            return Err(ProtestoError::auth(step, "code request screen did not appear"));
        }
        self.advance(AuthState::TitularConfirmed);
        Ok(())
    }

    async fn trigger_challenge(&mut self) -> Result<()> {
        let sel = &self.auth.profile.login;
        let step = AuthStep::ChallengeTrigger;
        if let Err(e) = self.auth.otp.purge_stale().await {
            tracing::warn!("could not purge stale OTP messages: {e}");
        }
        let has_button = self
            .page
            .count(&sel.send_code_button)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?
            > 0;
        if has_button {
            self.page
                .click(&sel.send_code_button)
                .await
                .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        }
        self.expect(&sel.otp_input, step, "code input").await?;
        self.otp_round_trip = true;
        self.advance(AuthState::ChallengeTriggered);
        Ok(())
    }

    async fn validate_code(&mut self) -> Result<()> {
        let mut target = PageChallenge {
            page: self.page,
            profile: &self.auth.profile,
            step_timeout: self.auth.step_timeout,
        };
        run_challenge(&self.auth.otp, &self.auth.otp_config, &mut target).await?;
        self.advance(AuthState::Authenticated);
        Ok(())
    }
}

/// Submits codes through the login page's OTP form.
struct PageChallenge<'a> {
    page: &'a dyn PortalPage,
    profile: &'a PortalProfile,
    step_timeout: Duration,
}

#[async_trait]
impl ChallengeTarget for PageChallenge<'_> {
    type Output = ();

    async fn submit(&mut self, challenge: &OtpChallenge) -> Result<Verdict<()>> {
        let sel = &self.profile.login;
        let step = AuthStep::OtpValidation;
        self.page
            .fill(&sel.otp_input, &challenge.code)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        self.page
            .click(&sel.otp_submit)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;

        let deadline = Instant::now() + self.step_timeout;
        loop {
            let url = self
                .page
                .current_url()
                .await
                .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
            if self.profile.is_dashboard_url(&url) {
                return Ok(Verdict::Accepted(()));
            }
            let error_text = self
                .page
                .query_text(&sel.otp_error)
                .await
                .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
            if error_text.is_some_and(|text| self.profile.texts.is_otp_rejection(&text)) {
                return Ok(Verdict::Rejected);
            }
            if Instant::now() >= deadline {
                return Err(ProtestoError::auth(
                    step,
                    format!("no dashboard redirect within {:?} after submitting code", self.step_timeout),
                ));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn resend(&mut self, next_attempt: u32) -> Result<()> {
        let sel = &self.profile.login;
        let step = AuthStep::ChallengeTrigger;
        let available = self
            .page
            .count(&sel.resend_code_button)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?
            > 0;
        if !available {
            return Err(ProtestoError::auth(
                step,
                format!("no way to request code for attempt {next_attempt}"),
            ));
        }
        self.page
            .click(&sel.resend_code_button)
            .await
            .map_err(|e| ProtestoError::auth(step, format!("{e:#}")))?;
        tracing::debug!("requested a new code for attempt {next_attempt}");
        Ok(())
    }
}
