// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Email OTP channel and the shared challenge retry loop.
//!
//! Both the browser login and the official-API token exchange run the same
//! loop: wait for a code nobody has used, consume it (deleting its message),
//! submit it, and on rejection cool down and ask for a fresh one.

pub mod extract;

use crate::config::{MailboxConfig, OtpConfig};
use crate::error::{AuthStep, ProtestoError, Result};
use crate::mail::{Mailbox, MessageId};
use anyhow::anyhow;
use async_trait::async_trait;
use extract::{mask_code, CodeExtractor};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Codes remembered as used; older entries age out.
const CONSUMED_CODE_MEMORY: usize = 32;

/// One attempt to obtain and validate a code.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub attempt: u32,
    pub code: String,
    pub source: MessageId,
    pub deadline: Instant,
    pub strategy: String,
}

#[derive(Default)]
struct Ledger {
    ids: HashSet<MessageId>,
    codes: VecDeque<String>,
}

impl Ledger {
    fn remember_code(&mut self, code: &str) {
        if self.codes.iter().any(|c| c == code) {
            return;
        }
        if self.codes.len() >= CONSUMED_CODE_MEMORY {
            self.codes.pop_front();
        }
        self.codes.push_back(code.to_string());
    }
}

/// Polls a mailbox for portal codes and tracks which ones are spent.
pub struct OtpChannel {
    mailbox: Arc<dyn Mailbox>,
    extractor: CodeExtractor,
    sender: String,
    window: Duration,
    poll_interval: Duration,
    /// Bound on a single mailbox call outside the code-wait loop.
    op_timeout: Duration,
    ledger: Mutex<Ledger>,
    gate: AsyncMutex<()>,
}

impl OtpChannel {
    pub fn new(mailbox: Arc<dyn Mailbox>, extractor: CodeExtractor, config: &MailboxConfig) -> Self {
        Self {
            mailbox,
            extractor,
            sender: config.sender.clone(),
            window: config.search_window,
            poll_interval: config.poll_interval,
            op_timeout: config.io_timeout,
            ledger: Mutex::new(Ledger::default()),
            gate: AsyncMutex::new(()),
        }
    }

    pub fn mailbox(&self) -> &Arc<dyn Mailbox> {
        &self.mailbox
    }

    /// Exclusive use of the mailbox for one challenge.
    ///
    /// Two logins polling the same inbox at once would steal each other's
    /// codes, so every challenge runs under this guard.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Delete every code message currently in the window.
    ///
    /// Run before triggering a challenge so the next code found is one the
    /// portal sent for it.
    pub async fn purge_stale(&self) -> Result<usize> {
        let ids = tokio::time::timeout(
            self.op_timeout,
            self.mailbox.search_recent(&self.sender, self.window),
        )
        .await
        .map_err(|_| {
            ProtestoError::Mailbox(anyhow!("mailbox search timed out after {:?}", self.op_timeout))
        })?
        .map_err(ProtestoError::Mailbox)?;
        let mut purged = 0;
        for id in ids {
            self.mark_consumed(id, None);
            match tokio::time::timeout(self.op_timeout, self.mailbox.delete(id)).await {
                Ok(Ok(())) => purged += 1,
                Ok(Err(e)) => tracing::warn!("failed to purge stale OTP message {id}: {e:#}"),
                Err(_) => tracing::warn!("purging stale OTP message {id} timed out"),
            }
        }
        if purged > 0 {
            tracing::debug!("purged {purged} stale OTP message(s)");
        }
        Ok(purged)
    }

    /// Poll until a message with an unused code arrives or `timeout` elapses.
    pub async fn await_code(&self, attempt: u32, timeout: Duration) -> Result<OtpChallenge> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_error: Option<anyhow::Error> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let scan = match tokio::time::timeout(remaining, self.scan_once(attempt, deadline)).await {
                Ok(scan) => scan,
                Err(_) => {
                    tracing::warn!(attempt, "mailbox poll still running at the OTP deadline");
                    return Err(ProtestoError::OtpTimeout {
                        waited: started.elapsed(),
                    });
                }
            };
            match scan {
                Ok(Some(challenge)) => {
                    tracing::info!(
                        attempt,
                        code = %mask_code(&challenge.code),
                        strategy = %challenge.strategy,
                        "OTP code received after {}ms",
                        started.elapsed().as_millis()
                    );
                    return Ok(challenge);
                }
                Ok(None) => last_error = None,
                Err(e) => {
                    tracing::warn!("mailbox poll failed: {e:#}");
                    last_error = Some(e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(match last_error {
                    Some(e) => ProtestoError::Mailbox(e),
                    None => ProtestoError::OtpTimeout {
                        waited: started.elapsed(),
                    },
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn scan_once(&self, attempt: u32, deadline: Instant) -> anyhow::Result<Option<OtpChallenge>> {
        let ids = self.mailbox.search_recent(&self.sender, self.window).await?;
        for id in ids {
            if self.is_consumed_id(id) {
                continue;
            }
            let body = self.mailbox.fetch_body(id).await?;
            match self.extractor.extract(&body) {
                Some(found) if !self.is_consumed_code(&found.code) => {
                    return Ok(Some(OtpChallenge {
                        attempt,
                        code: found.code,
                        source: id,
                        deadline,
                        strategy: found.strategy,
                    }));
                }
                Some(found) => {
                    tracing::debug!("message {id} repeats a spent code; skipping");
                    self.mark_consumed(id, Some(&found.code));
                }
                None => {
                    tracing::warn!("message {id} from {} carries no recognizable code", self.sender);
                    self.mark_consumed(id, None);
                }
            }
        }
        Ok(None)
    }

    /// Mark a challenge's code as spent and delete its source message.
    pub async fn consume(&self, challenge: &OtpChallenge) {
        self.mark_consumed(challenge.source, Some(&challenge.code));
        match tokio::time::timeout(self.op_timeout, self.mailbox.delete(challenge.source)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("failed to delete consumed OTP message {}: {e:#}", challenge.source)
            }
            Err(_) => tracing::warn!("deleting consumed OTP message {} timed out", challenge.source),
        }
    }

    fn mark_consumed(&self, id: MessageId, code: Option<&str>) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.ids.insert(id);
            if let Some(code) = code {
                ledger.remember_code(code);
            }
        }
    }

    fn is_consumed_id(&self, id: MessageId) -> bool {
        self.ledger
            .lock()
            .map(|l| l.ids.contains(&id))
            .unwrap_or(false)
    }

    fn is_consumed_code(&self, code: &str) -> bool {
        self.ledger
            .lock()
            .map(|l| l.codes.iter().any(|c| c == code))
            .unwrap_or(false)
    }
}

/// Portal's answer to a submitted code.
#[derive(Debug)]
pub enum Verdict<T> {
    Accepted(T),
    Rejected,
}

/// Whatever a code is submitted to: a login page or the token endpoint.
#[async_trait]
pub trait ChallengeTarget: Send {
    type Output: Send;

    /// Submit the code and report whether it was accepted.
    async fn submit(&mut self, challenge: &OtpChallenge) -> Result<Verdict<Self::Output>>;

    /// Ask the portal to send a new code before attempt `next_attempt`.
    async fn resend(&mut self, next_attempt: u32) -> Result<()>;
}

/// Run the code/submit/retry loop against `target`.
///
/// The caller must already hold [`OtpChannel::exclusive`] and have triggered
/// the first code.
pub async fn run_challenge<T>(
    channel: &OtpChannel,
    config: &OtpConfig,
    target: &mut T,
) -> Result<T::Output>
where
    T: ChallengeTarget,
{
    for attempt in 1..=config.max_attempts {
        let challenge = channel.await_code(attempt, config.wait_timeout).await?;
        channel.consume(&challenge).await;

        match target.submit(&challenge).await? {
            Verdict::Accepted(out) => return Ok(out),
            Verdict::Rejected => {
                let rejected = ProtestoError::OtpInvalid { attempt };
                tracing::warn!(
                    code = %mask_code(&challenge.code),
                    "{rejected}; {} attempt(s) left",
                    config.max_attempts - attempt
                );
                if attempt < config.max_attempts {
                    tokio::time::sleep(config.cooldown).await;
                    target.resend(attempt + 1).await?;
                }
            }
        }
    }
    Err(ProtestoError::auth(
        AuthStep::OtpValidation,
        format!("code rejected {} time(s)", config.max_attempts),
    ))
}
