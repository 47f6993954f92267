// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! IMAP mailbox backed by the blocking `imap` client.
//!
//! Every protocol exchange runs under `tokio::task::spawn_blocking` so mail
//! polling never stalls the runtime threads serving concurrent leases.

use super::{body_text, Mailbox, MessageId};
use crate::config::MailboxConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ImapSession = ::imap::Session<native_tls::TlsStream<TcpStream>>;

/// IMAP-over-TLS mailbox with a lazily opened, reused session.
pub struct ImapMailbox {
    config: MailboxConfig,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }

    fn open(config: &MailboxConfig) -> Result<ImapSession> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .context("failed to build TLS connector")?;
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?
            .next()
            .ok_or_else(|| anyhow!("{}:{} resolved to no address", config.host, config.port))?;
        let tcp = TcpStream::connect_timeout(&addr, config.io_timeout)
            .with_context(|| format!("IMAP connect to {}:{} failed", config.host, config.port))?;
        // A stalled server must surface as an error, not a hung blocking thread.
        tcp.set_read_timeout(Some(config.io_timeout))?;
        tcp.set_write_timeout(Some(config.io_timeout))?;
        let stream = tls
            .connect(&config.host, tcp)
            .map_err(|e| anyhow!("TLS handshake with {} failed: {e}", config.host))?;
        let mut client = ::imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| anyhow!("IMAP greeting from {} failed: {e}", config.host))?;
        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|(e, _)| anyhow!("IMAP login for {} failed: {e}", config.username))?;
        session
            .select(&config.folder)
            .map_err(|e| anyhow!("IMAP select {} failed: {e}", config.folder))?;
        tracing::debug!(host = %config.host, folder = %config.folder, "IMAP session opened");
        Ok(session)
    }

    /// Run `op` against the shared session on the blocking pool.
    ///
    /// A failed operation drops the session so the next call reconnects.
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ImapSession) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let config = self.config.clone();
        let slot = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("mailbox session lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(Self::open(&config)?);
            }
            let Some(session) = guard.as_mut() else {
                bail!("mailbox session unavailable");
            };
            match op(session) {
                Ok(v) => Ok(v),
                Err(e) => {
                    *guard = None;
                    Err(e)
                }
            }
        })
        .await
        .context("mailbox task panicked")?
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn connect(&self) -> Result<()> {
        self.with_session(|session| {
            session.noop().map_err(|e| anyhow!("IMAP NOOP failed: {e}"))
        })
        .await
    }

    async fn search_recent(&self, sender: &str, window: Duration) -> Result<Vec<MessageId>> {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::minutes(10));
        let cutoff = Utc::now() - window;
        // SINCE has day granularity; INTERNALDATE narrows it to the window.
        let query = format!(
            "FROM \"{}\" SINCE {}",
            sender.replace('"', ""),
            cutoff.format("%d-%b-%Y")
        );

        self.with_session(move |session| {
            let uids = session
                .uid_search(&query)
                .map_err(|e| anyhow!("IMAP search failed: {e}"))?;
            if uids.is_empty() {
                return Ok(Vec::new());
            }
            let set = uids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let fetches = session
                .uid_fetch(&set, "INTERNALDATE")
                .map_err(|e| anyhow!("IMAP fetch of dates failed: {e}"))?;

            let mut recent: Vec<(i64, u32)> = fetches
                .iter()
                .filter_map(|f| {
                    let uid = f.uid?;
                    let received = f.internal_date()?;
                    (received >= cutoff).then(|| (received.timestamp(), uid))
                })
                .collect();
            recent.sort_unstable_by(|a, b| b.cmp(a));
            Ok(recent.into_iter().map(|(_, uid)| MessageId(uid)).collect())
        })
        .await
    }

    async fn fetch_body(&self, id: MessageId) -> Result<String> {
        let raw = self
            .with_session(move |session| {
                let fetches = session
                    .uid_fetch(id.0.to_string(), "BODY.PEEK[]")
                    .map_err(|e| anyhow!("IMAP fetch of {id} failed: {e}"))?;
                let body = fetches
                    .iter()
                    .find_map(|f| f.body().map(<[u8]>::to_vec))
                    .with_context(|| format!("message {id} has no body"))?;
                Ok(body)
            })
            .await?;
        body_text(&raw)
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        self.with_session(move |session| {
            session
                .uid_store(id.0.to_string(), "+FLAGS (\\Deleted)")
                .map_err(|e| anyhow!("IMAP flag of {id} failed: {e}"))?;
            session
                .expunge()
                .map_err(|e| anyhow!("IMAP expunge failed: {e}"))?;
            Ok(())
        })
        .await
    }

    async fn disconnect(&self) -> Result<()> {
        let slot = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("mailbox session lock poisoned"))?;
            if let Some(mut session) = guard.take() {
                if let Err(e) = session.logout() {
                    tracing::debug!("IMAP logout failed: {e}");
                }
            }
            Ok(())
        })
        .await
        .context("mailbox task panicked")?
    }
}
