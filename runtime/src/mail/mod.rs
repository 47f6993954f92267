// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mailbox capability used by the OTP channel.

pub mod imap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Server-side identifier of one message (an IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uid:{}", self.0)
    }
}

/// A mailbox the portal delivers one-time codes to.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Open (or re-open) the connection.
    async fn connect(&self) -> Result<()>;
    /// Messages from `sender` received within `window`, newest first.
    async fn search_recent(&self, sender: &str, window: Duration) -> Result<Vec<MessageId>>;
    /// Plain-text body of a message.
    async fn fetch_body(&self, id: MessageId) -> Result<String>;
    /// Permanently remove a message.
    async fn delete(&self, id: MessageId) -> Result<()>;
    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;
}

/// Flatten a raw RFC 822 message into searchable text.
///
/// Prefers `text/plain` parts; falls back to the visible text of
/// `text/html` parts.
pub fn body_text(raw: &[u8]) -> Result<String> {
    let parsed = mailparse::parse_mail(raw).context("failed to parse message")?;
    let mut plain = Vec::new();
    let mut html = Vec::new();
    collect_parts(&parsed, &mut plain, &mut html)?;

    let text = if !plain.is_empty() {
        plain.join("\n")
    } else {
        html.iter()
            .map(|h| html_to_text(h))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(normalize_whitespace(&text))
}

fn collect_parts(
    part: &mailparse::ParsedMail<'_>,
    plain: &mut Vec<String>,
    html: &mut Vec<String>,
) -> Result<()> {
    if part.subparts.is_empty() {
        let mime = part.ctype.mimetype.to_ascii_lowercase();
        if mime == "text/plain" {
            plain.push(part.get_body().context("undecodable text part")?);
        } else if mime == "text/html" {
            html.push(part.get_body().context("undecodable html part")?);
        }
        return Ok(());
    }
    for sub in &part.subparts {
        collect_parts(sub, plain, html)?;
    }
    Ok(())
}

fn html_to_text(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    doc.root_element().text().collect::<Vec<_>>().join(" ")
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
