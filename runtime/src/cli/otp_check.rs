// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! `protesto otp-check`: show the most recent portal code in the mailbox, masked.

use super::output;
use crate::config::EngineConfig;
use crate::mail::imap::ImapMailbox;
use crate::mail::Mailbox;
use crate::otp::extract::{mask_code, CodeExtractor};
use crate::portal::PortalProfile;
use anyhow::Result;
use serde_json::json;
use std::time::Duration;

pub async fn run(window: Duration) -> Result<()> {
    let config = EngineConfig::from_env()?;
    let mailbox = ImapMailbox::new(config.mailbox.clone());
    let extractor = CodeExtractor::for_portal(&PortalProfile::new(&config.portal.base_url).texts);

    mailbox.connect().await?;
    let ids = mailbox.search_recent(&config.mailbox.sender, window).await?;

    let mut found = None;
    for id in &ids {
        let body = mailbox.fetch_body(*id).await?;
        if let Some(code) = extractor.extract(&body) {
            found = Some((*id, code));
            break;
        }
    }
    if let Err(e) = mailbox.disconnect().await {
        tracing::debug!("mailbox disconnect failed: {e:#}");
    }

    if output::is_json() {
        output::print_json(&json!({
            "sender": config.mailbox.sender,
            "window_secs": window.as_secs(),
            "messages": ids.len(),
            "code": found.as_ref().map(|(_, c)| mask_code(&c.code)),
            "strategy": found.as_ref().map(|(_, c)| c.strategy.clone()),
            "message_id": found.as_ref().map(|(id, _)| id.to_string()),
        }));
        return Ok(());
    }

    println!(
        "[OK] {} message(s) from {} in the last {}s",
        ids.len(),
        config.mailbox.sender,
        window.as_secs()
    );
    match found {
        Some((id, code)) => println!(
            "[OK] newest code {} ({id}, via {})",
            mask_code(&code.code),
            code.strategy
        ),
        None if ids.is_empty() => println!("[??] no code messages to inspect"),
        None => println!("[!!] messages found but no code could be extracted"),
    }
    Ok(())
}
