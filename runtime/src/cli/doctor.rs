// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::config::EngineConfig;
use crate::mail::imap::ImapMailbox;
use crate::mail::Mailbox;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::time::Duration;

const MAILBOX_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Check Chromium availability, configuration and mailbox reachability.
pub async fn run() -> Result<()> {
    println!("Protesto Doctor");
    println!("===============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let mut ready = true;

    let config = match EngineConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("[!!] Configuration unreadable: {e}");
            println!();
            println!("Status: NOT READY");
            return Ok(());
        }
    };
    println!("[OK] Provider mode: {}", config.provider.as_str());

    match config.validate() {
        Ok(()) => println!("[OK] Configuration valid"),
        Err(e) => {
            ready = false;
            println!("[!!] {e}");
        }
    }

    if config.provider.uses_browser() {
        let chromium = config.portal.chromium_path.clone().filter(|p| p.exists()).or_else(find_chromium);
        match chromium {
            Some(path) => println!("[OK] Chromium found: {}", path.display()),
            None => {
                ready = false;
                println!("[!!] Chromium NOT found. Set PROTESTO_CHROMIUM_PATH or install Chrome.");
            }
        }
        println!(
            "[OK] Pool: capacity {} / keep-alive every {}s / rebuild after {}s",
            config.pool.capacity,
            config.pool.keepalive_interval.as_secs(),
            config.pool.freshness_window.as_secs()
        );
    }

    if let Some(url) = &config.api.base_url {
        println!("[OK] Official API: {url}");
    }

    if config.mailbox.username.is_empty() {
        ready = false;
        println!("[!!] Mailbox user not set (PROTESTO_IMAP_USER)");
    } else {
        let mailbox = ImapMailbox::new(config.mailbox.clone());
        match tokio::time::timeout(MAILBOX_PROBE_TIMEOUT, mailbox.connect()).await {
            Ok(Ok(())) => {
                println!(
                    "[OK] Mailbox reachable: {}@{}:{}",
                    config.mailbox.username, config.mailbox.host, config.mailbox.port
                );
                if let Err(e) = mailbox.disconnect().await {
                    tracing::debug!("mailbox disconnect failed: {e:#}");
                }
            }
            Ok(Err(e)) => {
                ready = false;
                println!("[!!] Mailbox unreachable: {e:#}");
            }
            Err(_) => {
                ready = false;
                println!("[!!] Mailbox probe timed out after {}s", MAILBOX_PROBE_TIMEOUT.as_secs());
            }
        }
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
