// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! `protesto consult`: run one or more lookups concurrently through one engine.

use super::output;
use crate::config::{EngineConfig, ProviderMode};
use crate::engine::ProtestEngine;
use crate::error::ConsultError;
use crate::types::ConsultationResult;
use anyhow::{anyhow, bail, Result};
use serde_json::json;

pub async fn run(documents: &[String], provider: Option<&str>) -> Result<()> {
    if documents.is_empty() {
        bail!("at least one document is required");
    }
    let mut config = EngineConfig::from_env()?;
    if let Some(raw) = provider {
        config.provider =
            ProviderMode::parse(raw).ok_or_else(|| anyhow!("unknown provider mode '{raw}'"))?;
    }

    let engine = ProtestEngine::build(config).await?;
    if let Err(e) = engine.initialize().await {
        engine.cleanup().await;
        return Err(e.into());
    }

    let outcomes =
        futures::future::join_all(documents.iter().map(|doc| engine.consult(doc))).await;
    engine.cleanup().await;

    let mut failed = 0;
    let mut rendered = Vec::with_capacity(outcomes.len());
    for (doc, outcome) in documents.iter().zip(outcomes) {
        if outcome.is_err() {
            failed += 1;
        }
        if output::is_json() {
            rendered.push(match &outcome {
                Ok(result) => serde_json::to_value(result)?,
                Err(e) => error_json(doc, e),
            });
        } else if !output::is_quiet() {
            match &outcome {
                Ok(result) => print_summary(result),
                Err(e) => println!("{doc}: FAILED [{}] {e}", e.kind()),
            }
        }
    }
    if output::is_json() {
        output::print_json(&rendered);
    }

    if failed > 0 {
        bail!("{failed} of {} lookup(s) failed", documents.len());
    }
    Ok(())
}

fn error_json(document: &str, err: &ConsultError) -> serde_json::Value {
    json!({
        "document": document,
        "error": err.kind(),
        "provider": err.provider,
        "retryable": err.error.is_retryable(),
        "message": err.to_string(),
    })
}

fn print_summary(result: &ConsultationResult) {
    let doc = result.document_id().formatted();
    let via = match result.fallback_from() {
        Some(primary) => format!("{} after {primary} failed", result.provider_used()),
        None => result.provider_used().to_string(),
    };
    if !result.has_protests() {
        println!("{doc}: no protests ({via})");
        return;
    }
    println!(
        "{doc}: {} title(s) in {} office(s) ({via})",
        result.total_titles(),
        result.office_count()
    );
    for (state, offices) in result.by_state() {
        for office in offices {
            println!("  {state}  {} - {} ({} title(s))", office.name, office.city, office.title_count);
            for title in &office.titles {
                let protested = title
                    .protest_date
                    .map(|d| d.format("%d/%m/%Y").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("      {}  protested {protested}", title.value);
            }
            if !office.details_loaded {
                println!("      (details not loaded)");
            }
        }
    }
    if let Some(partial) = result.partial() {
        println!(
            "  partial result: {:?} after {}/{} office(s)",
            partial.reason, partial.offices_processed, partial.offices_seen
        );
    }
}
