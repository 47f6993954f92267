// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Code extraction from OTP email bodies.
//!
//! An ordered chain of strategies; the first one that yields a code wins.
//! The marker strategy is exact and goes first; the regex strategies are
//! progressively looser and only run when it finds nothing.

use crate::portal::PortalTexts;
use regex::Regex;

/// Length of the portal's one-time codes.
pub const CODE_LEN: usize = 6;

/// One way of pulling a code out of a message body.
pub trait CodeStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, text: &str) -> Option<String>;
}

/// Code found by the chain, with the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
    pub strategy: String,
}

/// Text strictly between the portal's two fixed marker phrases.
pub struct BetweenMarkers {
    pattern: Regex,
}

impl BetweenMarkers {
    pub fn new(start: &str, end: &str) -> Option<Self> {
        if start.is_empty() || end.is_empty() {
            return None;
        }
        let pattern = Regex::new(&format!(
            r"(?is){}(.*?){}",
            regex::escape(start),
            regex::escape(end)
        ))
        .ok()?;
        Some(Self { pattern })
    }
}

impl CodeStrategy for BetweenMarkers {
    fn name(&self) -> &str {
        "between_markers"
    }

    fn extract(&self, text: &str) -> Option<String> {
        let between = self.pattern.captures(text)?.get(1)?.as_str();
        between
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find(|tok| tok.len() == CODE_LEN)
            .map(str::to_ascii_uppercase)
    }
}

/// First capture group of a regex.
pub struct PatternStrategy {
    name: String,
    pattern: Regex,
}

impl PatternStrategy {
    pub fn new(name: &str, pattern: &str) -> Option<Self> {
        Some(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern).ok()?,
        })
    }
}

impl CodeStrategy for PatternStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, text: &str) -> Option<String> {
        self.pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|m| m.len() == CODE_LEN)
            .map(str::to_ascii_uppercase)
    }
}

/// Standalone uppercase token mixing letters and digits.
pub struct MixedToken;

impl CodeStrategy for MixedToken {
    fn name(&self) -> &str {
        "mixed_token"
    }

    fn extract(&self, text: &str) -> Option<String> {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|tok| tok.len() == CODE_LEN)
            .filter(|tok| tok.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
            .find(|tok| {
                tok.chars().any(|c| c.is_ascii_digit()) && tok.chars().any(|c| c.is_ascii_uppercase())
            })
            .map(str::to_string)
    }
}

/// Ordered chain of strategies.
pub struct CodeExtractor {
    strategies: Vec<Box<dyn CodeStrategy>>,
}

impl CodeExtractor {
    pub fn new(strategies: Vec<Box<dyn CodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Marker strategy for the portal's phrases, then the regex fallbacks.
    pub fn for_portal(texts: &PortalTexts) -> Self {
        let mut strategies: Vec<Box<dyn CodeStrategy>> = Vec::new();
        if let Some(s) = BetweenMarkers::new(&texts.otp_start_marker, &texts.otp_end_marker) {
            strategies.push(Box::new(s));
        }
        let fallbacks = [
            (
                "after_keyword",
                r"(?i)c[óo]digo(?:\s+de\s+(?:acesso|verifica[çc][ãa]o|seguran[çc]a))?\s*(?:é|e|:)?\s*:?\s*([A-Za-z0-9]{6})\b",
            ),
            ("six_digits", r"\b(\d{6})\b"),
        ];
        for (name, pattern) in fallbacks {
            if let Some(s) = PatternStrategy::new(name, pattern) {
                strategies.push(Box::new(s));
            }
        }
        strategies.push(Box::new(MixedToken));
        Self { strategies }
    }

    pub fn extract(&self, text: &str) -> Option<ExtractedCode> {
        self.strategies.iter().find_map(|s| {
            s.extract(text).map(|code| ExtractedCode {
                code,
                strategy: s.name().to_string(),
            })
        })
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

/// Mask a code for logging: first two characters, rest starred.
pub fn mask_code(code: &str) -> String {
    code.chars()
        .enumerate()
        .map(|(i, c)| if i < 2 { c } else { '*' })
        .collect()
}
