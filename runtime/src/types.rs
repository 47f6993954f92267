// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types: document ids, protest records, and consultation results.

use crate::error::{ProtestoError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Acquisition strategy tag carried on every result and every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OfficialApi,
    BrowserPool,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfficialApi => "official_api",
            Self::BrowserPool => "browser_pool",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated CNPJ (14 digits) or CPF (11 digits), stored as bare digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Normalize punctuation and validate check digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let stray = raw
            .chars()
            .any(|c| !c.is_ascii_digit() && !matches!(c, '.' | '/' | '-' | ' '));
        if stray {
            return Err(ProtestoError::InvalidDocument(format!(
                "unexpected characters in '{raw}'"
            )));
        }
        let valid = match digits.len() {
            14 => cnpj_is_valid(&digits),
            11 => cpf_is_valid(&digits),
            n => {
                return Err(ProtestoError::InvalidDocument(format!(
                    "expected 11 or 14 digits, got {n}"
                )))
            }
        };
        if !valid {
            return Err(ProtestoError::InvalidDocument(format!(
                "check digits do not match for '{raw}'"
            )));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cnpj(&self) -> bool {
        self.0.len() == 14
    }

    /// Punctuated form as the portal renders it.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        if self.is_cnpj() {
            format!(
                "{}.{}.{}/{}-{}",
                &d[0..2],
                &d[2..5],
                &d[5..8],
                &d[8..12],
                &d[12..14]
            )
        } else {
            format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
        }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn digit_values(s: &str) -> Vec<u32> {
    s.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(d: &[u32]) -> bool {
    d.windows(2).all(|w| w[0] == w[1])
}

fn cnpj_is_valid(s: &str) -> bool {
    let d = digit_values(s);
    if all_same(&d) {
        return false;
    }
    let check = |len: usize| -> u32 {
        let weights: Vec<u32> = if len == 12 {
            vec![5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]
        } else {
            vec![6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]
        };
        let sum: u32 = d[..len].iter().zip(weights).map(|(a, w)| a * w).sum();
        let r = sum % 11;
        if r < 2 {
            0
        } else {
            11 - r
        }
    };
    check(12) == d[12] && check(13) == d[13]
}

fn cpf_is_valid(s: &str) -> bool {
    let d = digit_values(s);
    if all_same(&d) {
        return false;
    }
    let check = |len: usize| -> u32 {
        let sum: u32 = d[..len]
            .iter()
            .enumerate()
            .map(|(i, a)| a * (len as u32 + 1 - i as u32))
            .sum();
        (sum * 10 % 11) % 10
    };
    check(9) == d[9] && check(10) == d[10]
}

const STATES: &[(&str, &str)] = &[
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapá"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceará"),
    ("DF", "Distrito Federal"),
    ("ES", "Espírito Santo"),
    ("GO", "Goiás"),
    ("MA", "Maranhão"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Pará"),
    ("PB", "Paraíba"),
    ("PR", "Paraná"),
    ("PE", "Pernambuco"),
    ("PI", "Piauí"),
    ("RJ", "Rio de Janeiro"),
    ("RN", "Rio Grande do Norte"),
    ("RS", "Rio Grande do Sul"),
    ("RO", "Rondônia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "São Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// Two-letter Brazilian state code (UF).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCode(String);

impl StateCode {
    /// Accepts a UF code ("sp") or a full state name ("São Paulo").
    ///
    /// Section headers on the portal sometimes read "Protestos em SP - São Paulo",
    /// so a trailing name after a code is tolerated.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let upper = trimmed.to_uppercase();
        if let Some((code, _)) = STATES.iter().find(|(code, _)| *code == upper) {
            return Some(Self((*code).to_string()));
        }
        let lower = trimmed.to_lowercase();
        if let Some((code, _)) = STATES
            .iter()
            .find(|(_, name)| name.to_lowercase() == lower)
        {
            return Some(Self((*code).to_string()));
        }
        let head: String = upper.chars().take(2).collect();
        let boundary = upper.chars().nth(2).map_or(true, |c| !c.is_alphanumeric());
        if boundary {
            if let Some((code, _)) = STATES.iter().find(|(code, _)| *code == head) {
                return Some(Self((*code).to_string()));
            }
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monetary amount in integer centavos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Parse Brazilian notation: "R$ 1.234,56", "1.234,5", "R$1234".
    pub fn from_brl(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .trim_start_matches("R$")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        let (int_part, frac_part) = match cleaned.split_once(',') {
            Some((i, f)) => (i, f),
            None => (cleaned.as_str(), ""),
        };
        Self::from_parts(int_part, frac_part)
    }

    /// Parse machine notation: "1234.56".
    pub fn from_decimal(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };
        Self::from_parts(int_part, frac_part)
    }

    fn from_parts(int_part: &str, frac_part: &str) -> Option<Self> {
        let negative = int_part.starts_with('-');
        let int_digits = int_part.trim_start_matches('-');
        if int_digits.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_digits.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || frac_part.len() > 2
        {
            return None;
        }
        let whole: i64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().ok()? * 10,
            _ => frac_part.parse().ok()?,
        };
        let cents = whole.checked_mul(100)?.checked_add(frac)?;
        Some(Self(if negative { -cents } else { cents }))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = (abs / 100).to_string();
        let mut grouped = String::new();
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        write!(f, "{sign}R$ {grouped},{:02}", abs % 100)
    }
}

/// Parse a portal date in `dd/mm/yyyy` form.
pub fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

/// One protested title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtestLineItem {
    pub value: Money,
    pub protest_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub cancellation_authorized: bool,
    pub cancellation_cost: Option<Money>,
}

/// A notary office holding protests for the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryOfficeRecord {
    pub name: String,
    pub city: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub title_count: u32,
    pub titles: Vec<ProtestLineItem>,
    /// False when the detail view was never opened (deadline or office cap).
    pub details_loaded: bool,
}

/// Why a result is incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    GlobalDeadline,
    RowTimeout,
    OfficeCap,
}

/// Marks a result whose detail drill-down stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMarker {
    pub reason: PartialReason,
    pub offices_processed: usize,
    pub offices_seen: usize,
}

/// Output of one lookup. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationResult {
    consultation_id: Uuid,
    document_id: DocumentId,
    timestamp: DateTime<Utc>,
    by_state: BTreeMap<StateCode, Vec<NotaryOfficeRecord>>,
    provider_used: ProviderKind,
    fallback_from: Option<ProviderKind>,
    partial: Option<PartialMarker>,
}

impl ConsultationResult {
    pub fn new(
        document_id: DocumentId,
        provider_used: ProviderKind,
        by_state: BTreeMap<StateCode, Vec<NotaryOfficeRecord>>,
        partial: Option<PartialMarker>,
    ) -> Self {
        Self {
            consultation_id: Uuid::new_v4(),
            document_id,
            timestamp: Utc::now(),
            by_state,
            provider_used,
            fallback_from: None,
            partial,
        }
    }

    /// A definitive "no protests" answer.
    pub fn empty(document_id: DocumentId, provider_used: ProviderKind) -> Self {
        Self::new(document_id, provider_used, BTreeMap::new(), None)
    }

    /// Tag a result served by the fallback provider.
    pub fn with_fallback_from(mut self, primary: ProviderKind) -> Self {
        self.fallback_from = Some(primary);
        self
    }

    pub fn consultation_id(&self) -> Uuid {
        self.consultation_id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn by_state(&self) -> &BTreeMap<StateCode, Vec<NotaryOfficeRecord>> {
        &self.by_state
    }

    pub fn provider_used(&self) -> ProviderKind {
        self.provider_used
    }

    pub fn fallback_from(&self) -> Option<ProviderKind> {
        self.fallback_from
    }

    pub fn partial(&self) -> Option<&PartialMarker> {
        self.partial.as_ref()
    }

    pub fn has_protests(&self) -> bool {
        self.by_state.values().any(|offices| !offices.is_empty())
    }

    pub fn office_count(&self) -> usize {
        self.by_state.values().map(Vec::len).sum()
    }

    pub fn total_titles(&self) -> u32 {
        self.by_state
            .values()
            .flatten()
            .map(|o| o.title_count)
            .sum()
    }
}

/// Snapshot of the page pool for health surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub created: usize,
    pub idle_count: usize,
    pub leased_ids: Vec<u64>,
    pub session_age_secs: Option<u64>,
    pub fresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_accepts_punctuated_cnpj() {
        let doc = DocumentId::parse("11.222.333/0001-81").unwrap();
        assert_eq!(doc.as_str(), "11222333000181");
        assert!(doc.is_cnpj());
        assert_eq!(doc.formatted(), "11.222.333/0001-81");
    }

    #[test]
    fn test_document_accepts_cpf() {
        let doc = DocumentId::parse("529.982.247-25").unwrap();
        assert!(!doc.is_cnpj());
        assert_eq!(doc.formatted(), "529.982.247-25");
    }

    #[test]
    fn test_document_rejects_bad_check_digit() {
        let err = DocumentId::parse("11.222.333/0001-82").unwrap_err();
        assert_eq!(err.kind(), "invalid_document");
        assert!(DocumentId::parse("11111111111111").is_err());
        assert!(DocumentId::parse("1234").is_err());
        assert!(DocumentId::parse("11222333000181x").is_err());
    }

    #[test]
    fn test_state_code_variants() {
        assert_eq!(StateCode::parse("sp").unwrap().as_str(), "SP");
        assert_eq!(StateCode::parse("São Paulo").unwrap().as_str(), "SP");
        assert_eq!(StateCode::parse("RJ - Rio de Janeiro").unwrap().as_str(), "RJ");
        assert!(StateCode::parse("Atlantis").is_none());
        assert!(StateCode::parse("SPX").is_none());
    }

    #[test]
    fn test_money_brl_parsing() {
        assert_eq!(Money::from_brl("R$ 1.234,56").unwrap().cents(), 123_456);
        assert_eq!(Money::from_brl("R$1234").unwrap().cents(), 123_400);
        assert_eq!(Money::from_brl("0,5").unwrap().cents(), 50);
        assert!(Money::from_brl("R$ ").is_none());
        assert!(Money::from_brl("abc").is_none());
        assert_eq!(Money::from_decimal("1234.56").unwrap().cents(), 123_456);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(123_456_78).to_string(), "R$ 123.456,78");
        assert_eq!(Money::from_cents(5).to_string(), "R$ 0,05");
    }

    #[test]
    fn test_br_date() {
        assert_eq!(
            parse_br_date("05/03/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert!(parse_br_date("2024-03-05").is_none());
    }

    #[test]
    fn test_empty_result_has_no_protests() {
        let doc = DocumentId::parse("11222333000181").unwrap();
        let result = ConsultationResult::empty(doc, ProviderKind::BrowserPool);
        assert!(!result.has_protests());
        assert!(result.by_state().is_empty());
        assert!(result.partial().is_none());
        assert_eq!(result.fallback_from(), None);
    }

    #[test]
    fn test_result_serializes_provider_tag() {
        let doc = DocumentId::parse("11222333000181").unwrap();
        let result = ConsultationResult::empty(doc, ProviderKind::BrowserPool)
            .with_fallback_from(ProviderKind::OfficialApi);
        let json = serde_json::to_value(&result).unwrap();
        assert_json_diff::assert_json_include!(
            actual: json,
            expected: serde_json::json!({
                "document_id": "11222333000181",
                "provider_used": "browser_pool",
                "fallback_from": "official_api",
                "by_state": {},
            })
        );
    }
}
