// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Search outcome classification.

use crate::portal::PortalTexts;

/// What a rendered search answer says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Negative title together with the portal's explanatory sentence.
    NoRecords,
    /// Positive title; offices follow.
    Found,
    /// Anything else, including a negative title on its own.
    Ambiguous(String),
}

/// Classify the results title and container text.
///
/// A negative title only counts when the explanatory sentence is also
/// present; a half-rendered page often shows the title alone.
pub fn classify(title: &str, body: &str, texts: &PortalTexts) -> SearchOutcome {
    let title = normalize(title);
    let combined = format!("{title} {}", normalize(body));
    let negative_title = normalize(&texts.negative_title);
    let explanation = normalize(&texts.negative_explanation);
    let positive_title = normalize(&texts.positive_title);

    if combined.contains(&negative_title) {
        return if combined.contains(&explanation) {
            SearchOutcome::NoRecords
        } else {
            SearchOutcome::Ambiguous(format!(
                "negative title '{}' rendered without its explanation",
                texts.negative_title
            ))
        };
    }
    if combined.contains(&positive_title) {
        return SearchOutcome::Found;
    }
    if combined.trim().is_empty() {
        SearchOutcome::Ambiguous("results area rendered empty".to_string())
    } else {
        SearchOutcome::Ambiguous(format!("unrecognized results title '{}'", title.trim()))
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::PortalProfile;

    fn texts() -> PortalTexts {
        PortalProfile::new("https://p.example").texts
    }

    #[test]
    fn test_negative_title_alone_is_ambiguous() {
        let outcome = classify("Não constam protestos", "", &texts());
        assert!(matches!(outcome, SearchOutcome::Ambiguous(_)));
    }

    #[test]
    fn test_negative_title_with_explanation_is_no_records() {
        let outcome = classify(
            "Não constam protestos",
            "Para o documento informado,\n  NÃO foram encontrados protestos nos cartórios participantes.",
            &texts(),
        );
        assert_eq!(outcome, SearchOutcome::NoRecords);
    }

    #[test]
    fn test_negative_title_is_not_mistaken_for_positive() {
        // "Não constam protestos" contains "constam protestos".
        let outcome = classify("Não constam protestos", "Carregando...", &texts());
        assert_ne!(outcome, SearchOutcome::Found);
    }

    #[test]
    fn test_positive_title() {
        assert_eq!(
            classify("Constam protestos", "SP - São Paulo", &texts()),
            SearchOutcome::Found
        );
    }

    #[test]
    fn test_empty_and_unknown_are_ambiguous() {
        assert!(matches!(classify("", "  ", &texts()), SearchOutcome::Ambiguous(_)));
        assert!(matches!(
            classify("Serviço indisponível", "", &texts()),
            SearchOutcome::Ambiguous(_)
        ));
    }
}
