// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Portal profile: paths, selectors, and the fixed phrases the engine keys on.
//!
//! Everything the login flow and the extractor need to know about the
//! portal's markup lives here so a layout change touches one file.

use serde::{Deserialize, Serialize};

/// URLs, CSS selectors and text markers for the protest portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalProfile {
    pub base_url: String,
    pub login_path: String,
    pub dashboard_path: String,
    pub search_path: String,
    /// Neutral location pages are parked on between leases.
    pub home_path: String,

    pub login: LoginSelectors,
    pub search: SearchSelectors,
    pub detail: DetailSelectors,
    pub texts: PortalTexts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSelectors {
    pub document_input: String,
    pub document_submit: String,
    pub titular_checkbox: String,
    pub titular_confirm: String,
    pub send_code_button: String,
    pub otp_input: String,
    pub otp_submit: String,
    /// Shown when the portal refuses a code.
    pub otp_error: String,
    pub resend_code_button: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSelectors {
    pub document_input: String,
    pub submit: String,
    /// Container the results (positive or negative) render into.
    pub results_container: String,
    pub results_title: String,
    pub state_section: String,
    pub state_heading: String,
    pub office_row: String,
    pub office_name: String,
    pub office_city: String,
    pub office_title_count: String,
    pub detail_button: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    pub modal: String,
    pub address: String,
    pub phone: String,
    pub title_row: String,
    pub title_value: String,
    pub title_protest_date: String,
    pub title_due_date: String,
    pub title_cancellation: String,
    pub title_cancellation_cost: String,
    pub close_button: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalTexts {
    /// Title of a negative answer.
    pub negative_title: String,
    /// Sentence that must accompany the negative title for the answer to count.
    pub negative_explanation: String,
    pub positive_title: String,
    /// Phrases bracketing the code in the OTP email.
    pub otp_start_marker: String,
    pub otp_end_marker: String,
    /// Any of these in the OTP error banner means the code was refused.
    pub otp_rejection_phrases: Vec<String>,
}

impl PortalTexts {
    /// Whether `banner` reports a refused or expired code.
    pub fn is_otp_rejection(&self, banner: &str) -> bool {
        let banner = banner.to_lowercase();
        self.otp_rejection_phrases
            .iter()
            .any(|phrase| banner.contains(&phrase.to_lowercase()))
    }
}

impl PortalProfile {
    /// Default profile rooted at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_path: "/login".to_string(),
            dashboard_path: "/painel".to_string(),
            search_path: "/painel/consulta".to_string(),
            home_path: "/painel".to_string(),
            login: LoginSelectors {
                document_input: "input#documento".to_string(),
                document_submit: "button#btn-continuar".to_string(),
                titular_checkbox: "input#declaracao-titular".to_string(),
                titular_confirm: "button#btn-confirmar-titular".to_string(),
                send_code_button: "button#btn-enviar-codigo".to_string(),
                otp_input: "input#codigo-verificacao".to_string(),
                otp_submit: "button#btn-validar-codigo".to_string(),
                otp_error: ".alert-codigo-invalido".to_string(),
                resend_code_button: "button#btn-reenviar-codigo".to_string(),
            },
            search: SearchSelectors {
                document_input: "input#documento-consulta".to_string(),
                submit: "button#btn-consultar".to_string(),
                results_container: "#resultado-consulta".to_string(),
                results_title: "#resultado-consulta .resultado-titulo".to_string(),
                state_section: "#resultado-consulta .uf-secao".to_string(),
                state_heading: ".uf-titulo".to_string(),
                office_row: ".cartorio-linha".to_string(),
                office_name: ".cartorio-nome".to_string(),
                office_city: ".cartorio-cidade".to_string(),
                office_title_count: ".cartorio-quantidade".to_string(),
                detail_button: "#resultado-consulta .cartorio-linha .btn-detalhes".to_string(),
            },
            detail: DetailSelectors {
                modal: ".modal-detalhes.aberto".to_string(),
                address: ".detalhe-endereco".to_string(),
                phone: ".detalhe-telefone".to_string(),
                title_row: ".titulo-linha".to_string(),
                title_value: ".titulo-valor".to_string(),
                title_protest_date: ".titulo-data-protesto".to_string(),
                title_due_date: ".titulo-vencimento".to_string(),
                title_cancellation: ".titulo-anuencia".to_string(),
                title_cancellation_cost: ".titulo-custas".to_string(),
                close_button: ".modal-detalhes.aberto .btn-fechar".to_string(),
            },
            texts: PortalTexts {
                negative_title: "Não constam protestos".to_string(),
                negative_explanation:
                    "não foram encontrados protestos nos cartórios participantes".to_string(),
                positive_title: "Constam protestos".to_string(),
                otp_start_marker: "Seu código de acesso é".to_string(),
                otp_end_marker: "Este código expira".to_string(),
                otp_rejection_phrases: vec![
                    "Código inválido".to_string(),
                    "inválido".to_string(),
                    "expirado".to_string(),
                ],
            },
        }
    }

    pub fn login_url(&self) -> String {
        self.url(&self.login_path)
    }

    pub fn dashboard_url(&self) -> String {
        self.url(&self.dashboard_path)
    }

    pub fn search_url(&self) -> String {
        self.url(&self.search_path)
    }

    pub fn home_url(&self) -> String {
        self.url(&self.home_path)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether `url` is the login page (the portal bounced us out).
    pub fn is_login_url(&self, url: &str) -> bool {
        path_of(url).starts_with(&self.login_path)
    }

    /// Whether `url` is inside the authenticated area.
    pub fn is_dashboard_url(&self, url: &str) -> bool {
        path_of(url).starts_with(&self.dashboard_path)
    }

    pub fn is_search_url(&self, url: &str) -> bool {
        path_of(url).starts_with(&self.search_path)
    }
}

fn path_of(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.to_string(),
    }
}
