// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTML parsing of the results summary and the office detail view.

use crate::error::{ProtestoError, Result};
use crate::portal::{DetailSelectors, SearchSelectors};
use crate::types::{parse_br_date, Money, ProtestLineItem, StateCode};
use scraper::{ElementRef, Html, Selector};

/// One office row in the results summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeSummary {
    /// Position among all detail buttons on the page.
    pub row_index: usize,
    pub name: String,
    pub city: String,
    pub title_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSection {
    pub state: StateCode,
    pub offices: Vec<OfficeSummary>,
}

/// Contents of one opened detail view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OfficeDetail {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub titles: Vec<ProtestLineItem>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ProtestoError::Config(format!("bad selector '{css}': {e}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn leading_number(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Find the state a section heading names.
///
/// Headings come as "SP", "SP - São Paulo", "São Paulo" or
/// "Protestos em SP - São Paulo".
pub fn state_from_heading(heading: &str) -> Option<StateCode> {
    if let Some(code) = StateCode::parse(heading) {
        return Some(code);
    }
    let tail = heading
        .rsplit_once(" em ")
        .map(|(_, t)| t)
        .unwrap_or(heading);
    if let Some(code) = StateCode::parse(tail) {
        return Some(code);
    }
    heading
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() == 2 && tok.chars().all(|c| c.is_ascii_uppercase()))
        .find_map(StateCode::parse)
}

/// Parse every state section and office row of a positive answer.
pub fn parse_summary(html: &str, sel: &SearchSelectors) -> Result<Vec<StateSection>> {
    let doc = Html::parse_document(html);
    let section_sel = selector(&sel.state_section)?;
    let heading_sel = selector(&sel.state_heading)?;
    let row_sel = selector(&sel.office_row)?;
    let name_sel = selector(&sel.office_name)?;
    let city_sel = selector(&sel.office_city)?;
    let count_sel = selector(&sel.office_title_count)?;

    let mut sections = Vec::new();
    let mut row_index = 0;
    for section in doc.select(&section_sel) {
        let heading = first_text(section, &heading_sel).unwrap_or_default();
        let state = state_from_heading(&heading).ok_or_else(|| {
            ProtestoError::TechnicalSite(format!("unrecognized state heading '{heading}'"))
        })?;

        let mut offices = Vec::new();
        for row in section.select(&row_sel) {
            let name = first_text(row, &name_sel).ok_or_else(|| {
                ProtestoError::TechnicalSite(format!("office row {row_index} has no name"))
            })?;
            offices.push(OfficeSummary {
                row_index,
                name,
                city: first_text(row, &city_sel).unwrap_or_default(),
                title_count: first_text(row, &count_sel)
                    .as_deref()
                    .and_then(leading_number)
                    .unwrap_or(0),
            });
            row_index += 1;
        }
        sections.push(StateSection { state, offices });
    }
    Ok(sections)
}

fn cancellation_flag(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    !lower.contains("não") && !lower.contains("nao")
        && (lower.contains("sim") || lower.contains("autoriza"))
}

/// Parse the open detail view.
pub fn parse_detail(html: &str, sel: &DetailSelectors) -> Result<OfficeDetail> {
    let doc = Html::parse_document(html);
    let modal_sel = selector(&sel.modal)?;
    let modal = doc
        .select(&modal_sel)
        .next()
        .ok_or_else(|| ProtestoError::TechnicalSite("detail view is not open".to_string()))?;

    let row_sel = selector(&sel.title_row)?;
    let value_sel = selector(&sel.title_value)?;
    let protest_sel = selector(&sel.title_protest_date)?;
    let due_sel = selector(&sel.title_due_date)?;
    let cancel_sel = selector(&sel.title_cancellation)?;
    let cost_sel = selector(&sel.title_cancellation_cost)?;

    let mut titles = Vec::new();
    for row in modal.select(&row_sel) {
        let raw_value = first_text(row, &value_sel).unwrap_or_default();
        let Some(value) = Money::from_brl(&raw_value) else {
            tracing::debug!("skipping title row with unreadable value '{raw_value}'");
            continue;
        };
        titles.push(ProtestLineItem {
            value,
            protest_date: first_text(row, &protest_sel).as_deref().and_then(parse_br_date),
            due_date: first_text(row, &due_sel).as_deref().and_then(parse_br_date),
            cancellation_authorized: first_text(row, &cancel_sel)
                .as_deref()
                .is_some_and(cancellation_flag),
            cancellation_cost: first_text(row, &cost_sel)
                .as_deref()
                .and_then(Money::from_brl),
        });
    }

    Ok(OfficeDetail {
        address: first_text(modal, &selector(&sel.address)?),
        phone: first_text(modal, &selector(&sel.phone)?),
        titles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::PortalProfile;

    const SUMMARY: &str = r#"
<div id="resultado-consulta">
  <h2 class="resultado-titulo">Constam protestos</h2>
  <section class="uf-secao">
    <h3 class="uf-titulo">Protestos em SP - São Paulo</h3>
    <div class="cartorio-linha">
      <span class="cartorio-nome">1º Tabelião de Protesto</span>
      <span class="cartorio-cidade">São Paulo</span>
      <span class="cartorio-quantidade">2 títulos</span>
      <button class="btn-detalhes">Detalhes</button>
    </div>
    <div class="cartorio-linha">
      <span class="cartorio-nome">3º Tabelião de Protesto</span>
      <span class="cartorio-cidade">Campinas</span>
      <span class="cartorio-quantidade">1</span>
      <button class="btn-detalhes">Detalhes</button>
    </div>
  </section>
  <section class="uf-secao">
    <h3 class="uf-titulo">RJ</h3>
    <div class="cartorio-linha">
      <span class="cartorio-nome">Ofício Único</span>
      <span class="cartorio-cidade">Niterói</span>
      <button class="btn-detalhes">Detalhes</button>
    </div>
  </section>
</div>"#;

    const DETAIL: &str = r#"
<div class="modal-detalhes aberto">
  <p class="detalhe-endereco">Rua XV de Novembro, 175 - Centro</p>
  <p class="detalhe-telefone">(11) 3107-0000</p>
  <table>
    <tr class="titulo-linha">
      <td class="titulo-valor">R$ 1.234,56</td>
      <td class="titulo-data-protesto">05/03/2024</td>
      <td class="titulo-vencimento">10/02/2024</td>
      <td class="titulo-anuencia">Sim</td>
      <td class="titulo-custas">R$ 98,10</td>
    </tr>
    <tr class="titulo-linha">
      <td class="titulo-valor">R$ 50,00</td>
      <td class="titulo-data-protesto">--</td>
      <td class="titulo-vencimento"></td>
      <td class="titulo-anuencia">Não</td>
    </tr>
  </table>
</div>"#;

    #[test]
    fn test_parse_summary_rows_and_indices() {
        let profile = PortalProfile::new("https://p.example");
        let sections = parse_summary(SUMMARY, &profile.search).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].state.as_str(), "SP");
        assert_eq!(sections[0].offices.len(), 2);
        assert_eq!(sections[0].offices[0].title_count, 2);
        assert_eq!(sections[0].offices[1].city, "Campinas");
        assert_eq!(sections[1].state.as_str(), "RJ");
        assert_eq!(sections[1].offices[0].row_index, 2);
        assert_eq!(sections[1].offices[0].title_count, 0);
    }

    #[test]
    fn test_unknown_state_heading_is_technical() {
        let profile = PortalProfile::new("https://p.example");
        let html = r#"<div id="resultado-consulta"><section class="uf-secao">
            <h3 class="uf-titulo">Carregando</h3></section></div>"#;
        let err = parse_summary(html, &profile.search).unwrap_err();
        assert_eq!(err.kind(), "technical_site");
    }

    #[test]
    fn test_parse_detail() {
        let profile = PortalProfile::new("https://p.example");
        let detail = parse_detail(DETAIL, &profile.detail).unwrap();
        assert_eq!(detail.phone.as_deref(), Some("(11) 3107-0000"));
        assert_eq!(detail.titles.len(), 2);
        let first = &detail.titles[0];
        assert_eq!(first.value.cents(), 123_456);
        assert_eq!(first.protest_date, parse_br_date("05/03/2024"));
        assert!(first.cancellation_authorized);
        assert_eq!(first.cancellation_cost.map(Money::cents), Some(9_810));
        let second = &detail.titles[1];
        assert!(!second.cancellation_authorized);
        assert!(second.protest_date.is_none());
        assert!(second.cancellation_cost.is_none());
    }

    #[test]
    fn test_parse_detail_requires_open_modal() {
        let profile = PortalProfile::new("https://p.example");
        assert!(parse_detail("<div class=\"modal-detalhes\"></div>", &profile.detail).is_err());
    }

    #[test]
    fn test_state_from_heading_variants() {
        assert_eq!(state_from_heading("São Paulo").unwrap().as_str(), "SP");
        assert_eq!(state_from_heading("Protestos em MG").unwrap().as_str(), "MG");
        assert!(state_from_heading("Resultado").is_none());
    }
}
