// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted portal and mailbox fakes shared by the integration tests.

#![allow(dead_code)]

pub mod api;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use protesto_runtime::auth::Authenticator;
use protesto_runtime::config::{EngineConfig, ProviderMode};
use protesto_runtime::mail::{Mailbox, MessageId};
use protesto_runtime::otp::extract::CodeExtractor;
use protesto_runtime::otp::OtpChannel;
use protesto_runtime::pool::PagePool;
use protesto_runtime::portal::PortalProfile;
use protesto_runtime::renderer::{NavigationResult, PageFactory, PortalPage};
use protesto_runtime::ProtestEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://portal.test";
pub const CNPJ: &str = "11.222.333/0001-81";

// ── Mailbox ──────────────────────────────────────────────────────────────

struct StoredMessage {
    id: MessageId,
    body: String,
    deleted: bool,
}

#[derive(Default)]
struct MailState {
    next_uid: u32,
    messages: Vec<StoredMessage>,
    log: Vec<String>,
    connects: usize,
    search_stall: Option<Duration>,
}

/// In-memory mailbox that records every operation.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailState>,
}

pub fn otp_email(code: &str) -> String {
    format!("Olá! Seu código de acesso é {code}. Este código expira em 10 minutos.")
}

impl FakeMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, body: &str) -> MessageId {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let id = MessageId(state.next_uid);
        state.messages.push(StoredMessage {
            id,
            body: body.to_string(),
            deleted: false,
        });
        state.log.push(format!("deliver:{id}"));
        id
    }

    pub fn deliver_code(&self, code: &str) -> MessageId {
        self.deliver(&otp_email(code))
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn is_deleted(&self, id: MessageId) -> bool {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .any(|m| m.id == id && m.deleted)
    }

    pub fn live_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| !m.deleted)
            .count()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Make every later search hang for `stall` before answering.
    pub fn stall_searches(&self, stall: Duration) {
        self.state.lock().unwrap().search_stall = Some(stall);
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn connect(&self) -> Result<()> {
        self.state.lock().unwrap().connects += 1;
        Ok(())
    }

    async fn search_recent(&self, _sender: &str, _window: Duration) -> Result<Vec<MessageId>> {
        let stall = self.state.lock().unwrap().search_stall;
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        let mut state = self.state.lock().unwrap();
        state.log.push("search".to_string());
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| !m.deleted)
            .map(|m| m.id)
            .collect())
    }

    async fn fetch_body(&self, id: MessageId) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("fetch:{id}"));
        state
            .messages
            .iter()
            .find(|m| m.id == id && !m.deleted)
            .map(|m| m.body.clone())
            .ok_or_else(|| anyhow!("no message {id}"))
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("delete:{id}"));
        for m in state.messages.iter_mut().filter(|m| m.id == id) {
            m.deleted = true;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

// ── Portal ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeOffice {
    pub name: String,
    pub city: String,
    pub titles: Vec<(String, String)>,
}

impl FakeOffice {
    pub fn new(name: &str, city: &str, titles: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            city: city.to_string(),
            titles: titles
                .iter()
                .map(|(v, d)| (v.to_string(), d.to_string()))
                .collect(),
        }
    }
}

/// What the portal renders after a search.
#[derive(Debug, Clone)]
pub enum SearchScript {
    NoRecords,
    TitleOnly,
    Found(Vec<(String, Vec<FakeOffice>)>),
    NeverRenders,
}

impl SearchScript {
    /// Two offices in SP, one in RJ.
    pub fn three_offices() -> Self {
        Self::Found(vec![
            (
                "Protestos em SP - São Paulo".to_string(),
                vec![
                    FakeOffice::new("1º Tabelião", "São Paulo", &[("R$ 1.234,56", "05/03/2024")]),
                    FakeOffice::new(
                        "2º Tabelião",
                        "Campinas",
                        &[("R$ 10,00", "01/02/2024"), ("R$ 20,00", "02/02/2024")],
                    ),
                ],
            ),
            (
                "RJ".to_string(),
                vec![FakeOffice::new("Ofício Único", "Niterói", &[("R$ 99,90", "10/10/2023")])],
            ),
        ])
    }

    fn offices(&self) -> Vec<FakeOffice> {
        match self {
            Self::Found(states) => states.iter().flat_map(|(_, o)| o.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Blank,
    LoginDocument,
    Titular,
    SendCode,
    OtpEntry,
    Dashboard,
    Search,
    Results,
}

#[derive(Debug, Clone)]
pub struct PageState {
    pub url: String,
    pub stage: Stage,
    pub logged_in: bool,
    pub expired: bool,
    pub closed: bool,
    pub navigations: usize,
    pub reloads: usize,
    pub modal_open: Option<usize>,
    pub otp_error: bool,
    /// Results-title reads since the last search was submitted.
    result_polls: usize,
    titular_checked: bool,
    expected_code: Option<String>,
    fields: HashMap<String, String>,
}

impl PageState {
    fn new() -> Self {
        Self {
            url: "about:blank".to_string(),
            stage: Stage::Blank,
            logged_in: false,
            expired: false,
            closed: false,
            navigations: 0,
            reloads: 0,
            modal_open: None,
            otp_error: false,
            result_polls: 0,
            titular_checked: false,
            expected_code: None,
            fields: HashMap::new(),
        }
    }
}

pub struct SimState {
    next_page: u64,
    next_code: u32,
    pub pages: HashMap<u64, PageState>,
    /// "new:N", "close:N", "login:N", "shutdown" in order of occurrence.
    pub events: Vec<String>,
    pub codes_sent: Vec<String>,
    pub codes_submitted: Vec<String>,
    pub logins: usize,
    pub searches: usize,
    pub reject_next: usize,
    pub deliver_codes: bool,
    pub hide_titular: bool,
    pub search: SearchScript,
    /// Rows at or after this index never finish loading their detail view.
    pub stall_from_row: Option<usize>,
    /// Result polls that show a loading placeholder before the real answer.
    pub loading_polls: usize,
}

/// Scripted stand-in for the protest portal.
pub struct PortalSim {
    pub state: Mutex<SimState>,
    mailbox: Arc<FakeMailbox>,
    profile: PortalProfile,
}

impl PortalSim {
    pub fn new(mailbox: Arc<FakeMailbox>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState {
                next_page: 0,
                next_code: 0,
                pages: HashMap::new(),
                events: Vec::new(),
                codes_sent: Vec::new(),
                codes_submitted: Vec::new(),
                logins: 0,
                searches: 0,
                reject_next: 0,
                deliver_codes: true,
                hide_titular: false,
                search: SearchScript::NoRecords,
                stall_from_row: None,
                loading_polls: 0,
            }),
            mailbox,
            profile: PortalProfile::new(BASE),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut *self.state.lock().unwrap())
    }

    pub fn events(&self) -> Vec<String> {
        self.with(|s| s.events.clone())
    }

    pub fn logins(&self) -> usize {
        self.with(|s| s.logins)
    }

    pub fn page(&self, id: u64) -> Option<PageState> {
        self.with(|s| s.pages.get(&id).cloned())
    }

    pub fn open_pages(&self) -> Vec<u64> {
        self.with(|s| {
            let mut ids: Vec<u64> = s
                .pages
                .iter()
                .filter(|(_, p)| !p.closed)
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            ids
        })
    }

    pub fn any_modal_open(&self) -> bool {
        self.with(|s| s.pages.values().any(|p| p.modal_open.is_some()))
    }

    pub fn expire_all_pages(&self) {
        self.with(|s| {
            for p in s.pages.values_mut() {
                p.expired = true;
            }
        })
    }

    fn url(path: &str) -> String {
        format!("{BASE}{path}")
    }

    fn send_code(&self, state: &mut SimState, page: u64) {
        if !state.deliver_codes {
            return;
        }
        state.next_code += 1;
        let code = format!("{}", 100_000 + state.next_code);
        state.codes_sent.push(code.clone());
        if let Some(p) = state.pages.get_mut(&page) {
            p.expected_code = Some(code.clone());
        }
        self.mailbox.deliver_code(&code);
    }

    fn count_one(&self, state: &SimState, page: &PageState, sel: &str) -> usize {
        let login = &self.profile.login;
        let search = &self.profile.search;
        let present = if sel == login.document_input {
            page.stage == Stage::LoginDocument
        } else if sel == login.titular_checkbox {
            page.stage == Stage::Titular && !state.hide_titular
        } else if sel == login.send_code_button {
            page.stage == Stage::SendCode
        } else if sel == login.otp_input || sel == login.resend_code_button {
            page.stage == Stage::OtpEntry
        } else if sel == login.otp_error {
            page.stage == Stage::OtpEntry && page.otp_error
        } else if sel == search.document_input {
            matches!(page.stage, Stage::Search | Stage::Results)
        } else if sel == self.profile.detail.modal {
            page.modal_open.is_some()
        } else if sel == search.detail_button {
            return if page.stage == Stage::Results {
                state.search.offices().len()
            } else {
                0
            };
        } else {
            false
        };
        usize::from(present)
    }

    fn summary_html(script: &SearchScript) -> String {
        let SearchScript::Found(states) = script else {
            return String::new();
        };
        let mut html = String::from(
            r#"<div id="resultado-consulta"><h2 class="resultado-titulo">Constam protestos</h2>"#,
        );
        for (heading, offices) in states {
            html.push_str(&format!(
                r#"<section class="uf-secao"><h3 class="uf-titulo">{heading}</h3>"#
            ));
            for office in offices {
                html.push_str(&format!(
                    r#"<div class="cartorio-linha"><span class="cartorio-nome">{}</span><span class="cartorio-cidade">{}</span><span class="cartorio-quantidade">{}</span><button class="btn-detalhes">Detalhes</button></div>"#,
                    office.name,
                    office.city,
                    office.titles.len()
                ));
            }
            html.push_str("</section>");
        }
        html.push_str("</div>");
        html
    }

    fn detail_html(office: &FakeOffice, row: usize) -> String {
        let mut html = format!(
            r#"<div class="modal-detalhes aberto"><p class="detalhe-endereco">Rua {row}, Centro</p><p class="detalhe-telefone">(11) 3000-000{row}</p><table>"#
        );
        for (value, date) in &office.titles {
            html.push_str(&format!(
                r#"<tr class="titulo-linha"><td class="titulo-valor">{value}</td><td class="titulo-data-protesto">{date}</td><td class="titulo-anuencia">Sim</td></tr>"#
            ));
        }
        html.push_str(r#"</table><button class="btn-fechar">Fechar</button></div>"#);
        html
    }
}

/// Factory wrapper so pages can hold the simulator.
pub struct SimFactory(pub Arc<PortalSim>);

#[async_trait]
impl PageFactory for SimFactory {
    async fn new_page(&self) -> Result<Arc<dyn PortalPage>> {
        let id = self.0.with(|state| {
            state.next_page += 1;
            let id = state.next_page;
            state.pages.insert(id, PageState::new());
            state.events.push(format!("new:{id}"));
            id
        });
        Ok(Arc::new(FakePage {
            id,
            sim: Arc::clone(&self.0),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.0.with(|s| s.events.push("shutdown".to_string()));
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.0.open_pages().len()
    }
}

pub struct FakePage {
    pub id: u64,
    sim: Arc<PortalSim>,
}

impl FakePage {
    fn with_page<R>(&self, f: impl FnOnce(&PortalSim, &mut SimState, u64) -> Result<R>) -> Result<R> {
        let mut state = self.sim.state.lock().unwrap();
        match state.pages.get(&self.id) {
            Some(p) if p.closed => bail!("page {} is closed", self.id),
            Some(_) => {}
            None => bail!("page {} unknown", self.id),
        }
        f(&*self.sim, &mut *state, self.id)
    }
}

fn page_mut(state: &mut SimState, id: u64) -> Result<&mut PageState> {
    state.pages.get_mut(&id).ok_or_else(|| anyhow!("page {id} unknown"))
}

#[async_trait]
impl PortalPage for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        self.with_page(|_, state, id| {
            let path = url.strip_prefix(BASE).unwrap_or(url).to_string();
            let page = page_mut(state, id)?;
            page.navigations += 1;
            page.modal_open = None;
            if path.starts_with("/painel") && page.logged_in {
                page.url = PortalSim::url(&path);
                page.stage = if path.starts_with("/painel/consulta") {
                    Stage::Search
                } else {
                    Stage::Dashboard
                };
            } else {
                page.url = PortalSim::url("/login");
                page.stage = Stage::LoginDocument;
                page.otp_error = false;
                page.titular_checked = false;
            }
            Ok(NavigationResult {
                final_url: page.url.clone(),
                load_time_ms: 1,
            })
        })
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.with_page(|sim, state, id| {
            let snapshot = page_mut(state, id)?.clone();
            if sim.count_one(state, &snapshot, selector) == 0 {
                bail!("no input matches {selector}");
            }
            page_mut(state, id)?
                .fields
                .insert(selector.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.with_page(|sim, state, id| {
            let login = &sim.profile.login;
            let search = &sim.profile.search;
            let detail = &sim.profile.detail;
            let hide_titular = state.hide_titular;
            let page = page_mut(state, id)?;
            match page.stage {
                Stage::LoginDocument if selector == login.document_submit => {
                    if !page.fields.contains_key(&login.document_input) {
                        bail!("document empty");
                    }
                    page.stage = Stage::Titular;
                }
                Stage::Titular if selector == login.titular_checkbox && !hide_titular => {
                    page.titular_checked = true;
                }
                Stage::Titular if selector == login.titular_confirm => {
                    if !page.titular_checked {
                        bail!("titular not confirmed");
                    }
                    page.stage = Stage::SendCode;
                }
                Stage::SendCode if selector == login.send_code_button => {
                    page.stage = Stage::OtpEntry;
                    sim.send_code(state, id);
                }
                Stage::OtpEntry if selector == login.otp_submit => {
                    let code = page.fields.get(&login.otp_input).cloned().unwrap_or_default();
                    let expected = page.expected_code.clone();
                    state.codes_submitted.push(code.clone());
                    let reject = state.reject_next > 0;
                    if reject {
                        state.reject_next -= 1;
                    }
                    let page = page_mut(state, id)?;
                    if !reject && expected.as_deref() == Some(code.as_str()) {
                        page.logged_in = true;
                        page.expired = false;
                        page.otp_error = false;
                        page.stage = Stage::Dashboard;
                        page.url = PortalSim::url("/painel");
                        state.logins += 1;
                        state.events.push(format!("login:{id}"));
                    } else {
                        page.otp_error = true;
                    }
                }
                Stage::OtpEntry if selector == login.resend_code_button => {
                    page.otp_error = false;
                    sim.send_code(state, id);
                }
                Stage::Search if selector == search.submit => {
                    if !page.fields.contains_key(&search.document_input) {
                        bail!("search document empty");
                    }
                    page.stage = Stage::Results;
                    page.result_polls = 0;
                    state.searches += 1;
                }
                Stage::Results if selector == detail.close_button => {
                    if page.modal_open.is_none() {
                        bail!("no open detail view");
                    }
                    page.modal_open = None;
                }
                stage => bail!("nothing clickable matches {selector} at {stage:?}"),
            }
            Ok(())
        })
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        self.with_page(|sim, state, id| {
            if selector != sim.profile.search.detail_button {
                bail!("nothing clickable matches {selector}");
            }
            let rows = state.search.offices().len();
            let page = page_mut(state, id)?;
            if page.stage != Stage::Results || index >= rows {
                bail!("no row {index}");
            }
            page.modal_open = Some(index);
            Ok(())
        })
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        self.with_page(|sim, state, id| {
            let page = page_mut(state, id)?.clone();
            if selector == sim.profile.login.otp_error {
                return Ok((page.stage == Stage::OtpEntry && page.otp_error)
                    .then(|| "Código inválido. Solicite um novo código.".to_string()));
            }
            if page.stage != Stage::Results {
                return Ok(None);
            }
            let search = &sim.profile.search;
            let loading = state.loading_polls;
            let polls = if selector == search.results_title {
                let live = page_mut(state, id)?;
                live.result_polls += 1;
                live.result_polls
            } else {
                page.result_polls + 1
            };
            let is_result_area = selector == search.results_title || selector == search.results_container;
            if is_result_area && polls <= loading {
                return Ok(Some("Carregando...".to_string()));
            }
            let text = match (&state.search, selector) {
                (SearchScript::NeverRenders, _) => None,
                (SearchScript::NoRecords | SearchScript::TitleOnly, s) if s == search.results_title => {
                    Some("Não constam protestos".to_string())
                }
                (SearchScript::NoRecords, s) if s == search.results_container => Some(
                    "Não constam protestos. Para o documento informado não foram encontrados protestos nos cartórios participantes."
                        .to_string(),
                ),
                (SearchScript::TitleOnly, s) if s == search.results_container => {
                    Some("Não constam protestos".to_string())
                }
                (SearchScript::Found(_), s) if s == search.results_title => {
                    Some("Constam protestos".to_string())
                }
                (SearchScript::Found(_), s) if s == search.results_container => {
                    Some("Constam protestos para o documento informado".to_string())
                }
                _ => None,
            };
            Ok(text)
        })
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.with_page(|sim, state, id| {
            let page = page_mut(state, id)?.clone();
            let shared: &SimState = state;
            Ok(selector
                .split(',')
                .map(str::trim)
                .map(|s| sim.count_one(shared, &page, s))
                .sum())
        })
    }

    async fn content(&self) -> Result<String> {
        let (html, stalled) = self.with_page(|_, state, id| {
            let page = page_mut(state, id)?.clone();
            if page.stage != Stage::Results {
                return Ok((String::from("<html><body></body></html>"), false));
            }
            let offices = state.search.offices();
            let mut html = format!(
                "<html><body>{}",
                PortalSim::summary_html(&state.search)
            );
            let mut stalled = false;
            if let Some(row) = page.modal_open {
                stalled = state.stall_from_row.is_some_and(|from| row >= from);
                if let Some(office) = offices.get(row) {
                    html.push_str(&PortalSim::detail_html(office, row));
                }
            }
            html.push_str("</body></html>");
            Ok((html, stalled))
        })?;
        if stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(html)
    }

    async fn current_url(&self) -> Result<String> {
        self.with_page(|_, state, id| Ok(page_mut(state, id)?.url.clone()))
    }

    async fn wait_for_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        self.with_page(|_, state, id| {
            let page = page_mut(state, id)?;
            page.reloads += 1;
            page.modal_open = None;
            if page.expired {
                page.expired = false;
                page.logged_in = false;
                page.url = PortalSim::url("/login");
                page.stage = Stage::LoginDocument;
            } else if page.stage == Stage::Results {
                page.stage = Stage::Search;
            }
            Ok(())
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.sim.state.lock().unwrap();
        if let Some(page) = state.pages.get_mut(&self.id) {
            if !page.closed {
                page.closed = true;
                state.events.push(format!("close:{}", self.id));
            }
        }
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────

/// Engine configuration with timeouts sized for the fakes.
pub fn test_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.provider = ProviderMode::Browser;
    cfg.portal.base_url = BASE.to_string();
    cfg.portal.login_document = "52998224725".to_string();
    cfg.portal.navigation_timeout = Duration::from_secs(1);
    cfg.portal.step_timeout = Duration::from_millis(300);
    cfg.mailbox.username = "ops@example.com".to_string();
    cfg.mailbox.password = "app-password".to_string();
    cfg.mailbox.poll_interval = Duration::from_millis(10);
    cfg.mailbox.io_timeout = Duration::from_millis(200);
    cfg.pool.capacity = 2;
    cfg.pool.lease_timeout = Duration::from_secs(2);
    cfg.pool.keepalive_interval = Duration::from_secs(3600);
    cfg.pool.drain_timeout = Duration::from_millis(200);
    cfg.otp.cooldown = Duration::from_millis(10);
    cfg.otp.wait_timeout = Duration::from_millis(300);
    cfg.extraction.global_deadline = Duration::from_secs(3);
    cfg.extraction.row_timeout = Duration::from_secs(1);
    cfg.extraction.search_poll_attempts = 5;
    cfg.extraction.search_poll_interval = Duration::from_millis(10);
    cfg
}

pub struct Harness {
    pub sim: Arc<PortalSim>,
    pub mailbox: Arc<FakeMailbox>,
    pub otp: Arc<OtpChannel>,
    pub auth: Arc<Authenticator>,
    pub pool: Arc<PagePool>,
}

pub fn harness(config: &EngineConfig) -> Harness {
    let mailbox = FakeMailbox::new();
    let sim = PortalSim::new(Arc::clone(&mailbox));
    let profile = Arc::new(PortalProfile::new(&config.portal.base_url));
    let otp = Arc::new(OtpChannel::new(
        Arc::clone(&mailbox) as Arc<dyn Mailbox>,
        CodeExtractor::for_portal(&profile.texts),
        &config.mailbox,
    ));
    let auth = Arc::new(Authenticator::new(
        profile,
        Arc::clone(&otp),
        config.otp.clone(),
        &config.portal,
    ));
    let pool = PagePool::new(
        Arc::new(SimFactory(Arc::clone(&sim))),
        Arc::clone(&auth),
        config.pool.clone(),
    );
    Harness {
        sim,
        mailbox,
        otp,
        auth,
        pool,
    }
}

/// A browser-mode engine over a fresh simulator.
pub fn engine(config: EngineConfig) -> (ProtestEngine, Arc<PortalSim>, Arc<FakeMailbox>) {
    let mailbox = FakeMailbox::new();
    let sim = PortalSim::new(Arc::clone(&mailbox));
    let engine = ProtestEngine::from_parts(
        config,
        Some(Arc::new(SimFactory(Arc::clone(&sim))) as Arc<dyn PageFactory>),
        Arc::clone(&mailbox) as Arc<dyn Mailbox>,
    )
    .unwrap();
    (engine, sim, mailbox)
}
