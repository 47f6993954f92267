// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! Every knob has a default; `EngineConfig::from_env` overlays `PROTESTO_*`
//! environment variables on top, and `validate` rejects combinations the
//! engine cannot run with.

use crate::error::{ProtestoError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_POOL_CAPACITY: usize = 10;
const DEFAULT_PORTAL_URL: &str = "https://www.pesquisaprotesto.com.br";
const DEFAULT_OTP_SENDER: &str = "naoresponda@pesquisaprotesto.com.br";

/// Which providers are configured and which one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Official API only.
    Api,
    /// Browser pool only.
    Browser,
    /// Official API active, browser pool as fallback.
    Hybrid,
}

impl ProviderMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "api" | "official_api" => Some(Self::Api),
            "browser" | "browser_pool" => Some(Self::Browser),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn uses_api(self) -> bool {
        matches!(self, Self::Api | Self::Hybrid)
    }

    pub fn uses_browser(self) -> bool {
        matches!(self, Self::Browser | Self::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Browser => "browser",
            Self::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal origin; login, search and dashboard paths hang off it.
    pub base_url: String,
    /// CPF/CNPJ of the account holder used to log in.
    pub login_document: String,
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    /// Where failed-login screenshots are written, if anywhere.
    pub screenshot_dir: Option<PathBuf>,
    pub navigation_timeout: Duration,
    /// Wait budget for each guarded login step's verification.
    pub step_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            login_document: String::new(),
            headless: true,
            chromium_path: None,
            screenshot_dir: None,
            navigation_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    /// Address the portal sends codes from.
    pub sender: String,
    /// How far back a message may be and still count as fresh.
    pub search_window: Duration,
    pub poll_interval: Duration,
    /// Read/write timeout on the IMAP socket.
    pub io_timeout: Duration,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("folder", &self.folder)
            .field("sender", &self.sender)
            .field("search_window", &self.search_window)
            .field("poll_interval", &self.poll_interval)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            username: String::new(),
            password: String::new(),
            folder: "INBOX".to_string(),
            sender: DEFAULT_OTP_SENDER.to_string(),
            search_window: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(3),
            io_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on pages ever created.
    pub capacity: usize,
    pub lease_timeout: Duration,
    pub keepalive_interval: Duration,
    /// Age after which the whole pool is discarded and rebuilt.
    pub freshness_window: Duration,
    /// How long a rebuild waits for leased pages to come back before closing them.
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            lease_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(4 * 60),
            freshness_window: Duration::from_secs(2 * 60 * 60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub max_attempts: u32,
    /// Pause after purging a rejected code before asking for the next one.
    pub cooldown: Duration,
    /// How long to poll the mailbox for one code.
    pub wait_timeout: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionLimits {
    /// Wall-clock budget for one whole consultation on a leased page.
    pub global_deadline: Duration,
    /// Budget for one notary-office detail view.
    pub row_timeout: Duration,
    pub max_offices: usize,
    pub search_poll_attempts: u32,
    pub search_poll_interval: Duration,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            global_deadline: Duration::from_secs(90),
            row_timeout: Duration::from_secs(15),
            max_offices: 50,
            search_poll_attempts: 20,
            search_poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    /// Extra headers sent on every call (e.g. an API key).
    pub headers: Vec<(String, String)>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_ttl: Duration::from_secs(23 * 60 * 60 + 30 * 60),
            request_timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provider: ProviderMode,
    pub portal: PortalConfig,
    pub mailbox: MailboxConfig,
    pub pool: PoolConfig,
    pub otp: OtpConfig,
    pub extraction: ExtractionLimits,
    pub api: ApiConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderMode::Browser,
            portal: PortalConfig::default(),
            mailbox: MailboxConfig::default(),
            pool: PoolConfig::default(),
            otp: OtpConfig::default(),
            extraction: ExtractionLimits::default(),
            api: ApiConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `PROTESTO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(raw) = read_env_string("PROTESTO_PROVIDER") {
            cfg.provider = ProviderMode::parse(&raw)
                .ok_or_else(|| ProtestoError::Config(format!("unknown provider mode '{raw}'")))?;
        }

        let portal = &mut cfg.portal;
        if let Some(url) = read_env_string("PROTESTO_PORTAL_URL") {
            portal.base_url = url;
        }
        if let Some(doc) = read_env_string("PROTESTO_LOGIN_DOCUMENT") {
            portal.login_document = doc;
        }
        portal.headless = read_env_bool("PROTESTO_HEADLESS", portal.headless);
        portal.chromium_path = read_env_string("PROTESTO_CHROMIUM_PATH").map(PathBuf::from);
        portal.screenshot_dir = read_env_string("PROTESTO_SCREENSHOT_DIR").map(PathBuf::from);
        portal.navigation_timeout =
            read_env_secs("PROTESTO_NAVIGATION_TIMEOUT_SECS", portal.navigation_timeout);
        portal.step_timeout = read_env_secs("PROTESTO_STEP_TIMEOUT_SECS", portal.step_timeout);

        let mail = &mut cfg.mailbox;
        if let Some(host) = read_env_string("PROTESTO_IMAP_HOST") {
            mail.host = host;
        }
        mail.port = read_env_u64("PROTESTO_IMAP_PORT", mail.port as u64) as u16;
        if let Some(user) = read_env_string("PROTESTO_IMAP_USER") {
            mail.username = user;
        }
        if let Some(pass) = read_env_string("PROTESTO_IMAP_PASSWORD") {
            mail.password = pass;
        }
        if let Some(folder) = read_env_string("PROTESTO_IMAP_FOLDER") {
            mail.folder = folder;
        }
        if let Some(sender) = read_env_string("PROTESTO_OTP_SENDER") {
            mail.sender = sender;
        }
        mail.search_window = read_env_secs("PROTESTO_OTP_WINDOW_SECS", mail.search_window);
        mail.poll_interval = read_env_secs("PROTESTO_OTP_POLL_SECS", mail.poll_interval);
        mail.io_timeout = read_env_secs("PROTESTO_IMAP_TIMEOUT_SECS", mail.io_timeout);

        let pool = &mut cfg.pool;
        pool.capacity = read_env_usize("PROTESTO_POOL_CAPACITY", pool.capacity);
        pool.lease_timeout = read_env_secs("PROTESTO_LEASE_TIMEOUT_SECS", pool.lease_timeout);
        pool.keepalive_interval =
            read_env_secs("PROTESTO_KEEPALIVE_SECS", pool.keepalive_interval);
        pool.freshness_window =
            read_env_secs("PROTESTO_SESSION_FRESHNESS_SECS", pool.freshness_window);
        pool.drain_timeout = read_env_secs("PROTESTO_DRAIN_TIMEOUT_SECS", pool.drain_timeout);

        let otp = &mut cfg.otp;
        otp.max_attempts = read_env_u64("PROTESTO_OTP_MAX_ATTEMPTS", otp.max_attempts as u64) as u32;
        otp.cooldown = read_env_secs("PROTESTO_OTP_COOLDOWN_SECS", otp.cooldown);
        otp.wait_timeout = read_env_secs("PROTESTO_OTP_WAIT_SECS", otp.wait_timeout);

        let ex = &mut cfg.extraction;
        ex.global_deadline = read_env_secs("PROTESTO_CONSULT_DEADLINE_SECS", ex.global_deadline);
        ex.row_timeout = read_env_secs("PROTESTO_ROW_TIMEOUT_SECS", ex.row_timeout);
        ex.max_offices = read_env_usize("PROTESTO_MAX_OFFICES", ex.max_offices);

        let api = &mut cfg.api;
        api.base_url = read_env_string("PROTESTO_API_URL");
        api.request_timeout = read_env_secs("PROTESTO_API_TIMEOUT_SECS", api.request_timeout);
        if let Some(raw) = read_env_string("PROTESTO_API_HEADERS") {
            api.headers = parse_header_list(&raw)?;
        }

        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.capacity == 0 || self.pool.capacity > MAX_POOL_CAPACITY {
            return Err(ProtestoError::Config(format!(
                "pool capacity must be between 1 and {MAX_POOL_CAPACITY}, got {}",
                self.pool.capacity
            )));
        }
        if self.otp.max_attempts == 0 {
            return Err(ProtestoError::Config(
                "OTP max attempts must be at least 1".to_string(),
            ));
        }
        if self.mailbox.username.is_empty() || self.mailbox.password.is_empty() {
            return Err(ProtestoError::Config(
                "mailbox credentials are required for OTP login".to_string(),
            ));
        }
        if self.mailbox.io_timeout.is_zero() {
            return Err(ProtestoError::Config(
                "IMAP socket timeout must be greater than zero".to_string(),
            ));
        }
        if self.portal.login_document.is_empty() {
            return Err(ProtestoError::Config(
                "PROTESTO_LOGIN_DOCUMENT is required".to_string(),
            ));
        }
        if self.provider.uses_browser() {
            url::Url::parse(&self.portal.base_url).map_err(|e| {
                ProtestoError::Config(format!("invalid portal URL '{}': {e}", self.portal.base_url))
            })?;
        }
        if self.provider.uses_api() {
            let base = self.api.base_url.as_deref().ok_or_else(|| {
                ProtestoError::Config("API provider requires PROTESTO_API_URL".to_string())
            })?;
            url::Url::parse(base)
                .map_err(|e| ProtestoError::Config(format!("invalid API URL '{base}': {e}")))?;
        }
        if self.extraction.row_timeout > self.extraction.global_deadline {
            return Err(ProtestoError::Config(
                "row timeout cannot exceed the consultation deadline".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse `Name=value;Other=value` into header pairs.
pub fn parse_header_list(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| ProtestoError::Config(format!("malformed header entry '{pair}'")))
        })
        .collect()
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_secs(name: &str, default_value: Duration) -> Duration {
    Duration::from_secs(read_env_u64(name, default_value.as_secs()))
}

fn read_env_bool(name: &str, default_value: bool) -> bool {
    match read_env_string(name).as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default_value,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
