// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based page factory using chromiumoxide.

use super::{NavigationResult, PageFactory, PortalPage};
use crate::config::PortalConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PROTESTO_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PROTESTO_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.protesto/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".protesto/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".protesto/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".protesto/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".protesto/chromium/chrome-linux64/chrome"),
                home.join(".protesto/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for bin in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(bin) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-backed page factory.
///
/// All pages share one browser process (and so one cookie jar); the pool
/// still logs each page in on its own.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance configured from `portal`.
    pub async fn launch(portal: &PortalConfig) -> Result<Self> {
        let chrome_path = match &portal.chromium_path {
            Some(p) => p.clone(),
            None => find_chromium()
                .context("Chromium not found. Set PROTESTO_CHROMIUM_PATH or install Chrome.")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run");
        if portal.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chromium handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl PageFactory for ChromiumRenderer {
    async fn new_page(&self) -> Result<Arc<dyn PortalPage>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Arc::new(ChromiumPage {
            page,
            active_count: Arc::clone(&self.active_count),
            closed: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!("chromium close failed: {e}");
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
    active_count: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl ChromiumPage {
    async fn eval(&self, script: String) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout:?}"),
        }
        let remaining = timeout.saturating_sub(start.elapsed());
        let _ = tokio::time::timeout(remaining, self.page.wait_for_navigation()).await;

        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let cleared = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({sel}); \
                 if (!el) return false; el.value = ''; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()",
                sel = js_str(selector)
            ))
            .await?;
        if cleared.as_bool() != Some(true) {
            bail!("element not found: {selector}");
        }
        let el = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?;
        el.click().await.context("focus before typing failed")?;
        el.type_str(value).await.context("typing failed")?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?
            .click()
            .await
            .with_context(|| format!("click failed: {selector}"))?;
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("query failed: {selector}"))?;
        let el = elements
            .get(index)
            .with_context(|| format!("no element #{index} for {selector} ({} found)", elements.len()))?;
        el.click()
            .await
            .with_context(|| format!("click failed: {selector}[{index}]"))?;
        Ok(())
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        let v = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({sel}); \
                 return el ? {{ found: true, text: String(el.innerText || el.textContent || '') }} \
                 : {{ found: false, text: '' }}; }})()",
                sel = js_str(selector)
            ))
            .await?;
        if v.get("found").and_then(Value::as_bool) != Some(true) {
            return Ok(None);
        }
        Ok(v.get("text").and_then(Value::as_str).map(str::to_string))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let v = self
            .eval(format!(
                "document.querySelectorAll({sel}).length",
                sel = js_str(selector)
            ))
            .await?;
        Ok(v.as_u64().unwrap_or(0) as usize)
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.eval("document.readyState".to_string()).await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("page did not settle within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.reload()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => bail!("reload failed: {e}"),
            Err(_) => bail!("reload timed out after {timeout:?}"),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .context("screenshot failed")
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.clone().close().await;
        Ok(())
    }
}
