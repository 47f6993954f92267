// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client for the official API, wrapping reqwest.
//!
//! Bearer-authenticated GET and JSON POST with fixed extra headers, retry on
//! 5xx and backoff on 429.

use crate::error::Result;
use std::time::Duration;

const MAX_RETRIES: u32 = 2;

/// Response from an API request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

impl HttpClient {
    pub fn new(timeout: Duration, headers: Vec<(String, String)>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("protesto/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, headers })
    }

    /// GET `url` with a bearer token.
    pub async fn get_bearer(&self, url: &str, token: &str) -> Result<HttpResponse> {
        self.send_with_retry(|| self.decorate(self.client.get(url)).bearer_auth(token))
            .await
    }

    /// POST a JSON body, optionally with a bearer token.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        self.send_with_retry(|| {
            let builder = self.decorate(self.client.post(url)).json(body);
            match token {
                Some(t) => builder.bearer_auth(t),
                None => builder,
            }
        })
        .await
    }

    fn decorate(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<HttpResponse>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0u32;
        loop {
            match build().send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(retries - 1))).await;
                        continue;
                    }

                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let body = r.text().await?;
                    return Ok(HttpResponse { status, body });
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && retries < MAX_RETRIES => {
                    retries += 1;
                    tracing::debug!("API request failed ({e}); retry {retries}");
                    tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(retries - 1))).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
