// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wiremock responders standing in for the official API's auth endpoints.
//!
//! Issuing a challenge drops a code email into the [`FakeMailbox`], the way
//! the real service mails one out.

use super::FakeMailbox;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const PROTESTS_PATH: &str = "/v1/protests/11222333000181";

pub struct ApiSim {
    mailbox: Arc<FakeMailbox>,
    pub codes: Mutex<Vec<String>>,
    pub reject_next: AtomicUsize,
    next_code: AtomicU32,
    tokens: AtomicU32,
}

impl ApiSim {
    pub fn new(mailbox: Arc<FakeMailbox>) -> Arc<Self> {
        Arc::new(Self {
            mailbox,
            codes: Mutex::new(Vec::new()),
            reject_next: AtomicUsize::new(0),
            next_code: AtomicU32::new(0),
            tokens: AtomicU32::new(0),
        })
    }

    fn issue_code(&self) {
        let n = self.next_code.fetch_add(1, Ordering::SeqCst) + 1;
        let code = format!("{}", 700_000 + n);
        self.mailbox.deliver_code(&code);
        self.codes.lock().unwrap().push(code);
    }

    fn latest_code(&self) -> Option<String> {
        self.codes.lock().unwrap().last().cloned()
    }
}

pub struct IssueChallenge(pub Arc<ApiSim>);

impl Respond for IssueChallenge {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.0.issue_code();
        ResponseTemplate::new(200).set_body_json(json!({ "challenge_id": "ch-1" }))
    }
}

pub struct ResendCode(pub Arc<ApiSim>);

impl Respond for ResendCode {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.0.issue_code();
        ResponseTemplate::new(204)
    }
}

/// Accepts the latest issued code with tokens `tok-1`, `tok-2`, ...
pub struct VerifyCode(pub Arc<ApiSim>);

impl Respond for VerifyCode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let submitted = body["code"].as_str().map(str::to_string);
        let rejecting = self
            .0
            .reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejecting || submitted != self.0.latest_code() {
            return ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_code" }));
        }
        let n = self.0.tokens.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("tok-{n}"),
            "expires_in": 3600,
        }))
    }
}

/// Mount login, verify and resend; returns the mocks' shared state.
pub async fn mount_auth(server: &MockServer, mailbox: Arc<FakeMailbox>, logins: u64) -> Arc<ApiSim> {
    let sim = ApiSim::new(mailbox);
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(IssueChallenge(Arc::clone(&sim)))
        .expect(logins)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/verify"))
        .respond_with(VerifyCode(Arc::clone(&sim)))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/resend"))
        .respond_with(ResendCode(Arc::clone(&sim)))
        .mount(server)
        .await;
    sim
}

pub fn protests_body() -> Value {
    json!({
        "has_protests": true,
        "states": [{
            "state": "SP",
            "offices": [{
                "name": "1º Tabelião",
                "city": "São Paulo",
                "address": "Rua Boa Vista, 100",
                "phone": "(11) 3107-0000",
                "title_count": 1,
                "titles": [{
                    "value": 1234.56,
                    "protest_date": "2024-03-05",
                    "cancellation_authorized": true,
                    "cancellation_cost": "87.40"
                }]
            }]
        }]
    })
}
