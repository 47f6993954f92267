// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Protesto runtime library: protest record lookups behind a two-factor portal.
//!
//! A bounded pool of individually logged-in browser pages, an email OTP login
//! state machine, an official-API client with token caching, and a selector
//! that falls back from the API to the browser pool.

pub mod auth;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod mail;
pub mod otp;
pub mod pool;
pub mod portal;
pub mod provider;
pub mod renderer;
pub mod types;

pub use engine::ProtestEngine;
pub use error::{ConsultError, ProtestoError, Result};
