// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result extraction from the portal's search view.

pub mod classify;
pub mod parse;
pub mod pipeline;

pub use classify::{classify, SearchOutcome};
pub use pipeline::ExtractionPipeline;
