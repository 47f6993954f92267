// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the `protesto` binary.

pub mod consult;
pub mod doctor;
pub mod otp_check;
pub mod output;
