// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode flags shared by every subcommand.

use serde::Serialize;

pub fn is_json() -> bool {
    flag("PROTESTO_JSON")
}

pub fn is_quiet() -> bool {
    flag("PROTESTO_QUIET")
}

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: could not encode output: {e}"),
    }
}
