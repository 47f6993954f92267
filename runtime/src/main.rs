// Copyright 2026 Protesto Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use protesto_runtime::cli;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "protesto",
    about = "Protest record lookups against the notary portal",
    version,
    after_help = "Configuration is read from PROTESTO_* environment variables.\nRun 'protesto doctor' to check them."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up protests for one or more CNPJ/CPF numbers, concurrently
    Consult {
        /// Documents to look up (punctuation allowed)
        #[arg(required = true)]
        documents: Vec<String>,
        /// Override PROTESTO_PROVIDER (api, browser, hybrid)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show the newest portal code in the mailbox, masked
    OtpCheck {
        /// How far back to look, in seconds
        #[arg(long, default_value = "600")]
        window_secs: u64,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("protesto={level}")
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("PROTESTO_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("PROTESTO_QUIET", "1");
    }
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Consult {
            documents,
            provider,
        } => cli::consult::run(&documents, provider.as_deref()).await,
        Commands::OtpCheck { window_secs } => {
            cli::otp_check::run(Duration::from_secs(window_secs)).await
        }
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "protesto", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
