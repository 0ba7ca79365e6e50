// Copyright 2026 Pagegrab Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pagegrab::RetrievalOptions;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(
    name = "pagegrab",
    about = "Pagegrab: fetch readable content from any URL",
    version,
    after_help = "Run 'pagegrab <command> --help' for details on each command."
)]
struct Cli {
    /// Log each cascade stage
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log level for pagegrab (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve a page and print the result as JSON
    Fetch {
        /// URL to retrieve
        url: String,
        /// Per-stage timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Path to the lightweight rendering engine
        #[arg(long)]
        light_engine: Option<PathBuf>,
        /// User agent sent by every stage
        #[arg(long)]
        user_agent: Option<String>,
        /// Extra direct-fetch attempts on transient errors
        #[arg(long)]
        retries: Option<u32>,
        /// Never launch the full browser engine
        #[arg(long)]
        no_browser: bool,
    },
    /// Capture a PNG screenshot with a headless browser
    Screenshot {
        /// URL to capture
        url: String,
        /// Output file
        #[arg(long, short)]
        out: PathBuf,
        /// Use short time budgets with one retry
        #[arg(long)]
        fast: bool,
        /// Process timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Completions { .. }) {
        cli::init_tracing(cli.verbose, cli.log_level.as_deref());
    }

    let result = match cli.command {
        Commands::Fetch {
            url,
            timeout,
            light_engine,
            user_agent,
            retries,
            no_browser,
        } => {
            let options = RetrievalOptions {
                timeout_ms: timeout,
                user_agent,
                light_engine_path: light_engine,
                verbose: cli.verbose.then_some(true),
                retries,
                ..RetrievalOptions::default()
            };
            cli::fetch_cmd::run(&url, options, no_browser).await
        }
        Commands::Screenshot {
            url,
            out,
            fast,
            timeout,
        } => cli::screenshot_cmd::run(&url, &out, fast, timeout).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pagegrab", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
