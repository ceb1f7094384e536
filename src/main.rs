// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ttygram_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        }
        Some(Commands::Projects) => {
            for project in ttygram_session::scan_projects(
                &config.projects.root,
                config.projects.scan_depth,
            ) {
                println!("{}\t{}", project.name, project.path.display());
            }
            return Ok(());
        }
        None => {}
    }

    ttygram_bot::telegram::run_bot(config).await
}

/// Tracing goes to stderr.  `TTYGRAM_LOG` overrides the filter; `--verbose`
/// raises the default from info to debug.  `TTYGRAM_LOG_FILE` additionally
/// appends everything at trace level to a file for classifier debugging.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env("TTYGRAM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_filter(env_filter);

    let file_layer = std::env::var("TTYGRAM_LOG_FILE").ok().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
            .map(|file| {
                fmt::layer()
                    .with_writer(std::sync::Arc::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new("trace"))
            })
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
