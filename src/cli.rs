// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive Claude Code CLI sessions from Telegram.
#[derive(Parser, Debug)]
#[command(name = "ttygram", version, about)]
pub struct Cli {
    /// Path to an explicit config file (merged last, highest priority).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (use TTYGRAM_LOG for finer control).
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the merged configuration and exit.
    ShowConfig,
    /// List the projects the gateway would offer and exit.
    Projects,
}
