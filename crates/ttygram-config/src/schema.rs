// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_max_per_user() -> u32 {
    3
}

fn default_edit_rate_limit() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("/tmp/ttygram")
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cli_command() -> String {
    "claude".to_string()
}

fn default_update_command() -> String {
    "claude update".to_string()
}

fn default_scan_depth() -> usize {
    1
}

fn default_rows() -> u16 {
    40
}

fn default_cols() -> u16 {
    120
}

fn default_scrollback() -> usize {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Telegram bot connection and authorization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    #[serde(default)]
    pub bot_token: String,
    /// Numeric user IDs allowed to interact with the bot.
    ///
    /// Every command, message, and callback from anyone else is silently
    /// refused.  The list must not be empty — an open gateway would hand
    /// shell-adjacent access to the whole of Telegram.
    #[serde(default)]
    pub authorized_users: Vec<i64>,
}

impl TelegramConfig {
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_users.contains(&user_id)
    }
}

/// Project discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsConfig {
    /// Directory scanned for projects (subdirectories carrying a `.git`
    /// or `.claude` marker).
    #[serde(default)]
    pub root: PathBuf,
    /// How many directory levels below `root` to scan.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

/// Per-user session limits and output pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Maximum concurrent CLI sessions per user.
    #[serde(default = "default_max_per_user")]
    pub max_per_user: u32,
    /// Maximum message edits per second while streaming a response.
    #[serde(default = "default_edit_rate_limit")]
    pub edit_rate_limit: u32,
    /// PTY poll interval for the output supervisor.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Base directory for files uploaded into a session.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory holding the session history log.
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_per_user: default_max_per_user(),
            edit_rate_limit: default_edit_rate_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            upload_dir: default_upload_dir(),
            history_dir: default_history_dir(),
        }
    }
}

/// CLI invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// The coding-assistant executable.
    #[serde(default = "default_cli_command")]
    pub command: String,
    /// Extra arguments passed on every spawn.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the subprocess.  `~` in values is
    /// expanded to the user home directory.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Shell command run by the self-update flow.
    #[serde(default = "default_update_command")]
    pub update_command: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            command: default_cli_command(),
            args: Vec::new(),
            env: HashMap::new(),
            update_command: default_update_command(),
        }
    }
}

/// Virtual terminal dimensions.
///
/// The PTY handed to the CLI and the emulator that re-reads its output must
/// agree exactly, or line wrapping drifts and indentation reconstruction
/// breaks.  Both sides read these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Scrollback lines preserved above the visible grid.
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            scrollback: default_scrollback(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
