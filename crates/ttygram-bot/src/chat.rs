// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The chat-platform abstraction the output pipeline talks to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// One inline keyboard button: label plus callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Rows of buttons, as the platform renders them.
pub type KeyboardLayout = Vec<Vec<Button>>;

/// Error taxonomy of the chat platform, as the pipeline needs to
/// distinguish it.  The concrete backend maps its own errors onto this.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The platform rejected the message markup.
    #[error("message could not be parsed: {0}")]
    ParseError(String),
    /// An edit with identical content.  Harmless.
    #[error("message is not modified")]
    NotModified,
    /// Flood control; retry no earlier than the given number of seconds.
    #[error("rate limited, retry after {0}s")]
    RetryAfter(u32),
    /// The user blocked the bot.  Fatal for the session.
    #[error("forbidden: bot was blocked by the user")]
    Forbidden,
    /// Transient transport failure.
    #[error("network error: {0}")]
    Network(String),
    /// Any other platform-side rejection.
    #[error("chat API error: {0}")]
    Api(String),
}

/// Chat operations the core consumes.  Implementations must be safe to
/// share across sessions.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send an HTML message; returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<KeyboardLayout>,
    ) -> Result<i32, ChatError>;

    /// Edit a previously sent message.  `html` switches HTML parse mode on;
    /// plain text is the fallback for markup the platform refused.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        html: bool,
    ) -> Result<(), ChatError>;

    /// Show the "typing…" indicator.
    async fn send_chat_action_typing(&self, chat_id: i64) -> Result<(), ChatError>;

    /// Upload a file from disk; returns the new message id.
    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<i32, ChatError>;

    /// Download a platform file to `dest`; returns the local path.
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, ChatError>;
}
