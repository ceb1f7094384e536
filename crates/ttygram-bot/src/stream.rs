// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Edit-in-place streaming for a single response.
//!
//! State machine: `Idle → start_thinking() → Thinking → first content →
//! Streaming → finalize() → Idle`.  While thinking, a background task
//! re-sends the typing indicator every 4 seconds.  While streaming, edits
//! are throttled; overflow past the message ceiling splits into a fresh
//! message that becomes the new edit target.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chat::{ChatApi, ChatError};
use crate::format::MAX_MESSAGE_LENGTH;

const TYPING_KEEPALIVE: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    /// No active response; ready for a new cycle.
    Idle,
    /// Placeholder sent, typing indicator running.
    Thinking,
    /// Content flowing, message being edited in place.
    Streaming,
}

pub struct StreamingMessage {
    chat: Arc<dyn ChatApi>,
    chat_id: i64,
    edit_rate_limit: u32,
    pub message_id: Option<i32>,
    pub accumulated: String,
    pub state: StreamingState,
    /// Edit throttle reference point; pushed into the future on rate
    /// limiting so the next caller backs off naturally.
    last_edit_time: Option<Instant>,
    /// Set when an append was throttled; the supervisor's quiet-flush
    /// pushes it out once the interval has passed.
    pending_edit: bool,
    typing_task: Option<JoinHandle<()>>,
}

impl StreamingMessage {
    pub fn new(chat: Arc<dyn ChatApi>, chat_id: i64, edit_rate_limit: u32) -> Self {
        Self {
            chat,
            chat_id,
            edit_rate_limit: edit_rate_limit.max(1),
            message_id: None,
            accumulated: String::new(),
            state: StreamingState::Idle,
            last_edit_time: None,
            pending_edit: false,
            typing_task: None,
        }
    }

    fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.edit_rate_limit))
    }

    fn throttled(&self) -> bool {
        self.last_edit_time
            .is_some_and(|t| Instant::now().saturating_duration_since(t) < self.min_interval())
    }

    fn cancel_typing(&mut self) {
        if let Some(task) = self.typing_task.take() {
            task.abort();
        }
    }

    /// Send the typing action and the placeholder message.
    ///
    /// Safety net: a previous response that never saw its IDLE transition
    /// is finalized first instead of being overwritten.
    pub async fn start_thinking(&mut self) -> Result<(), ChatError> {
        if self.state == StreamingState::Streaming {
            warn!("start_thinking while still streaming; finalizing previous response");
            self.finalize().await?;
        }

        self.chat.send_chat_action_typing(self.chat_id).await?;
        let message_id = self
            .chat
            .send_message(self.chat_id, "<i>Thinking...</i>", None)
            .await?;
        self.message_id = Some(message_id);
        self.state = StreamingState::Thinking;

        let chat = Arc::clone(&self.chat);
        let chat_id = self.chat_id;
        self.typing_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(TYPING_KEEPALIVE).await;
                if let Err(e) = chat.send_chat_action_typing(chat_id).await {
                    debug!("typing indicator failed: {e}");
                }
            }
        }));
        Ok(())
    }

    /// Append a rendered fragment and edit the message if the throttle
    /// allows.
    ///
    /// Safety net: called while `Idle` (the classifier skipped THINKING),
    /// the fragment goes out as a fresh message so there is an id to edit.
    pub async fn append_content(&mut self, html: &str) -> Result<(), ChatError> {
        self.cancel_typing();

        if self.state == StreamingState::Idle || self.message_id.is_none() {
            warn!("append_content without start_thinking; sending new message");
            let message_id = self.chat.send_message(self.chat_id, html, None).await?;
            self.message_id = Some(message_id);
            self.accumulated = html.to_string();
            self.last_edit_time = Some(Instant::now());
            self.state = StreamingState::Streaming;
            return Ok(());
        }

        self.state = StreamingState::Streaming;
        self.accumulated.push_str(html);

        if self.accumulated.chars().count() > MAX_MESSAGE_LENGTH {
            return self.overflow().await;
        }

        if self.throttled() {
            self.pending_edit = true;
            return Ok(());
        }
        self.edit().await
    }

    /// Replace the accumulated content wholesale (the finalization
    /// re-render path).  Does not edit immediately.
    pub fn replace_content(&mut self, html: String) {
        self.accumulated = html;
    }

    /// Push out throttled content once the interval has passed.  Called by
    /// the supervisor on quiet ticks.
    pub async fn flush_pending(&mut self) -> Result<(), ChatError> {
        if !self.pending_edit || self.state != StreamingState::Streaming || self.throttled() {
            return Ok(());
        }
        self.edit().await
    }

    /// One final edit so nothing is left unsent, then reset to `Idle`.
    pub async fn finalize(&mut self) -> Result<(), ChatError> {
        self.cancel_typing();
        if !self.accumulated.is_empty() && self.message_id.is_some() {
            self.edit().await?;
        }
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.cancel_typing();
        self.message_id = None;
        self.accumulated.clear();
        self.last_edit_time = None;
        self.pending_edit = false;
        self.state = StreamingState::Idle;
    }

    /// Edit the current message with the accumulated content, applying the
    /// platform error policy.  Only `Forbidden` propagates.
    async fn edit(&mut self) -> Result<(), ChatError> {
        let Some(message_id) = self.message_id else {
            return Ok(());
        };
        if self.accumulated.is_empty() {
            return Ok(());
        }
        match self
            .chat
            .edit_message_text(self.chat_id, message_id, &self.accumulated, true)
            .await
        {
            Ok(()) => {
                self.last_edit_time = Some(Instant::now());
                self.pending_edit = false;
                Ok(())
            }
            Err(ChatError::ParseError(e)) => {
                warn!("HTML parse error, falling back to plain text: {e}");
                match self
                    .chat
                    .edit_message_text(self.chat_id, message_id, &self.accumulated, false)
                    .await
                {
                    Ok(()) => {
                        self.last_edit_time = Some(Instant::now());
                        self.pending_edit = false;
                    }
                    Err(ChatError::Forbidden) => return Err(ChatError::Forbidden),
                    Err(inner) => warn!("plain-text fallback failed: {inner}"),
                }
                Ok(())
            }
            // Harmless: a re-edit with identical content
            Err(ChatError::NotModified) => {
                self.pending_edit = false;
                Ok(())
            }
            Err(ChatError::RetryAfter(secs)) => {
                warn!("rate limited, backing off {secs}s");
                self.last_edit_time =
                    Some(Instant::now() + Duration::from_secs(u64::from(secs)));
                Ok(())
            }
            Err(ChatError::Forbidden) => Err(ChatError::Forbidden),
            Err(e) => {
                // Content stays accumulated and retries on the next edit.
                warn!("edit failed: {e}");
                Ok(())
            }
        }
    }

    /// Accumulated content exceeded the ceiling: close out the current
    /// message and continue in a fresh one.
    async fn overflow(&mut self) -> Result<(), ChatError> {
        let limit = self
            .accumulated
            .char_indices()
            .nth(MAX_MESSAGE_LENGTH)
            .map(|(i, _)| i)
            .unwrap_or(self.accumulated.len());
        let split_at = match self.accumulated[..limit].rfind('\n') {
            Some(i) => i,
            None => self
                .accumulated
                .char_indices()
                .nth(4000)
                .map(|(i, _)| i)
                .unwrap_or(limit),
        };
        let remainder = self.accumulated[split_at..].trim_start().to_string();
        self.accumulated.truncate(split_at);
        self.edit().await?;

        if remainder.is_empty() {
            return Ok(());
        }
        match self.chat.send_message(self.chat_id, &remainder, None).await {
            Ok(message_id) => {
                self.message_id = Some(message_id);
                self.accumulated = remainder;
                self.last_edit_time = Some(Instant::now());
                Ok(())
            }
            Err(ChatError::Forbidden) => Err(ChatError::Forbidden),
            Err(e) => {
                warn!("failed to send overflow message, will retry: {e}");
                self.accumulated = remainder;
                Ok(())
            }
        }
    }
}

impl Drop for StreamingMessage {
    fn drop(&mut self) {
        self.cancel_typing();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
