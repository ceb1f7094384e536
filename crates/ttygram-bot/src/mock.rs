// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-memory [`ChatApi`] for tests and offline runs.
//!
//! Records every call and can be scripted to fail: queued errors are
//! returned by the next matching operation, so rate-limit, parse-error,
//! and blocked-bot paths are testable without a network.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chat::{ChatApi, ChatError, KeyboardLayout};

/// One message as the mock chat currently shows it.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub html: bool,
    pub keyboard: Option<KeyboardLayout>,
    pub edits: u32,
}

#[derive(Default)]
struct Inner {
    messages: Vec<SentMessage>,
    typing_actions: u32,
    documents: Vec<PathBuf>,
    next_id: i32,
    send_errors: VecDeque<ChatError>,
    edit_errors: VecDeque<ChatError>,
}

/// Scriptable mock chat backend.
#[derive(Default)]
pub struct MockChat {
    inner: Mutex<Inner>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next `send_message` call.
    pub fn push_send_error(&self, error: ChatError) {
        self.inner.lock().unwrap().send_errors.push_back(error);
    }

    /// Queue an error for the next `edit_message_text` call.
    pub fn push_edit_error(&self, error: ChatError) {
        self.inner.lock().unwrap().edit_errors.push_back(error);
    }

    /// Snapshot of all messages in send order.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    /// The current text of one message.
    pub fn message_text(&self, message_id: i32) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| m.text.clone())
    }

    pub fn typing_actions(&self) -> u32 {
        self.inner.lock().unwrap().typing_actions
    }

    pub fn documents(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().documents.clone()
    }
}

#[async_trait]
impl ChatApi for MockChat {
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<KeyboardLayout>,
    ) -> Result<i32, ChatError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.send_errors.pop_front() {
            return Err(error);
        }
        inner.next_id += 1;
        let message_id = inner.next_id;
        inner.messages.push(SentMessage {
            chat_id,
            message_id,
            text: html.to_string(),
            html: true,
            keyboard,
            edits: 0,
        });
        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        html: bool,
    ) -> Result<(), ChatError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.edit_errors.pop_front() {
            return Err(error);
        }
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.message_id == message_id)
            .ok_or_else(|| ChatError::Api("message to edit not found".into()))?;
        if message.text == text {
            return Err(ChatError::NotModified);
        }
        message.text = text.to_string();
        message.html = html;
        message.edits += 1;
        Ok(())
    }

    async fn send_chat_action_typing(&self, _chat_id: i64) -> Result<(), ChatError> {
        self.inner.lock().unwrap().typing_actions += 1;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<i32, ChatError> {
        let mut inner = self.inner.lock().unwrap();
        inner.documents.push(path.to_path_buf());
        inner.next_id += 1;
        let message_id = inner.next_id;
        inner.messages.push(SentMessage {
            chat_id,
            message_id,
            text: format!("[document {}]", path.display()),
            html: false,
            keyboard: None,
            edits: 0,
        });
        Ok(message_id)
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, ChatError> {
        std::fs::write(dest, file_id.as_bytes())
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Ok(dest.to_path_buf())
    }
}
