// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat gateway: turns classified terminal screens into edit-in-place chat
//! messages, and chat input into PTY writes.
//!
//! The chat platform sits behind the [`ChatApi`] trait; the Telegram
//! backend (teloxide) is compiled in with the `telegram` feature, and a
//! scriptable [`MockChat`] ships for tests and offline runs.

mod callback;
mod chat;
mod format;
mod keyboards;
mod mock;
mod output;
mod pipeline;
mod runner;
mod stream;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use callback::{pick_key_sequence, CallbackAction};
pub use chat::{Button, ChatApi, ChatError, KeyboardLayout};
pub use format::{
    escape_html, format_html, reflow, render_ansi, render_heuristic, render_regions,
    split_message, wrap_code_blocks, MAX_MESSAGE_LENGTH,
};
pub use keyboards::{
    build_project_keyboard, build_sessions_keyboard, build_tool_approval_keyboard,
};
pub use mock::{MockChat, SentMessage};
pub use output::{OutputSupervisor, TerminalGeometry};
pub use pipeline::{
    new_pipeline_state, transition, Action, ContentDedup, PipelinePhase, PipelineRegistry,
    PipelineState,
};
pub use runner::PipelineRunner;
pub use stream::{StreamingMessage, StreamingState};
