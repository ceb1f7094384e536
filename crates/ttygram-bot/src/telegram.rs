// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Telegram backend: the [`ChatApi`] adapter over teloxide plus the
//! dispatcher wiring commands, plain messages, uploads, and inline
//! keyboard callbacks to the session layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::payloads::{
    AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters,
};
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode,
};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use ttygram_config::Config;
use ttygram_session::{
    get_git_info, keys, scan_projects, FileStore, HistoryLog, SessionManager,
    SessionManagerConfig, SessionStatus,
};
use ttygram_term::{detect_context_usage, parse_extra_status, parse_status_bar};

use crate::callback::{pick_key_sequence, CallbackAction};
use crate::chat::{ChatApi, ChatError, KeyboardLayout};
use crate::format::{escape_html, split_message, MAX_MESSAGE_LENGTH};
use crate::keyboards::{build_project_keyboard, build_sessions_keyboard};
use crate::output::{OutputSupervisor, TerminalGeometry};
use crate::pipeline::PipelineRegistry;

const PROJECTS_PER_PAGE: usize = 8;

// ── ChatApi adapter ──────────────────────────────────────────────────────────

/// [`ChatApi`] over a teloxide [`Bot`].
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn map_request_error(error: RequestError) -> ChatError {
    match error {
        RequestError::Api(ApiError::MessageNotModified) => ChatError::NotModified,
        RequestError::Api(ApiError::BotBlocked) | RequestError::Api(ApiError::UserDeactivated) => {
            ChatError::Forbidden
        }
        RequestError::Api(ApiError::CantParseEntities(message)) => ChatError::ParseError(message),
        RequestError::RetryAfter(seconds) => ChatError::RetryAfter(seconds.seconds()),
        RequestError::Network(e) => ChatError::Network(e.to_string()),
        RequestError::Api(other) => ChatError::Api(other.to_string()),
        other => ChatError::Network(other.to_string()),
    }
}

fn to_markup(layout: KeyboardLayout) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(layout.into_iter().map(|row| {
        row.into_iter()
            .map(|button| InlineKeyboardButton::callback(button.text, button.data))
    }))
}

#[async_trait]
impl ChatApi for TelegramChat {
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<KeyboardLayout>,
    ) -> Result<i32, ChatError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html);
        if let Some(layout) = keyboard {
            request = request.reply_markup(to_markup(layout));
        }
        let message = request.await.map_err(map_request_error)?;
        Ok(message.id.0)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        html: bool,
    ) -> Result<(), ChatError> {
        let request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        let request = if html {
            request.parse_mode(ParseMode::Html)
        } else {
            request
        };
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn send_chat_action_typing(&self, chat_id: i64) -> Result<(), ChatError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<i32, ChatError> {
        let message = self
            .bot
            .send_document(ChatId(chat_id), InputFile::file(path.to_path_buf()))
            .await
            .map_err(map_request_error)?;
        Ok(message.id.0)
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, ChatError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(map_request_error)?;
        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Ok(dest.to_path_buf())
    }
}

// ── Dispatcher state ─────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<PipelineRegistry>,
    pub chat: Arc<dyn ChatApi>,
}

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "start a new session / pick a project")]
    Start,
    #[command(description = "list and switch active sessions")]
    Sessions,
    #[command(description = "kill the active session")]
    Exit,
    #[command(description = "show past sessions")]
    History,
    #[command(description = "show git info for the current project")]
    Git,
    #[command(description = "show context window usage")]
    Context,
    #[command(description = "download a file from the session")]
    Download(String),
    #[command(description = "update the CLI")]
    Update,
}

// ── Command handlers ─────────────────────────────────────────────────────────

async fn handle_command(
    bot: Bot,
    message: Message,
    command: Command,
    app: Arc<AppState>,
) -> HandlerResult {
    let Some(user) = message.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    if !app.config.telegram.is_authorized(user_id) {
        debug!(user_id, "unauthorized command ignored");
        return Ok(());
    }
    let chat_id = message.chat.id;

    match command {
        Command::Start => {
            let projects = scan_projects(&app.config.projects.root, app.config.projects.scan_depth);
            if projects.is_empty() {
                bot.send_message(chat_id, "No projects found under the configured root.")
                    .await?;
                return Ok(());
            }
            let keyboard = build_project_keyboard(&projects, 0, PROJECTS_PER_PAGE);
            bot.send_message(chat_id, "Choose a project:")
                .reply_markup(to_markup(keyboard))
                .await?;
        }
        Command::Sessions => {
            let sessions = app.sessions.list_sessions(user_id);
            if sessions.is_empty() {
                bot.send_message(chat_id, "No active sessions. Use /start to open one.")
                    .await?;
                return Ok(());
            }
            let keyboard =
                build_sessions_keyboard(&sessions, app.sessions.active_session_id(user_id));
            bot.send_message(chat_id, "Active sessions:")
                .reply_markup(to_markup(keyboard))
                .await?;
        }
        Command::Exit => match app.sessions.active_session(user_id) {
            Some(info) => {
                app.sessions.kill_session(user_id, info.session_id).await?;
                app.registry.cleanup(user_id, info.session_id).await;
                bot.send_message(
                    chat_id,
                    format!(
                        "Session #{} on <b>{}</b> ended.",
                        info.session_id,
                        escape_html(&info.project_name)
                    ),
                )
                .parse_mode(ParseMode::Html)
                .await?;
            }
            None => {
                bot.send_message(chat_id, "No active session.").await?;
            }
        },
        Command::History => {
            let entries = app.sessions.history().recent(user_id, 10);
            if entries.is_empty() {
                bot.send_message(chat_id, "No session history yet.").await?;
                return Ok(());
            }
            let text = entries
                .iter()
                .map(format_history_entry)
                .collect::<Vec<_>>()
                .join("\n\n");
            for chunk in split_message(&text, MAX_MESSAGE_LENGTH) {
                bot.send_message(chat_id, chunk)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Command::Git => match app.sessions.active_session(user_id) {
            Some(info) => {
                let git = get_git_info(&info.project_path).await;
                bot.send_message(chat_id, git.format_html())
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            None => {
                bot.send_message(chat_id, "No active session.").await?;
            }
        },
        Command::Context => {
            let text = context_summary(&app, user_id).await;
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Command::Download(argument) => {
            let argument = argument.trim();
            if argument.is_empty() {
                bot.send_message(chat_id, "Usage: /download <path>").await?;
                return Ok(());
            }
            match app.sessions.active_session(user_id) {
                Some(info) => {
                    let path = resolve_download_path(&info.project_path, argument);
                    if !app.sessions.files().file_exists(&path) {
                        bot.send_message(
                            chat_id,
                            format!("File not found: <code>{}</code>", escape_html(argument)),
                        )
                        .parse_mode(ParseMode::Html)
                        .await?;
                        return Ok(());
                    }
                    app.chat.send_document(user_id, &path).await?;
                }
                None => {
                    bot.send_message(chat_id, "No active session.").await?;
                }
            }
        }
        Command::Update => {
            let keyboard = vec![vec![
                crate::chat::Button::new("Update", CallbackAction::UpdateConfirm.encode()),
                crate::chat::Button::new("Cancel", CallbackAction::UpdateCancel.encode()),
            ]];
            bot.send_message(
                chat_id,
                format!(
                    "Run <code>{}</code>?",
                    escape_html(&app.config.cli.update_command)
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(to_markup(keyboard))
            .await?;
        }
    }
    Ok(())
}

/// Scrape the active session's status bar for context usage.
async fn context_summary(app: &Arc<AppState>, user_id: i64) -> String {
    let Some(info) = app.sessions.active_session(user_id) else {
        return "No active session.".to_string();
    };
    let Some(display) = app.registry.display(user_id, info.session_id).await else {
        return "No terminal output captured yet.".to_string();
    };
    let screen_text = display.join("\n");
    let usage = detect_context_usage(&screen_text);
    let bar = display.iter().rev().find_map(|line| parse_status_bar(line));

    let mut parts = Vec::new();
    if let Some(usage) = usage {
        if let Some(pct) = usage.percentage {
            parts.push(format!("Context usage: <b>{pct}%</b>"));
        }
        if usage.needs_compact {
            parts.push("Context is nearly full; consider /compact.".to_string());
        }
    }
    if let Some(bar) = bar {
        if let (Some(project), Some(branch)) = (&bar.project, &bar.branch) {
            parts.push(format!(
                "{} on <code>{}</code>{}",
                escape_html(project),
                escape_html(branch),
                if bar.dirty { "*" } else { "" }
            ));
        }
    }
    // Bottom-row counters (running bash tasks, file-change totals)
    if let Some(extra) = display
        .iter()
        .rev()
        .map(|line| parse_extra_status(line))
        .find(|e| e.bash_tasks.is_some() || e.files_changed.is_some())
    {
        let mut counters = Vec::new();
        if let Some(n) = extra.bash_tasks {
            counters.push(format!("{n} bash"));
        }
        if let (Some(files), Some(added), Some(removed)) =
            (extra.files_changed, extra.lines_added, extra.lines_removed)
        {
            counters.push(format!("{files} files +{added} -{removed}"));
        }
        if !counters.is_empty() {
            parts.push(counters.join(" · "));
        }
    }
    if parts.is_empty() {
        "No usage information on screen.".to_string()
    } else {
        parts.join("\n")
    }
}

fn resolve_download_path(project_path: &Path, argument: &str) -> PathBuf {
    let requested = Path::new(argument);
    if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        project_path.join(requested)
    }
}

const STATUS_EMOJI: [(SessionStatus, &str); 3] = [
    (SessionStatus::Active, "🟢"),
    (SessionStatus::Ended, "⚪"),
    (SessionStatus::Lost, "🟡"),
];

fn format_history_entry(entry: &ttygram_session::HistoryRecord) -> String {
    let emoji = STATUS_EMOJI
        .iter()
        .find(|(status, _)| *status == entry.status)
        .map(|(_, e)| *e)
        .unwrap_or("⚪");
    let mut parts = vec![
        format!("{emoji} <b>#{} {}</b>", entry.session_id, escape_html(&entry.project)),
        format!("  Started: {}", entry.started_at.format("%Y-%m-%d %H:%M")),
    ];
    if let Some(ended) = entry.ended_at {
        parts.push(format!("  Ended: {}", ended.format("%Y-%m-%d %H:%M")));
    }
    let status = match entry.status {
        SessionStatus::Active => "active",
        SessionStatus::Ended => "ended",
        SessionStatus::Lost => "lost",
    };
    parts.push(format!("  Status: {status}"));
    if let Some(code) = entry.exit_code {
        parts.push(format!("  Exit code: {code}"));
    }
    parts.join("\n")
}

// ── Plain messages and uploads ───────────────────────────────────────────────

async fn handle_message(bot: Bot, message: Message, app: Arc<AppState>) -> HandlerResult {
    let Some(user) = message.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    if !app.config.telegram.is_authorized(user_id) {
        debug!(user_id, "unauthorized message ignored");
        return Ok(());
    }
    let chat_id = message.chat.id;

    // Document uploads land in the session's upload dir; the local path is
    // typed into the CLI as if the user pasted it.
    if let Some(document) = message.document() {
        let Some(info) = app.sessions.active_session(user_id) else {
            bot.send_message(chat_id, "No active session to receive the file.")
                .await?;
            return Ok(());
        };
        let filename = document
            .file_name
            .clone()
            .unwrap_or_else(|| "upload.bin".to_string());
        let dest = app
            .sessions
            .files()
            .upload_path(&info.project_name, info.session_id, &filename)?;
        app.chat
            .download_file(&document.file.id, &dest)
            .await?;
        app.sessions
            .submit_to_active(user_id, &dest.display().to_string())
            .await?;
        bot.send_message(
            chat_id,
            format!("Uploaded <code>{}</code>", escape_html(&dest.display().to_string())),
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    }

    let Some(text) = message.text() else {
        return Ok(());
    };
    // An unanswered approval menu swallows typed input; point the user at
    // the keyboard instead of writing into the menu.
    if let Some(info) = app.sessions.active_session(user_id) {
        if app
            .registry
            .is_tool_request_pending(user_id, info.session_id)
            .await
        {
            bot.send_message(
                chat_id,
                "A tool approval is pending — answer it with the buttons above first.",
            )
            .await?;
            return Ok(());
        }
    }
    match app.sessions.submit_to_active(user_id, text).await {
        Ok(()) => {}
        Err(e) => {
            bot.send_message(chat_id, e.to_string()).await?;
        }
    }
    Ok(())
}

// ── Callback queries ─────────────────────────────────────────────────────────

async fn handle_callback(bot: Bot, query: CallbackQuery, app: Arc<AppState>) -> HandlerResult {
    let user_id = query.from.id.0 as i64;
    if !app.config.telegram.is_authorized(user_id) {
        bot.answer_callback_query(query.id.clone())
            .text("Not authorized")
            .await?;
        return Ok(());
    }

    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };
    debug!(user_id, ?action, "callback");

    let edit_target = query
        .message
        .as_ref()
        .map(|m| (m.chat().id, m.id()));
    let original_text = query
        .message
        .as_ref()
        .and_then(|m| m.regular_message())
        .and_then(|m| m.text())
        .unwrap_or_default()
        .to_string();

    match action {
        CallbackAction::Project(path) => {
            let project_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            bot.answer_callback_query(query.id.clone()).await?;
            match app.sessions.create_session(user_id, &project_name, &path) {
                Ok(info) => {
                    let git = get_git_info(&path).await;
                    let text = format!(
                        "Session started on <b>{}</b>. Session #{}\n{}",
                        escape_html(&project_name),
                        info.session_id,
                        git.format_html()
                    );
                    if let Some((chat, id)) = edit_target {
                        bot.edit_message_text(chat, id, text)
                            .parse_mode(ParseMode::Html)
                            .await?;
                    }
                }
                Err(e) => {
                    warn!("failed to create session for {project_name}: {e}");
                    if let Some((chat, id)) = edit_target {
                        bot.edit_message_text(
                            chat,
                            id,
                            format!(
                                "Failed to start the CLI for <b>{}</b>:\n<code>{}</code>",
                                escape_html(&project_name),
                                escape_html(&e.to_string())
                            ),
                        )
                        .parse_mode(ParseMode::Html)
                        .await?;
                    }
                }
            }
        }
        CallbackAction::Page(page) => {
            let projects = scan_projects(&app.config.projects.root, app.config.projects.scan_depth);
            let keyboard = build_project_keyboard(&projects, page, PROJECTS_PER_PAGE);
            bot.answer_callback_query(query.id.clone()).await?;
            if let Some((chat, id)) = edit_target {
                bot.edit_message_text(chat, id, "Choose a project:")
                    .reply_markup(to_markup(keyboard))
                    .await?;
            }
        }
        CallbackAction::Switch(session_id) => {
            app.sessions.switch_session(user_id, session_id)?;
            bot.answer_callback_query(query.id.clone()).await?;
            if let Some(info) = app.sessions.active_session(user_id) {
                if let Some((chat, id)) = edit_target {
                    bot.edit_message_text(
                        chat,
                        id,
                        format!(
                            "Switched to <b>{}</b> (session #{})",
                            escape_html(&info.project_name),
                            info.session_id
                        ),
                    )
                    .parse_mode(ParseMode::Html)
                    .await?;
                }
            }
        }
        CallbackAction::Kill(session_id) => {
            app.sessions.kill_session(user_id, session_id).await?;
            app.registry.cleanup(user_id, session_id).await;
            bot.answer_callback_query(query.id.clone()).await?;
            if let Some((chat, id)) = edit_target {
                bot.edit_message_text(chat, id, format!("Session #{session_id} killed."))
                    .await?;
            }
        }
        CallbackAction::UpdateConfirm => {
            bot.answer_callback_query(query.id.clone()).await?;
            if let Some((chat, id)) = edit_target {
                bot.edit_message_text(chat, id, "Updating the CLI...").await?;
                let result = run_update_command(&app.config.cli.update_command).await;
                bot.edit_message_text(
                    chat,
                    id,
                    format!("Update result:\n<code>{}</code>", escape_html(&result)),
                )
                .parse_mode(ParseMode::Html)
                .await?;
            }
        }
        CallbackAction::UpdateCancel => {
            bot.answer_callback_query(query.id.clone()).await?;
            if let Some((chat, id)) = edit_target {
                bot.edit_message_text(chat, id, "Update cancelled.").await?;
            }
        }
        CallbackAction::ToolYes(session_id) => {
            tool_answer(&bot, &query, &app, user_id, session_id, keys::ENTER, "Allowed")
                .await?;
            append_label(&bot, edit_target, &original_text, "Allowed").await?;
        }
        CallbackAction::ToolNo(session_id) => {
            tool_answer(&bot, &query, &app, user_id, session_id, keys::ESCAPE, "Denied")
                .await?;
            append_label(&bot, edit_target, &original_text, "Denied").await?;
        }
        CallbackAction::ToolPick {
            selected,
            target,
            session_id,
        } => {
            let sequence = pick_key_sequence(selected, target);
            tool_answer(&bot, &query, &app, user_id, session_id, &sequence, "Selected")
                .await?;
            append_label(&bot, edit_target, &original_text, "Selected").await?;
        }
    }
    Ok(())
}

/// Write the answer keys into the session PTY and flag the approval as
/// acted on so the stale painted menu is not re-sent.
async fn tool_answer(
    bot: &Bot,
    query: &CallbackQuery,
    app: &Arc<AppState>,
    user_id: i64,
    session_id: u32,
    sequence: &str,
    label: &str,
) -> HandlerResult {
    if !app.sessions.has_session(user_id, session_id) {
        bot.answer_callback_query(query.id.clone())
            .text("Session no longer active")
            .await?;
        return Ok(());
    }
    app.sessions.write_to(user_id, session_id, sequence)?;
    app.registry.mark_tool_acted(user_id, session_id).await;
    bot.answer_callback_query(query.id.clone()).text(label).await?;
    Ok(())
}

async fn append_label(
    bot: &Bot,
    edit_target: Option<(ChatId, MessageId)>,
    original_text: &str,
    label: &str,
) -> HandlerResult {
    if let Some((chat, id)) = edit_target {
        bot.edit_message_text(
            chat,
            id,
            format!("{}\n\n<i>{label}</i>", escape_html(original_text)),
        )
        .parse_mode(ParseMode::Html)
        .await?;
    }
    Ok(())
}

async fn run_update_command(command: &str) -> String {
    match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
    {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            if !output.status.success() {
                text.push_str(&String::from_utf8_lossy(&output.stderr));
            }
            if text.trim().is_empty() {
                "done".to_string()
            } else {
                text
            }
        }
        Err(e) => format!("failed to run update command: {e}"),
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Build the session layer and run the bot until shutdown.
pub async fn run_bot(config: Config) -> anyhow::Result<()> {
    let bot = Bot::new(config.telegram.bot_token.clone());
    let chat: Arc<dyn ChatApi> = Arc::new(TelegramChat::new(bot.clone()));

    let sessions = Arc::new(SessionManager::new(
        SessionManagerConfig {
            command: config.cli.command.clone(),
            args: config.cli.args.clone(),
            env: config.cli.env.clone(),
            rows: config.terminal.rows,
            cols: config.terminal.cols,
            max_per_user: config.sessions.max_per_user,
        },
        FileStore::new(config.sessions.upload_dir.clone()),
        HistoryLog::new(config.sessions.history_dir.clone()),
    ));
    let registry = Arc::new(PipelineRegistry::new());

    let supervisor = OutputSupervisor::new(
        Arc::clone(&chat),
        Arc::clone(&sessions),
        Arc::clone(&registry),
        Duration::from_millis(config.sessions.poll_interval_ms),
        config.sessions.edit_rate_limit,
        TerminalGeometry {
            rows: config.terminal.rows,
            cols: config.terminal.cols,
            scrollback: config.terminal.scrollback,
        },
    );
    tokio::spawn(supervisor.run());

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("failed to register bot commands: {e}");
    }

    let state = Arc::new(AppState {
        config,
        sessions,
        registry,
        chat,
    });

    info!("gateway starting");
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build()
        .dispatch()
        .await;
    Ok(())
}
