// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Callback-data grammar for inline keyboards.
//!
//! ```text
//! project:<absolute_path>              start a session
//! switch:<session_id>                  switch the active session
//! kill:<session_id>                    kill a session
//! page:<index>                         project list pagination
//! update:confirm | update:cancel       CLI self-update confirmation
//! tool:yes:<sid> | tool:no:<sid>       approve / deny the default option
//! tool:pick:<selected>:<target>:<sid>  navigate to an option and confirm
//! ```

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Project(PathBuf),
    Switch(u32),
    Kill(u32),
    Page(usize),
    UpdateConfirm,
    UpdateCancel,
    ToolYes(u32),
    ToolNo(u32),
    ToolPick {
        /// Option the TUI cursor currently highlights.
        selected: usize,
        /// Option the user picked.
        target: usize,
        session_id: u32,
    },
}

impl CallbackAction {
    /// Parse callback data; `None` for anything outside the grammar.
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(path) = data.strip_prefix("project:") {
            if path.is_empty() {
                return None;
            }
            return Some(Self::Project(PathBuf::from(path)));
        }
        if let Some(id) = data.strip_prefix("switch:") {
            return id.parse().ok().map(Self::Switch);
        }
        if let Some(id) = data.strip_prefix("kill:") {
            return id.parse().ok().map(Self::Kill);
        }
        if let Some(page) = data.strip_prefix("page:") {
            return page.parse().ok().map(Self::Page);
        }
        match data {
            "update:confirm" => return Some(Self::UpdateConfirm),
            "update:cancel" => return Some(Self::UpdateCancel),
            _ => {}
        }
        if let Some(rest) = data.strip_prefix("tool:") {
            let parts: Vec<&str> = rest.split(':').collect();
            return match parts.as_slice() {
                ["yes", sid] => sid.parse().ok().map(Self::ToolYes),
                ["no", sid] => sid.parse().ok().map(Self::ToolNo),
                ["pick", selected, target, sid] => Some(Self::ToolPick {
                    selected: selected.parse().ok()?,
                    target: target.parse().ok()?,
                    session_id: sid.parse().ok()?,
                }),
                _ => None,
            };
        }
        None
    }

    /// Encode back into callback data.  `parse ∘ encode` is identity.
    pub fn encode(&self) -> String {
        match self {
            Self::Project(path) => format!("project:{}", path.display()),
            Self::Switch(id) => format!("switch:{id}"),
            Self::Kill(id) => format!("kill:{id}"),
            Self::Page(page) => format!("page:{page}"),
            Self::UpdateConfirm => "update:confirm".to_string(),
            Self::UpdateCancel => "update:cancel".to_string(),
            Self::ToolYes(sid) => format!("tool:yes:{sid}"),
            Self::ToolNo(sid) => format!("tool:no:{sid}"),
            Self::ToolPick {
                selected,
                target,
                session_id,
            } => format!("tool:pick:{selected}:{target}:{session_id}"),
        }
    }
}

/// Arrow-key sequence that moves the TUI selection from `selected` to
/// `target`, followed by Enter.
pub fn pick_key_sequence(selected: usize, target: usize) -> String {
    use ttygram_session::keys;
    let mut seq = String::new();
    if target > selected {
        for _ in 0..(target - selected) {
            seq.push_str(keys::ARROW_DOWN);
        }
    } else {
        for _ in 0..(selected - target) {
            seq.push_str(keys::ARROW_UP);
        }
    }
    seq.push_str(keys::ENTER);
    seq
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_project_path() {
        assert_eq!(
            CallbackAction::parse("project:/srv/code/my-app"),
            Some(CallbackAction::Project(PathBuf::from("/srv/code/my-app")))
        );
        assert_eq!(CallbackAction::parse("project:"), None);
    }

    #[test]
    fn parse_session_actions() {
        assert_eq!(
            CallbackAction::parse("switch:3"),
            Some(CallbackAction::Switch(3))
        );
        assert_eq!(CallbackAction::parse("kill:12"), Some(CallbackAction::Kill(12)));
        assert_eq!(CallbackAction::parse("kill:abc"), None);
    }

    #[test]
    fn parse_tool_actions() {
        assert_eq!(
            CallbackAction::parse("tool:yes:5"),
            Some(CallbackAction::ToolYes(5))
        );
        assert_eq!(
            CallbackAction::parse("tool:no:5"),
            Some(CallbackAction::ToolNo(5))
        );
        assert_eq!(
            CallbackAction::parse("tool:pick:0:2:5"),
            Some(CallbackAction::ToolPick {
                selected: 0,
                target: 2,
                session_id: 5
            })
        );
        assert_eq!(CallbackAction::parse("tool:maybe:5"), None);
        assert_eq!(CallbackAction::parse("tool:pick:0:2"), None);
    }

    #[test]
    fn parse_update_and_page() {
        assert_eq!(
            CallbackAction::parse("update:confirm"),
            Some(CallbackAction::UpdateConfirm)
        );
        assert_eq!(
            CallbackAction::parse("update:cancel"),
            Some(CallbackAction::UpdateCancel)
        );
        assert_eq!(CallbackAction::parse("page:2"), Some(CallbackAction::Page(2)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("unknown:1"), None);
    }

    #[test]
    fn encode_round_trips() {
        let actions = [
            CallbackAction::Project(PathBuf::from("/srv/x")),
            CallbackAction::Switch(1),
            CallbackAction::Kill(2),
            CallbackAction::Page(4),
            CallbackAction::UpdateConfirm,
            CallbackAction::UpdateCancel,
            CallbackAction::ToolYes(7),
            CallbackAction::ToolNo(7),
            CallbackAction::ToolPick {
                selected: 1,
                target: 0,
                session_id: 7,
            },
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
    }

    #[test]
    fn pick_sequences() {
        use ttygram_session::keys;
        assert_eq!(pick_key_sequence(0, 2), format!("{}{}{}", keys::ARROW_DOWN, keys::ARROW_DOWN, keys::ENTER));
        assert_eq!(pick_key_sequence(2, 1), format!("{}{}", keys::ARROW_UP, keys::ENTER));
        assert_eq!(pick_key_sequence(1, 1), keys::ENTER);
    }
}
