// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The coding-assistant subprocess under a PTY.
//!
//! The CLI believes it is talking to an interactive terminal; the PTY is
//! sized to match the virtual terminal on the reading side exactly, or the
//! line-wrapping reconstruction drifts.  A reader thread drains the PTY
//! into a channel so [`CliProcess::read_available`] never blocks the
//! event loop.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, trace, warn};

use crate::SessionError;

/// Special-key byte sequences the tool-approval flow writes into the PTY.
pub mod keys {
    /// Accept the highlighted option.
    pub const ENTER: &str = "\r";
    /// Cancel the menu.
    pub const ESCAPE: &str = "\x1b";
    /// Move the selection up.
    pub const ARROW_UP: &str = "\x1b[A";
    /// Move the selection down.
    pub const ARROW_DOWN: &str = "\x1b[B";
}

/// Pause between text and Enter in [`CliProcess::submit`].
///
/// The TUI treats text and newline arriving in the same write as a paste;
/// the pause makes it read as typed input followed by a submit.  The value
/// is empirical.
pub const SUBMIT_KEY_DELAY: Duration = Duration::from_millis(150);

/// A CLI subprocess attached to a PTY.
pub struct CliProcess {
    child: Box<dyn Child + Send + Sync>,
    // Kept alive for the lifetime of the process: dropping the master
    // closes the PTY under the child.
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    rx: Receiver<Vec<u8>>,
    exit_code: Option<u32>,
}

impl CliProcess {
    /// Spawn `command args…` in `cwd` under a fresh PTY of the given size.
    ///
    /// `~` at the start of an env value expands to the user home directory.
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        rows: u16,
        cols: u16,
    ) -> Result<Self, SessionError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");
        for (key, value) in env {
            cmd.env(key, expand_home(value));
        }

        debug!(command, cwd = %cwd.display(), rows, cols, "spawning CLI process");
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let (tx, rx) = channel::<Vec<u8>>();
        std::thread::spawn(move || {
            let mut buf = vec![0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            child,
            _master: pair.master,
            writer,
            rx,
            exit_code: None,
        })
    }

    /// Whether the subprocess is still running.  Caches the exit code once
    /// the child is reaped.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code());
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("try_wait failed: {e}");
                false
            }
        }
    }

    /// Send raw text to the PTY.  A no-op once the process has exited.
    pub fn write(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Ok(());
        }
        trace!(len = text.len(), "PTY write");
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send text and press Enter as two separate writes.
    ///
    /// Callers that hold locks should use the manager's submit path, which
    /// releases the lock across the pause.
    pub async fn submit(&mut self, text: &str) -> Result<(), SessionError> {
        self.write(text)?;
        tokio::time::sleep(SUBMIT_KEY_DELAY).await;
        self.write(keys::ENTER)
    }

    /// Drain all currently available PTY output without blocking.
    pub fn read_available(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if !out.is_empty() {
            trace!(len = out.len(), "PTY read_available");
        }
        out
    }

    /// Kill the subprocess if it is still running and reap it.
    pub fn terminate(&mut self) {
        if self.is_alive() {
            debug!(pid = ?self.child.process_id(), "terminating CLI process");
            if let Err(e) = self.child.kill() {
                warn!("kill failed: {e}");
            }
        }
        match self.child.wait() {
            Ok(status) => self.exit_code = Some(status.exit_code()),
            Err(e) => warn!("wait failed: {e}"),
        }
    }

    /// Exit code of the terminated process, if known.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }
}

fn expand_home(value: &str) -> String {
    if let Some(rest) = value.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), rest);
        }
    }
    value.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_sh(script: &str) -> CliProcess {
        CliProcess::spawn(
            "/bin/sh",
            &["-c".to_string(), script.to_string()],
            Path::new("/tmp"),
            &HashMap::new(),
            24,
            80,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn spawn_and_read_output() {
        let mut p = spawn_sh("printf hello; sleep 0.1");
        let mut collected = Vec::new();
        for _ in 0..50 {
            collected.extend(p.read_available());
            if collected.windows(5).any(|w| w == b"hello") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(String::from_utf8_lossy(&collected).contains("hello"));
        p.terminate();
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let mut p = spawn_sh("exit 3");
        for _ in 0..100 {
            if !p.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!p.is_alive());
        assert_eq!(p.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn write_to_dead_process_is_noop() {
        let mut p = spawn_sh("exit 0");
        for _ in 0..100 {
            if !p.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(p.write("late input").is_ok());
    }

    #[tokio::test]
    async fn submit_reaches_the_process() {
        let mut p = spawn_sh("read line; printf \"got:%s\" \"$line\"");
        p.submit("ping").await.unwrap();
        let mut collected = Vec::new();
        for _ in 0..100 {
            collected.extend(p.read_available());
            if String::from_utf8_lossy(&collected).contains("got:ping") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(String::from_utf8_lossy(&collected).contains("got:ping"));
        p.terminate();
    }

    #[test]
    fn home_expansion() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_home("~/bin"),
            format!("{}/bin", home.display())
        );
        assert_eq!(expand_home("/abs/path"), "/abs/path");
    }
}
