//! Pane - one supervised process and its emulator
//!
//! ```text
//!            start()                  EOF / kill()
//! Stopped ──────────▶ Clearing ──▶ Running ──────────▶ Stopped
//! ```
//!
//! A restart reuses the pane: same key, title, list position and emulator
//! (hard reset first). Every start bumps the generation so that events from
//! an earlier run are recognised and dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::core::pty::{Result, SpawnRequest, Spawner};
use crate::core::session::Session;
use crate::core::term::{Emulator, TermEvent};
use crate::event::Event;

/// Unique identifier for a pane
pub type PaneId = u64;

/// Called with the pane key whenever a pane stops
pub type ExitCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaneStatus {
    Running,
    Stopped,
    /// Between a restart request and the new process being up
    Clearing,
}

/// Everything needed to (re)start a process
#[derive(Clone)]
pub struct ProcessSpec {
    pub key: String,
    pub args: Vec<String>,
    pub icon: String,
    pub title: String,
    pub cwd: Option<PathBuf>,
    pub killable: bool,
    pub autostart: bool,
    pub env: BTreeMap<String, String>,
    pub on_exit: Option<ExitCallback>,
}

impl ProcessSpec {
    pub fn new(key: impl Into<String>, args: Vec<String>) -> Self {
        let key = key.into();
        Self {
            title: key.clone(),
            key,
            args,
            icon: String::new(),
            cwd: None,
            killable: true,
            autostart: true,
            env: BTreeMap::new(),
            on_exit: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn killable(mut self, killable: bool) -> Self {
        self.killable = killable;
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn on_exit(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("key", &self.key)
            .field("args", &self.args)
            .field("title", &self.title)
            .field("cwd", &self.cwd)
            .field("killable", &self.killable)
            .field("autostart", &self.autostart)
            .finish_non_exhaustive()
    }
}

pub struct Pane {
    pub id: PaneId,
    spec: ProcessSpec,
    status: PaneStatus,
    term: Emulator,
    session: Option<Session>,
    generation: u64,
    /// Lines scrolled back into history; 0 is the live screen
    scroll: usize,
    cols: u16,
    rows: u16,
    /// Last title the child set through OSC 0/2
    window_title: Option<String>,
}

impl Pane {
    /// A new, not yet started pane sized to the main viewport
    pub fn new(id: PaneId, spec: ProcessSpec, cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            id,
            spec,
            status: PaneStatus::Stopped,
            term: Emulator::with_scrollback(cols as usize, rows as usize, scrollback),
            session: None,
            generation: 0,
            scroll: 0,
            cols,
            rows,
            window_title: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.spec.key
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }

    pub fn icon(&self) -> &str {
        &self.spec.icon
    }

    pub fn window_title(&self) -> Option<&str> {
        self.window_title.as_deref()
    }

    pub fn status(&self) -> PaneStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == PaneStatus::Running
    }

    pub fn is_dead(&self) -> bool {
        self.status == PaneStatus::Stopped
    }

    pub fn killable(&self) -> bool {
        self.spec.killable
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emulator(&self) -> &Emulator {
        &self.term
    }

    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// New command line, directory and environment for the next start.
    pub(crate) fn update_command(&mut self, spec: &ProcessSpec) {
        self.spec.args = spec.args.clone();
        self.spec.cwd = spec.cwd.clone();
        self.spec.env = spec.env.clone();
    }

    /// Spawn the process. The grid is reset first. On failure the pane
    /// stays Stopped.
    pub fn start(&mut self, spawner: &dyn Spawner, events: Sender<Event>) -> Result<()> {
        self.status = PaneStatus::Clearing;
        self.session.take();
        self.term.reset();
        self.scroll = 0;
        self.window_title = None;
        self.generation += 1;

        let request = SpawnRequest {
            argv: self.spec.args.clone(),
            cwd: self.spec.cwd.clone(),
            env: self.spec.env.clone(),
            cols: self.cols,
            rows: self.rows,
        };
        match Session::spawn(spawner, &request, self.id, self.generation, events) {
            Ok(session) => {
                tracing::info!(
                    "pane {} ({}) started, generation {}",
                    self.id,
                    self.spec.key,
                    self.generation
                );
                self.session = Some(session);
                self.status = PaneStatus::Running;
                Ok(())
            }
            Err(e) => {
                tracing::error!("pane {} ({}) failed to start: {}", self.id, self.spec.key, e);
                self.status = PaneStatus::Stopped;
                Err(e)
            }
        }
    }

    /// Shown in place of output for panes that wait for the user.
    pub fn show_autostart_disabled(&mut self) {
        let message = format!(
            "{} has auto-start disabled, press enter to start.",
            self.spec.key
        );
        self.term.feed(message.as_bytes());
    }

    /// Apply output from the child. Returns false for stale output.
    pub fn feed(&mut self, generation: u64, bytes: &[u8]) -> bool {
        if generation != self.generation || self.status != PaneStatus::Running {
            return false;
        }
        self.term.feed(bytes);

        let replies = self.term.take_replies();
        if let Some(session) = &self.session {
            session.write(&replies);
        }
        for event in self.term.take_events() {
            match event {
                TermEvent::TitleChanged(title) => self.window_title = Some(title),
                TermEvent::Bell => tracing::debug!("bell from pane {}", self.id),
            }
        }
        true
    }

    /// The child's output ended. Returns false for stale notifications.
    pub fn closed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.status != PaneStatus::Running {
            return false;
        }
        tracing::info!("pane {} ({}) exited", self.id, self.spec.key);
        self.mark_exited();
        true
    }

    /// Kill a running, killable pane and wait for it. Returns whether the
    /// pane was killed.
    pub fn kill(&mut self) -> Result<bool> {
        if !self.spec.killable || self.status != PaneStatus::Running {
            return Ok(false);
        }
        if let Some(session) = self.session.as_mut() {
            session.kill()?;
        }
        tracing::info!("pane {} ({}) killed", self.id, self.spec.key);
        self.mark_exited();
        Ok(true)
    }

    /// Stop regardless of `killable`, for shutdown.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.kill() {
                tracing::warn!("pane {} ({}) did not stop: {}", self.id, self.spec.key, e);
            }
        }
        self.status = PaneStatus::Stopped;
    }

    fn mark_exited(&mut self) {
        // Dropping the session reaps the child.
        self.session.take();
        self.term.finish();
        self.term.feed(b"\r\n[process exited]");
        self.status = PaneStatus::Stopped;
        self.scroll = 0;
        if let Some(callback) = &self.spec.on_exit {
            callback(&self.spec.key);
        }
    }

    /// Forward input to the child and jump back to the live screen.
    pub fn write(&mut self, bytes: &[u8]) {
        self.scroll = 0;
        if let Some(session) = &self.session {
            session.write(bytes);
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if (cols, rows) == (self.cols, self.rows) {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        self.term.resize(cols as usize, rows as usize);
        self.scroll = self.scroll.min(self.term.state().scrollback_len());
        if let Some(session) = &self.session {
            if let Err(e) = session.resize(cols, rows) {
                tracing::warn!("pane {} resize failed: {}", self.id, e);
            }
        }
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn is_scrolling(&self) -> bool {
        self.scroll > 0
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let history = self.term.state().scrollback_len();
        self.scroll = (self.scroll + lines).min(history);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_reset(&mut self) {
        self.scroll = 0;
    }
}
