//! Multiplexer - owns the panes and runs the single event loop
//!
//! ```text
//! ┌──────────────────┬─┬──────────────────────────────┐
//! │ sidebar          │││ main viewport                │
//! │ (pane list)      │││ (selected pane's grid)       │
//! │                  │││                              │
//! │ hints            │││                              │
//! └──────────────────┴─┴──────────────────────────────┘
//!                    ^ border at sidebar_width - 1
//! ```
//!
//! Everything that mutates pane or render state happens on the thread that
//! calls [`Multiplexer::handle_event`]. Reader threads, the input thread and
//! hosts only post events into the queue.

use std::io;
use std::slice;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::pane::{Pane, PaneId, ProcessSpec};
use crate::core::pty::{PtyError, Spawner};
use crate::core::term::{Color, MouseMode, DEFAULT_SCROLLBACK};
use crate::event::{Event, KeyCode, KeyInput, Modifiers, MouseButton, MouseInput, MouseKind, MuxHandle};
use crate::ui::keymapper::KeyMapper;
use crate::ui::sidebar::{self, SidebarRow};
use crate::ui::surface::{Style, StyledCell, Surface, Viewport};

/// Lines scrolled per wheel step
const WHEEL_LINES: usize = 3;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("process error: {0}")]
    Process(#[from] PtyError),
    #[error("render surface error: {0}")]
    Surface(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Which half of the screen receives input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Sidebar,
    Main,
}

/// Whether the event loop keeps going
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Fixed screen geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutConfig {
    pub sidebar_width: u16,
    pub padding: u16,
    /// History lines kept per pane
    pub scrollback: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            sidebar_width: 20,
            padding: 0,
            scrollback: DEFAULT_SCROLLBACK,
        }
    }
}

pub struct Multiplexer<S: Surface> {
    /// Insertion order; panes are never removed
    panes: Vec<Pane>,
    /// Index into `panes`; `Some` whenever `panes` is non-empty
    selected: Option<usize>,
    focus: Focus,
    layout: LayoutConfig,
    surface: S,
    spawner: Box<dyn Spawner>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    next_id: PaneId,
    width: u16,
    height: u16,
}

impl<S: Surface> Multiplexer<S> {
    pub fn new(surface: S, spawner: Box<dyn Spawner>, layout: LayoutConfig) -> Self {
        let (width, height) = surface.size();
        let (tx, rx) = mpsc::channel();
        Self {
            panes: Vec::new(),
            selected: None,
            focus: Focus::Sidebar,
            layout,
            surface,
            spawner,
            tx,
            rx,
            next_id: 1,
            width,
            height,
        }
    }

    /// Handle for posting events from other threads
    pub fn handle(&self) -> MuxHandle {
        MuxHandle::new(self.tx.clone())
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn pane(&self, key: &str) -> Option<&Pane> {
        self.panes.iter().find(|p| p.key() == key)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_pane(&self) -> Option<&Pane> {
        self.selected.and_then(|i| self.panes.get(i))
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Size every pane's emulator has: the screen minus sidebar, border
    /// and padding.
    pub fn main_size(&self) -> (u16, u16) {
        let LayoutConfig {
            sidebar_width,
            padding,
            ..
        } = self.layout;
        let cols = self
            .width
            .saturating_sub(sidebar_width)
            .saturating_sub(1)
            .saturating_sub(padding.saturating_mul(2))
            .max(1);
        let rows = self.height.saturating_sub(padding.saturating_mul(2)).max(1);
        (cols, rows)
    }

    pub fn main_viewport(&self) -> Viewport {
        let (cols, rows) = self.main_size();
        let x = self.layout.sidebar_width.saturating_add(self.layout.padding.saturating_add(1));
        Viewport::new(x, self.layout.padding, cols, rows)
    }

    fn sidebar_viewport(&self) -> Viewport {
        Viewport::new(0, 0, self.layout.sidebar_width.saturating_sub(1), self.height)
    }

    /// Add a process, or restart it in place if a stopped pane has its key.
    /// A running pane with the key makes this a no-op.
    pub fn add_process(&mut self, spec: ProcessSpec) -> Result<()> {
        if let Some(index) = self.panes.iter().position(|p| p.key() == spec.key) {
            let pane = &mut self.panes[index];
            if !pane.is_dead() {
                debug!("process {} already running", spec.key);
                return Ok(());
            }
            info!("restarting process {}", spec.key);
            pane.update_command(&spec);
            pane.start(self.spawner.as_ref(), self.tx.clone())?;
            return Ok(());
        }

        let (cols, rows) = self.main_size();
        let mut pane = Pane::new(self.next_id, spec, cols, rows, self.layout.scrollback);
        if pane.spec().autostart {
            pane.start(self.spawner.as_ref(), self.tx.clone())?;
        } else {
            pane.show_autostart_disabled();
        }
        info!("added process {} as pane {}", pane.key(), pane.id);
        self.next_id += 1;
        self.panes.push(pane);
        self.clamp_selection();
        Ok(())
    }

    /// Restart the pane at `index` if it is stopped.
    pub fn restart(&mut self, index: usize) -> Result<()> {
        let Some(pane) = self.panes.get_mut(index) else {
            return Ok(());
        };
        if pane.is_dead() {
            info!("restarting process {}", pane.key());
            pane.start(self.spawner.as_ref(), self.tx.clone())?;
        }
        Ok(())
    }

    /// Kill the selected pane if it is running and killable. Returns
    /// whether anything was killed.
    pub fn kill_selected(&mut self) -> Result<bool> {
        let Some(index) = self.selected else {
            return Ok(false);
        };
        let killed = match self.panes.get_mut(index) {
            Some(pane) => pane.kill()?,
            None => false,
        };
        if killed && self.focus == Focus::Main {
            self.focus = Focus::Sidebar;
        }
        Ok(killed)
    }

    /// Wait up to `timeout` for the next queued event.
    pub fn poll_event(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Handle one event and redraw. Only render-surface failures are errors.
    pub fn handle_event(&mut self, event: Event) -> Result<Flow> {
        let flow = match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse);
                Flow::Continue
            }
            Event::Paste(text) => {
                self.handle_paste(&text);
                Flow::Continue
            }
            Event::Resize(cols, rows) => {
                self.resize(cols, rows);
                Flow::Continue
            }
            Event::Output {
                pane,
                generation,
                bytes,
            } => {
                if let Some(p) = self.panes.iter_mut().find(|p| p.id == pane) {
                    p.feed(generation, &bytes);
                }
                Flow::Continue
            }
            Event::PaneClosed { pane, generation } => {
                self.pane_closed(pane, generation);
                Flow::Continue
            }
            Event::AddProcess(spec) => {
                let key = spec.key.clone();
                if let Err(e) = self.add_process(spec) {
                    warn!("could not add process {}: {}", key, e);
                }
                Flow::Continue
            }
            Event::Redraw => Flow::Continue,
            Event::Quit => Flow::Quit,
        };

        if flow == Flow::Continue {
            self.draw()?;
        }
        Ok(flow)
    }

    /// Run until quit, then stop every pane and release the surface.
    pub fn run(&mut self) -> Result<()> {
        self.surface.start_input(self.tx.clone())?;
        let (cols, rows) = self.surface.size();
        self.resize(cols, rows);
        let result = self.draw().and_then(|_| self.event_loop());
        let shutdown = self.shutdown();
        result.and(shutdown)
    }

    fn event_loop(&mut self) -> Result<()> {
        // The multiplexer holds a sender, so this only ends on Quit
        while let Ok(event) = self.rx.recv() {
            if self.handle_event(event)? == Flow::Quit {
                info!("quit requested");
                break;
            }
        }
        Ok(())
    }

    /// Stop every pane, then restore the surface.
    pub fn shutdown(&mut self) -> Result<()> {
        for pane in &mut self.panes {
            pane.shutdown();
        }
        self.surface.finish()?;
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.width = cols;
        self.height = rows;
        self.surface.resize(cols, rows);
        let (main_cols, main_rows) = self.main_size();
        debug!("resize {}x{}, main {}x{}", cols, rows, main_cols, main_rows);
        for pane in &mut self.panes {
            pane.resize(main_cols, main_rows);
        }
    }

    fn pane_closed(&mut self, id: PaneId, generation: u64) {
        let Some(index) = self.panes.iter().position(|p| p.id == id) else {
            return;
        };
        if self.panes[index].closed(generation)
            && self.selected == Some(index)
            && self.focus == Focus::Main
        {
            self.focus = Focus::Sidebar;
        }
    }

    fn handle_key(&mut self, key: KeyInput) -> Flow {
        match self.focus {
            Focus::Main => {
                if key.is_ctrl('z') {
                    self.focus = Focus::Sidebar;
                    return Flow::Continue;
                }
                if let Some(pane) = self.selected.and_then(|i| self.panes.get_mut(i)) {
                    let modes = pane.emulator().state().modes().clone();
                    if let Some(bytes) = KeyMapper::map(&key, &modes) {
                        pane.write(&bytes);
                    }
                }
                Flow::Continue
            }
            Focus::Sidebar => self.handle_sidebar_key(key),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyInput) -> Flow {
        if key.is_ctrl('c') {
            return Flow::Quit;
        }
        if key.is_ctrl('z') {
            self.focus_main();
            return Flow::Continue;
        }
        if key.is_ctrl('u') || key.is_ctrl('d') {
            let half = (self.main_size().1 / 2).max(1) as usize;
            if let Some(pane) = self.selected.and_then(|i| self.panes.get_mut(i)) {
                if key.is_ctrl('u') {
                    pane.scroll_up(half);
                } else {
                    pane.scroll_down(half);
                }
            }
            return Flow::Continue;
        }
        if key.mods.intersects(Modifiers::CTRL | Modifiers::ALT) {
            return Flow::Continue;
        }

        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Enter => self.activate_selected(),
            KeyCode::Char('x') => {
                if let Err(e) = self.kill_selected() {
                    warn!("kill failed: {}", e);
                }
            }
            _ => {}
        }
        Flow::Continue
    }

    /// Enter on the sidebar: restart a stopped pane, focus a running one.
    fn activate_selected(&mut self) {
        let Some(index) = self.selected.filter(|&i| i < self.panes.len()) else {
            return;
        };
        if self.panes[index].is_dead() {
            // Spawn errors are already logged by the pane, which stays Stopped.
            let _ = self.restart(index);
        } else {
            self.focus_main();
        }
    }

    fn focus_main(&mut self) {
        if self.selected_pane().map_or(false, Pane::is_running) {
            self.focus = Focus::Main;
        }
    }

    /// Move through the sidebar's display order, clamped at both ends.
    fn move_selection(&mut self, delta: isize) {
        let order = sidebar::display_order(&self.panes);
        if order.is_empty() {
            self.selected = None;
            return;
        }
        let current = self
            .selected
            .and_then(|s| order.iter().position(|&i| i == s))
            .unwrap_or(0);
        let next = current
            .saturating_add_signed(delta)
            .min(order.len() - 1);
        self.selected = Some(order[next]);
    }

    fn clamp_selection(&mut self) {
        self.selected = match (self.panes.len(), self.selected) {
            (0, _) => None,
            (_, None) => Some(0),
            (len, Some(i)) => Some(i.min(len - 1)),
        };
    }

    fn handle_mouse(&mut self, mouse: MouseInput) {
        let main = self.main_viewport();
        if let Some((col, row)) = main.translate(mouse.col, mouse.row) {
            let focus = self.focus;
            let Some(pane) = self.selected.and_then(|i| self.panes.get_mut(i)) else {
                return;
            };
            let modes = pane.emulator().state().modes().clone();
            let forward = focus == Focus::Main && pane.is_running();

            match mouse.kind {
                MouseKind::ScrollUp if !(forward && modes.mouse != MouseMode::None) => {
                    pane.scroll_up(WHEEL_LINES);
                }
                MouseKind::ScrollDown if !(forward && modes.mouse != MouseMode::None) => {
                    pane.scroll_down(WHEEL_LINES);
                }
                MouseKind::Down(_) if focus == Focus::Sidebar => {
                    if pane.is_running() {
                        self.focus = Focus::Main;
                    }
                }
                _ if forward => {
                    let local = MouseInput { col, row, ..mouse };
                    if let Some(bytes) = KeyMapper::encode_mouse(&local, &modes) {
                        pane.write(&bytes);
                    }
                }
                _ => {}
            }
            return;
        }

        if mouse.kind == MouseKind::Down(MouseButton::Left)
            && self.sidebar_viewport().translate(mouse.col, mouse.row).is_some()
        {
            let rows = sidebar::rows(&self.panes);
            if let Some(SidebarRow::Entry(index)) = rows.get(mouse.row as usize) {
                self.selected = Some(*index);
                self.focus = Focus::Sidebar;
            }
        }
    }

    fn handle_paste(&mut self, text: &str) {
        if self.focus != Focus::Main {
            return;
        }
        if let Some(pane) = self.selected.and_then(|i| self.panes.get_mut(i)) {
            let modes = pane.emulator().state().modes().clone();
            pane.write(&KeyMapper::encode_paste(text, &modes));
        }
    }

    /// Compose the full frame and hand it to the surface.
    fn draw(&mut self) -> Result<()> {
        self.clamp_selection();
        self.surface.clear();

        let side = self.sidebar_viewport();
        sidebar::draw(&mut self.surface, side, &self.panes, self.selected, self.focus);

        if self.layout.sidebar_width > 0 {
            let border = StyledCell::new(
                '│',
                Style {
                    fg: Color::Indexed(8),
                    ..Style::default()
                },
            );
            for row in 0..self.height {
                self.surface
                    .put_run(row, self.layout.sidebar_width - 1, slice::from_ref(&border));
            }
        }

        let main = self.main_viewport();
        let mut cursor = None;
        let mut title = None;
        if let Some(pane) = self.selected.and_then(|i| self.panes.get(i)) {
            let state = pane.emulator().state();
            let scroll = pane.scroll();
            for row in 0..state.rows().min(main.height as usize) {
                let cells: Vec<StyledCell> =
                    state.visible_row(scroll, row).iter().map(StyledCell::from).collect();
                main.put_run(&mut self.surface, row as u16, 0, &cells);
            }

            // Show scroll indicator if scrolled
            if scroll > 0 {
                let indicator = format!("[↑ {} lines]", scroll);
                main.put_run(
                    &mut self.surface,
                    0,
                    0,
                    &StyledCell::line(&indicator, Style::default().inverse()),
                );
            }

            let show = self.focus == Focus::Main
                && pane.is_running()
                && !pane.is_scrolling()
                && state.modes().cursor_visible;
            if show {
                let c = state.cursor();
                if c.row < main.height as usize && c.col < main.width as usize {
                    cursor = Some((main.y + c.row as u16, main.x + c.col as u16, c.shape));
                }
            }
            title = Some(pane.window_title().unwrap_or(pane.title()).to_string());
        }

        match cursor {
            Some((row, col, shape)) => self.surface.show_cursor(row, col, shape),
            None => self.surface.hide_cursor(),
        }
        if let Some(title) = title {
            self.surface.set_title(&title);
        }
        self.surface.present()?;
        Ok(())
    }
}
