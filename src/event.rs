//! Event queue shared by every layer
//!
//! All cross-thread communication goes through one `mpsc` queue owned by the
//! multiplexer. Reader threads post pane output and close notifications,
//! the render surface posts input, and hosts post processes to add.

use std::sync::mpsc::Sender;

use bitflags::bitflags;

use crate::wm::{PaneId, ProcessSpec};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Backspace,
    Tab,
    BackTab,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// A key press
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub code: KeyCode,
    pub mods: Modifiers,
}

impl KeyInput {
    pub fn new(code: KeyCode, mods: Modifiers) -> Self {
        Self { code, mods }
    }

    pub fn plain(code: KeyCode) -> Self {
        Self::new(code, Modifiers::empty())
    }

    pub fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::CTRL)
    }

    /// Ctrl plus the given letter, either case
    pub fn is_ctrl(&self, c: char) -> bool {
        self.mods.contains(Modifiers::CTRL)
            && matches!(self.code, KeyCode::Char(k) if k.eq_ignore_ascii_case(&c))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseKind {
    Down(MouseButton),
    Up(MouseButton),
    Drag(MouseButton),
    Moved,
    ScrollUp,
    ScrollDown,
}

/// A mouse event in screen coordinates (0-based)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseInput {
    pub kind: MouseKind,
    pub col: u16,
    pub row: u16,
    pub mods: Modifiers,
}

/// One entry of the multiplexer queue
#[derive(Debug)]
pub enum Event {
    Key(KeyInput),
    Mouse(MouseInput),
    Paste(String),
    /// The screen was resized to (cols, rows)
    Resize(u16, u16),
    /// Bytes read from a pane's pty
    Output {
        pane: PaneId,
        generation: u64,
        bytes: Vec<u8>,
    },
    /// A pane's pty reached EOF
    PaneClosed { pane: PaneId, generation: u64 },
    AddProcess(ProcessSpec),
    Redraw,
    Quit,
}

/// Cloneable handle for posting into a running multiplexer from any thread
#[derive(Clone)]
pub struct MuxHandle {
    tx: Sender<Event>,
}

impl MuxHandle {
    pub(crate) fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }

    /// Queue a process. Returns false if the multiplexer is gone.
    pub fn add_process(&self, spec: ProcessSpec) -> bool {
        self.tx.send(Event::AddProcess(spec)).is_ok()
    }

    pub fn redraw(&self) -> bool {
        self.tx.send(Event::Redraw).is_ok()
    }

    pub fn quit(&self) -> bool {
        self.tx.send(Event::Quit).is_ok()
    }

    /// Post any event, for hosts that drive input themselves.
    pub fn post(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_is_ctrl_ignores_case() {
        assert!(KeyInput::ctrl('z').is_ctrl('z'));
        assert!(KeyInput::new(KeyCode::Char('Z'), Modifiers::CTRL | Modifiers::SHIFT).is_ctrl('z'));
        assert!(!KeyInput::plain(KeyCode::Char('z')).is_ctrl('z'));
    }

    #[test]
    fn test_handle_reports_closed_queue() {
        let (tx, rx) = mpsc::channel();
        let handle = MuxHandle::new(tx);
        assert!(handle.redraw());
        assert!(matches!(rx.recv().unwrap(), Event::Redraw));
        drop(rx);
        assert!(!handle.quit());
    }
}
