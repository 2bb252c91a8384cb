//! VT terminal emulation
//!
//! ```text
//! bytes ──▶ Parser ──Sequence──▶ TerminalState ──▶ Grid (primary / alternate)
//!                                      │
//!                                      └──▶ replies (DSR/DA), TermEvent
//! ```

pub mod charset;
mod csi;
pub mod grid;
pub mod parser;
pub mod state;

pub use grid::{AttrFlags, Cell, CellAttrs, Color, Grid, Hyperlink};
pub use parser::{Parser, Sequence, Sequences};
pub use state::{
    Cursor, CursorShape, Margins, MouseEncoding, MouseMode, TermEvent, TerminalModes,
    TerminalState, DEFAULT_SCROLLBACK,
};

/// A parser bound to the screen state it drives
pub struct Emulator {
    parser: Parser,
    state: TerminalState,
}

impl Emulator {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: usize, rows: usize, scrollback: usize) -> Self {
        Self {
            parser: Parser::new(),
            state: TerminalState::with_scrollback(cols, rows, scrollback),
        }
    }

    /// Process output bytes from the child.
    pub fn feed(&mut self, bytes: &[u8]) {
        let Self { parser, state } = self;
        parser.advance(bytes, &mut |seq| state.apply(seq));
    }

    /// The child's output ended; flush any half-read sequence.
    pub fn finish(&mut self) {
        let Self { parser, state } = self;
        parser.finish(&mut |seq| state.apply(seq));
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }

    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.state.resize(cols, rows);
    }

    /// Fresh parser and a hard-reset screen, keeping the size.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.state.reset();
        self.state.clear_history();
        self.state.take_replies();
        self.state.take_events();
    }

    pub fn take_replies(&mut self) -> Vec<u8> {
        self.state.take_replies()
    }

    pub fn take_events(&mut self) -> Vec<TermEvent> {
        self.state.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sequences_across_feeds() {
        let mut t = Emulator::new(4, 1);
        t.feed(b"\x1b[3");
        t.feed(b"1mx\x1b]2;ti");
        t.feed(b"tle\x07");
        let cell = t.state().grid().cell(0, 0);
        assert_eq!(cell.ch, 'x');
        assert_eq!(cell.attrs.fg, Color::Indexed(1));
        assert_eq!(t.state().title(), "title");
    }

    #[test]
    fn test_split_utf8_across_feeds() {
        let bytes = "é".as_bytes();
        let mut t = Emulator::new(2, 1);
        t.feed(&bytes[..1]);
        t.feed(&bytes[1..]);
        assert_eq!(t.state().grid().row_text(0), "é ");
    }

    #[test]
    fn test_reset_clears_everything_but_size() {
        let mut t = Emulator::new(3, 1);
        t.feed(b"a\nb\x1b[6n\x1b[1m\x1b]2;x\x07");
        t.reset();
        assert_eq!(t.state().grid().row_text(0), "   ");
        assert_eq!(t.state().scrollback_len(), 0);
        assert!(t.take_replies().is_empty());
        assert!(t.take_events().is_empty());
        assert_eq!((t.state().cols(), t.state().rows()), (3, 1));
    }

    #[test]
    fn test_finish_flushes_open_title() {
        let mut t = Emulator::new(3, 1);
        t.feed(b"\x1b]2;half");
        t.finish();
        assert_eq!(t.state().title(), "half");
    }
}
