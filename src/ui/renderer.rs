//! Terminal renderer using crossterm
//!
//! Implements [`Surface`] on the host terminal. Frames are drawn into a back
//! buffer and only cells that differ from the last presented frame are
//! written. Input is read on a separate thread and posted into the event
//! queue as crate events.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::{
    cursor::{Hide, MoveTo, SetCursorStyle, Show},
    event::{
        self as ct, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste,
        EnableMouseCapture, KeyEventKind, KeyModifiers,
    },
    execute, queue,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen, SetTitle,
    },
};
use tracing::{debug, warn};

use crate::core::term::{AttrFlags, Color, CursorShape};
use crate::event::{Event, KeyCode, KeyInput, Modifiers, MouseButton, MouseInput, MouseKind};
use crate::ui::surface::{CellBuffer, Style, StyledCell, Surface};

/// Input poll interval; bounds how long shutdown waits for the input thread
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Surface backed by the process's own terminal
pub struct CrosstermSurface {
    back: CellBuffer,
    front: CellBuffer,
    /// Next present repaints every cell
    full_redraw: bool,
    cursor: Option<(u16, u16, CursorShape)>,
    title: Option<String>,
    title_dirty: bool,
    initialized: bool,
    stop_input: Arc<AtomicBool>,
    input_thread: Option<JoinHandle<()>>,
}

impl CrosstermSurface {
    /// Take over the terminal: raw mode, alternate screen, mouse capture
    /// and bracketed paste.
    pub fn new() -> io::Result<Self> {
        let (cols, rows) = terminal::size()?;

        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        debug!(cols, rows, "terminal initialized");

        Ok(Self {
            back: CellBuffer::new(cols, rows),
            front: CellBuffer::new(cols, rows),
            full_redraw: true,
            cursor: None,
            title: None,
            title_dirty: false,
            initialized: true,
            stop_input: Arc::new(AtomicBool::new(false)),
            input_thread: None,
        })
    }

    /// Restore the terminal
    fn cleanup(&mut self) -> io::Result<()> {
        self.stop_input.store(true, Ordering::Relaxed);
        if let Some(handle) = self.input_thread.take() {
            let _ = handle.join();
        }

        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            SetCursorStyle::DefaultUserShape,
            Show,
            EnableLineWrap,
            DisableBracketedPaste,
            DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();

        // Disable raw mode - this is the most important part
        terminal::disable_raw_mode()
    }

    /// Write the cells of `row` that changed since the last frame.
    fn draw_row<W: Write>(&mut self, out: &mut W, row: u16, last: &mut Option<Style>) -> io::Result<()> {
        let (cols, _) = self.back.size();
        let mut next_col: Option<u16> = None;

        let mut col = 0;
        while col < cols {
            let Some(cell) = self.back.get(row, col) else {
                break;
            };
            // Continuation cells are drawn by their lead cell
            if cell.width == 0 {
                col += 1;
                continue;
            }
            let width = u16::from(cell.width.max(1));
            let changed = self.full_redraw
                || self.front.get(row, col) != Some(cell)
                || (width == 2 && self.front.get(row, col + 1) != self.back.get(row, col + 1));

            if changed {
                // A wide glyph that would overflow the screen is drawn as a blank
                let fits = col + width <= cols;
                if next_col != Some(col) {
                    queue!(out, MoveTo(col, row))?;
                }
                if *last != Some(cell.style) {
                    apply_style(out, &cell.style)?;
                    *last = Some(cell.style);
                }
                if fits {
                    let mut text = String::with_capacity(4);
                    text.push(cell.ch);
                    text.extend(cell.combining.iter());
                    write!(out, "{}", text)?;
                    next_col = Some(col + width);
                } else {
                    write!(out, " ")?;
                    next_col = Some(col + 1);
                }
            }
            col += width;
        }
        Ok(())
    }
}

impl Surface for CrosstermSurface {
    fn size(&self) -> (u16, u16) {
        self.back.size()
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.back.resize(cols, rows);
        self.front.resize(cols, rows);
        self.full_redraw = true;
    }

    fn clear(&mut self) {
        self.back.clear();
    }

    fn put_run(&mut self, row: u16, col: u16, cells: &[StyledCell]) {
        self.back.put_run(row, col, cells);
    }

    fn show_cursor(&mut self, row: u16, col: u16, shape: CursorShape) {
        self.cursor = Some((row, col, shape));
    }

    fn hide_cursor(&mut self) {
        self.cursor = None;
    }

    fn set_title(&mut self, title: &str) {
        if self.title.as_deref() != Some(title) {
            self.title = Some(title.to_string());
            self.title_dirty = true;
        }
    }

    fn present(&mut self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Begin synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        if self.full_redraw {
            queue!(out, SetAttribute(Attribute::Reset), ResetColor, Clear(ClearType::All))?;
        }

        let (_, rows) = self.back.size();
        let mut last = None;
        for row in 0..rows {
            self.draw_row(&mut out, row, &mut last)?;
        }
        queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;

        if self.title_dirty {
            if let Some(title) = &self.title {
                queue!(out, SetTitle(title))?;
            }
            self.title_dirty = false;
        }

        if let Some((row, col, shape)) = self.cursor {
            queue!(out, cursor_style(shape), MoveTo(col, row), Show)?;
        }

        // End synchronized update
        write!(out, "\x1b[?2026l")?;
        out.flush()?;

        self.front.clone_from(&self.back);
        self.full_redraw = false;
        Ok(())
    }

    fn start_input(&mut self, events: Sender<Event>) -> io::Result<()> {
        if self.input_thread.is_some() {
            return Ok(());
        }
        let stop = Arc::clone(&self.stop_input);
        let handle = thread::Builder::new()
            .name("input".into())
            .spawn(move || input_loop(events, stop))?;
        self.input_thread = Some(handle);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.cleanup()
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Poll crossterm for input until stopped or the queue is gone.
fn input_loop(events: Sender<Event>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match ct::poll(INPUT_POLL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!("input poll failed: {}", e);
                break;
            }
        }
        let event = match ct::read() {
            Ok(event) => event,
            Err(e) => {
                warn!("input read failed: {}", e);
                break;
            }
        };
        if let Some(event) = convert_event(event) {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!("input thread stopped");
}

/// Convert a crossterm event to a crate event
fn convert_event(event: ct::Event) -> Option<Event> {
    match event {
        ct::Event::Key(key) => {
            if key.kind == KeyEventKind::Release {
                return None;
            }
            let code = convert_key(key.code)?;
            Some(Event::Key(KeyInput::new(code, convert_modifiers(key.modifiers))))
        }
        ct::Event::Mouse(mouse) => {
            let kind = match mouse.kind {
                ct::MouseEventKind::Down(b) => MouseKind::Down(convert_button(b)),
                ct::MouseEventKind::Up(b) => MouseKind::Up(convert_button(b)),
                ct::MouseEventKind::Drag(b) => MouseKind::Drag(convert_button(b)),
                ct::MouseEventKind::Moved => MouseKind::Moved,
                ct::MouseEventKind::ScrollUp => MouseKind::ScrollUp,
                ct::MouseEventKind::ScrollDown => MouseKind::ScrollDown,
                _ => return None,
            };
            Some(Event::Mouse(MouseInput {
                kind,
                col: mouse.column,
                row: mouse.row,
                mods: convert_modifiers(mouse.modifiers),
            }))
        }
        ct::Event::Paste(text) => Some(Event::Paste(text)),
        ct::Event::Resize(cols, rows) => Some(Event::Resize(cols, rows)),
        ct::Event::FocusGained | ct::Event::FocusLost => None,
    }
}

fn convert_key(code: ct::KeyCode) -> Option<KeyCode> {
    Some(match code {
        ct::KeyCode::Char(c) => KeyCode::Char(c),
        ct::KeyCode::Enter => KeyCode::Enter,
        ct::KeyCode::Backspace => KeyCode::Backspace,
        ct::KeyCode::Tab => KeyCode::Tab,
        ct::KeyCode::BackTab => KeyCode::BackTab,
        ct::KeyCode::Esc => KeyCode::Esc,
        ct::KeyCode::Up => KeyCode::Up,
        ct::KeyCode::Down => KeyCode::Down,
        ct::KeyCode::Left => KeyCode::Left,
        ct::KeyCode::Right => KeyCode::Right,
        ct::KeyCode::Home => KeyCode::Home,
        ct::KeyCode::End => KeyCode::End,
        ct::KeyCode::PageUp => KeyCode::PageUp,
        ct::KeyCode::PageDown => KeyCode::PageDown,
        ct::KeyCode::Insert => KeyCode::Insert,
        ct::KeyCode::Delete => KeyCode::Delete,
        ct::KeyCode::F(n) => KeyCode::F(n),
        _ => return None,
    })
}

fn convert_modifiers(mods: KeyModifiers) -> Modifiers {
    let mut out = Modifiers::empty();
    if mods.contains(KeyModifiers::SHIFT) {
        out |= Modifiers::SHIFT;
    }
    if mods.contains(KeyModifiers::CONTROL) {
        out |= Modifiers::CTRL;
    }
    if mods.contains(KeyModifiers::ALT) {
        out |= Modifiers::ALT;
    }
    out
}

fn convert_button(button: ct::MouseButton) -> MouseButton {
    match button {
        ct::MouseButton::Left => MouseButton::Left,
        ct::MouseButton::Middle => MouseButton::Middle,
        ct::MouseButton::Right => MouseButton::Right,
    }
}

fn convert_color(color: Color) -> crossterm::style::Color {
    match color {
        Color::Default => crossterm::style::Color::Reset,
        Color::Indexed(idx) => crossterm::style::Color::AnsiValue(idx),
        Color::Rgb(r, g, b) => crossterm::style::Color::Rgb { r, g, b },
    }
}

fn cursor_style(shape: CursorShape) -> SetCursorStyle {
    match shape {
        CursorShape::Default => SetCursorStyle::DefaultUserShape,
        CursorShape::BlinkingBlock => SetCursorStyle::BlinkingBlock,
        CursorShape::SteadyBlock => SetCursorStyle::SteadyBlock,
        CursorShape::BlinkingUnderline => SetCursorStyle::BlinkingUnderScore,
        CursorShape::SteadyUnderline => SetCursorStyle::SteadyUnderScore,
        CursorShape::BlinkingBar => SetCursorStyle::BlinkingBar,
        CursorShape::SteadyBar => SetCursorStyle::SteadyBar,
    }
}

/// Apply cell attributes
fn apply_style<W: Write>(out: &mut W, style: &Style) -> io::Result<()> {
    // Reset first
    queue!(out, SetAttribute(Attribute::Reset))?;

    let flags = style.flags;
    if flags.contains(AttrFlags::BOLD) {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if flags.contains(AttrFlags::DIM) {
        queue!(out, SetAttribute(Attribute::Dim))?;
    }
    if flags.contains(AttrFlags::ITALIC) {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if flags.contains(AttrFlags::UNDERLINE) {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    if flags.contains(AttrFlags::BLINK) {
        queue!(out, SetAttribute(Attribute::SlowBlink))?;
    }
    if flags.contains(AttrFlags::INVERSE) {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    if flags.contains(AttrFlags::HIDDEN) {
        queue!(out, SetAttribute(Attribute::Hidden))?;
    }
    if flags.contains(AttrFlags::STRIKETHROUGH) {
        queue!(out, SetAttribute(Attribute::CrossedOut))?;
    }

    queue!(
        out,
        SetForegroundColor(convert_color(style.fg)),
        SetBackgroundColor(convert_color(style.bg))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_key_event() {
        let key = ct::KeyEvent::new(ct::KeyCode::Char('c'), KeyModifiers::CONTROL);
        match convert_event(ct::Event::Key(key)) {
            Some(Event::Key(input)) => assert!(input.is_ctrl('c')),
            other => panic!("unexpected {:?}", other),
        }

        let mut release = ct::KeyEvent::new(ct::KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert!(convert_event(ct::Event::Key(release)).is_none());
    }

    #[test]
    fn test_convert_mouse_event() {
        let mouse = ct::MouseEvent {
            kind: ct::MouseEventKind::Drag(ct::MouseButton::Right),
            column: 30,
            row: 4,
            modifiers: KeyModifiers::SHIFT | KeyModifiers::ALT,
        };
        match convert_event(ct::Event::Mouse(mouse)) {
            Some(Event::Mouse(input)) => {
                assert_eq!(input.kind, MouseKind::Drag(MouseButton::Right));
                assert_eq!((input.col, input.row), (30, 4));
                assert_eq!(input.mods, Modifiers::SHIFT | Modifiers::ALT);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_convert_paste_and_resize() {
        assert!(matches!(
            convert_event(ct::Event::Paste("hi".into())),
            Some(Event::Paste(text)) if text == "hi"
        ));
        assert!(matches!(convert_event(ct::Event::Resize(80, 24)), Some(Event::Resize(80, 24))));
        assert!(convert_event(ct::Event::FocusGained).is_none());
    }

    #[test]
    fn test_convert_color() {
        assert_eq!(convert_color(Color::Default), crossterm::style::Color::Reset);
        assert_eq!(convert_color(Color::Indexed(208)), crossterm::style::Color::AnsiValue(208));
        assert_eq!(
            convert_color(Color::Rgb(1, 2, 3)),
            crossterm::style::Color::Rgb { r: 1, g: 2, b: 3 }
        );
    }
}
