//! Render surface abstraction
//!
//! The multiplexer draws into a [`Surface`]: runs of styled cells at a
//! position, a cursor, a title. Backends decide how (and whether) those
//! reach a physical screen. [`CellBuffer`] is the shared back buffer.

use std::io;
use std::sync::mpsc::Sender;

use crate::core::term::{AttrFlags, Cell, CellAttrs, Color, CursorShape};
use crate::event::Event;

/// Style of one drawn cell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl Style {
    pub fn bold(mut self) -> Self {
        self.flags |= AttrFlags::BOLD;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.flags |= AttrFlags::INVERSE;
        self
    }

    pub fn dim(mut self) -> Self {
        self.flags |= AttrFlags::DIM;
        self
    }
}

impl From<&CellAttrs> for Style {
    fn from(attrs: &CellAttrs) -> Self {
        Self {
            fg: attrs.fg,
            bg: attrs.bg,
            flags: attrs.flags - AttrFlags::PROTECTED,
        }
    }
}

/// A cell as the surface sees it. `width == 0` marks the right half of a
/// wide glyph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledCell {
    pub ch: char,
    pub combining: Vec<char>,
    pub width: u8,
    pub style: Style,
}

impl Default for StyledCell {
    fn default() -> Self {
        Self::new(' ', Style::default())
    }
}

impl StyledCell {
    pub fn new(ch: char, style: Style) -> Self {
        Self {
            ch,
            combining: Vec::new(),
            width: 1,
            style,
        }
    }

    /// Styled cells for a plain string, one per char
    pub fn line(text: &str, style: Style) -> Vec<StyledCell> {
        text.chars().map(|ch| StyledCell::new(ch, style)).collect()
    }
}

impl From<&Cell> for StyledCell {
    fn from(cell: &Cell) -> Self {
        Self {
            ch: cell.display_char(),
            combining: cell.combining.clone(),
            width: cell.width,
            style: Style::from(&cell.attrs),
        }
    }
}

pub trait Surface {
    /// Current size as (cols, rows)
    fn size(&self) -> (u16, u16);

    fn resize(&mut self, cols: u16, rows: u16);

    /// Blank the whole back buffer
    fn clear(&mut self);

    /// Write cells starting at (row, col), clipped to the surface.
    fn put_run(&mut self, row: u16, col: u16, cells: &[StyledCell]);

    fn show_cursor(&mut self, row: u16, col: u16, shape: CursorShape);

    fn hide_cursor(&mut self);

    fn set_title(&mut self, title: &str);

    /// Make the back buffer visible.
    fn present(&mut self) -> io::Result<()>;

    /// Begin delivering input into the event queue.
    fn start_input(&mut self, _events: Sender<Event>) -> io::Result<()> {
        Ok(())
    }

    /// Restore the host terminal.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A rectangle of a surface with its own origin
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Surface coordinates to viewport-relative ones, if inside
    pub fn translate(&self, col: u16, row: u16) -> Option<(u16, u16)> {
        let inside = col >= self.x
            && row >= self.y
            && col - self.x < self.width
            && row - self.y < self.height;
        inside.then(|| (col - self.x, row - self.y))
    }

    /// Write a run at viewport-relative (row, col), clipped to the viewport.
    pub fn put_run(&self, surface: &mut dyn Surface, row: u16, col: u16, cells: &[StyledCell]) {
        if row >= self.height || col >= self.width {
            return;
        }
        let room = (self.width - col) as usize;
        let mut cells = &cells[..cells.len().min(room)];
        // Never leave half a wide glyph at the viewport edge
        if cells.last().map_or(false, |c| c.width == 2) && cells.len() == room {
            cells = &cells[..cells.len() - 1];
        }
        surface.put_run(self.y + row, self.x + col, cells);
    }

    /// Blank the whole viewport
    pub fn fill(&self, surface: &mut dyn Surface, style: Style) {
        let blank = vec![StyledCell::new(' ', style); self.width as usize];
        for row in 0..self.height {
            surface.put_run(self.y + row, self.x, &blank);
        }
    }
}

/// Row-major grid of styled cells
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellBuffer {
    cols: u16,
    rows: u16,
    cells: Vec<StyledCell>,
}

impl CellBuffer {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            cells: vec![StyledCell::default(); cols as usize * rows as usize],
        }
    }

    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        *self = Self::new(cols, rows);
    }

    pub fn clear(&mut self) {
        self.cells.fill(StyledCell::default());
    }

    pub fn get(&self, row: u16, col: u16) -> Option<&StyledCell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }

    pub fn row(&self, row: u16) -> &[StyledCell] {
        if row >= self.rows {
            return &[];
        }
        let start = row as usize * self.cols as usize;
        &self.cells[start..start + self.cols as usize]
    }

    pub fn put_run(&mut self, row: u16, col: u16, cells: &[StyledCell]) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let start = row as usize * self.cols as usize + col as usize;
        let room = (self.cols - col) as usize;
        for (dst, src) in self.cells[start..start + room].iter_mut().zip(cells) {
            dst.clone_from(src);
        }
    }

    /// Text of a row; the right halves of wide glyphs are skipped
    pub fn row_text(&self, row: u16) -> String {
        let mut text = String::new();
        for cell in self.row(row) {
            if cell.width == 0 {
                continue;
            }
            text.push(cell.ch);
            text.extend(cell.combining.iter());
        }
        text
    }
}

/// Headless surface that keeps the last presented frame in memory
#[derive(Debug, Default)]
pub struct MemorySurface {
    back: CellBuffer,
    front: CellBuffer,
    cursor: Option<(u16, u16, CursorShape)>,
    title: String,
    frames: usize,
}

impl MemorySurface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            back: CellBuffer::new(cols, rows),
            front: CellBuffer::new(cols, rows),
            ..Default::default()
        }
    }

    /// Last presented frame
    pub fn frame(&self) -> &CellBuffer {
        &self.front
    }

    pub fn text(&self, row: u16) -> String {
        self.front.row_text(row)
    }

    pub fn cursor(&self) -> Option<(u16, u16, CursorShape)> {
        self.cursor
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Surface for MemorySurface {
    fn size(&self) -> (u16, u16) {
        self.back.size()
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.back.resize(cols, rows);
        self.front.resize(cols, rows);
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
        self.title = title.to_string();
    }

    fn present(&mut self) -> io::Result<()> {
        self.front.clone_from(&self.back);
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_run_clips_at_edge() {
        let mut buf = CellBuffer::new(4, 2);
        buf.put_run(0, 2, &StyledCell::line("abcdef", Style::default()));
        assert_eq!(buf.row_text(0), "  ab");
        buf.put_run(5, 0, &StyledCell::line("x", Style::default()));
        buf.put_run(1, 9, &StyledCell::line("x", Style::default()));
        assert_eq!(buf.row_text(1), "    ");
    }

    #[test]
    fn test_viewport_offsets_and_clips() {
        let mut surface = MemorySurface::new(10, 4);
        let view = Viewport::new(3, 1, 4, 2);
        view.put_run(&mut surface, 0, 1, &StyledCell::line("hello", Style::default()));
        view.put_run(&mut surface, 2, 0, &StyledCell::line("below", Style::default()));
        surface.present().unwrap();
        assert_eq!(surface.text(1), "    hel   ");
        assert_eq!(surface.text(3), "          ");
    }

    #[test]
    fn test_viewport_translate() {
        let view = Viewport::new(21, 0, 10, 5);
        assert_eq!(view.translate(21, 0), Some((0, 0)));
        assert_eq!(view.translate(30, 4), Some((9, 4)));
        assert_eq!(view.translate(31, 4), None);
        assert_eq!(view.translate(5, 2), None);
    }

    #[test]
    fn test_memory_surface_presents_back_buffer() {
        let mut surface = MemorySurface::new(3, 1);
        surface.put_run(0, 0, &StyledCell::line("abc", Style::default()));
        assert_eq!(surface.text(0), "   ");
        surface.present().unwrap();
        assert_eq!(surface.text(0), "abc");
        assert_eq!(surface.frames(), 1);
    }
}
