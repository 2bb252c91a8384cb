//! Cell grid
//!
//! A fixed-size, row-major buffer of styled character cells. The grid knows
//! nothing about cursors or margins; it only stores cells and implements the
//! two erase flavours hardware terminals distinguish.

use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
        /// Set by DECSCA; selective erase leaves these cells alone
        const PROTECTED     = 0b0001_0000_0000;
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// OSC 8 hyperlink target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperlink {
    pub id: Option<String>,
    pub url: String,
}

/// Cell attributes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
    pub link: Option<Arc<Hyperlink>>,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Attributes an erased cell takes: defaults plus the given background.
    pub fn erased(&self) -> Self {
        Self {
            bg: self.bg,
            ..Self::default()
        }
    }
}

/// A single cell.
///
/// `ch == '\0'` is a blank cell. A cell of width 0 is the right half of a
/// wide glyph that starts in the cell to its left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub combining: Vec<char>,
    pub width: u8,
    pub attrs: CellAttrs,
    /// The line continued onto the next row at this cell by autowrap
    pub wrapped: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: '\0',
            combining: Vec::new(),
            width: 1,
            attrs: CellAttrs::default(),
            wrapped: false,
        }
    }
}

impl Cell {
    pub fn new(ch: char, width: u8, attrs: CellAttrs) -> Self {
        Self {
            ch,
            combining: Vec::new(),
            width,
            attrs,
            wrapped: false,
        }
    }

    pub fn continuation(attrs: CellAttrs) -> Self {
        Self {
            ch: '\0',
            combining: Vec::new(),
            width: 0,
            attrs,
            wrapped: false,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_blank(&self) -> bool {
        self.ch == '\0' || self.ch == ' '
    }

    /// Clear the codepoint and restore default attributes, keeping only the
    /// background of `style`.
    pub fn erase(&mut self, style: &CellAttrs) {
        self.ch = '\0';
        self.combining.clear();
        self.width = 1;
        self.attrs = style.erased();
        self.wrapped = false;
    }

    /// Clear only the codepoint. All attributes survive.
    pub fn selective_erase(&mut self) {
        self.ch = '\0';
        self.combining.clear();
        self.width = 1;
    }

    /// Character to draw for this cell (space if blank)
    pub fn display_char(&self) -> char {
        if self.ch == '\0' {
            ' '
        } else {
            self.ch
        }
    }
}

/// Row-major cell buffer
#[derive(Clone, Debug)]
pub struct Grid {
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            cells: vec![Cell::default(); cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Reallocate to a new size, copying the overlapping top-left region.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        if cols == self.cols && rows == self.rows {
            return;
        }
        let mut cells = vec![Cell::default(); cols * rows];
        for row in 0..rows.min(self.rows) {
            let keep = cols.min(self.cols);
            let src = row * self.cols;
            let dst = row * cols;
            cells[dst..dst + keep].clone_from_slice(&self.cells[src..src + keep]);
            // A wide glyph cut in half by the new right edge becomes blank.
            if keep > 0 && cells[dst + keep - 1].width == 2 && keep < self.cols {
                cells[dst + keep - 1] = Cell::default();
            }
        }
        self.cols = cols;
        self.rows = rows;
        self.cells = cells;
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.cols + col]
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        &mut self.cells[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        let start = row * self.cols;
        &self.cells[start..start + self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [Cell] {
        let start = row * self.cols;
        &mut self.cells[start..start + self.cols]
    }

    /// Rotate rows `[top, bottom]` up by `n`; the first `n` rows end up at the bottom.
    pub fn rotate_up(&mut self, top: usize, bottom: usize, n: usize) {
        let span = &mut self.cells[top * self.cols..(bottom + 1) * self.cols];
        span.rotate_left(n * self.cols);
    }

    /// Rotate rows `[top, bottom]` down by `n`; the last `n` rows end up at the top.
    pub fn rotate_down(&mut self, top: usize, bottom: usize, n: usize) {
        let span = &mut self.cells[top * self.cols..(bottom + 1) * self.cols];
        span.rotate_right(n * self.cols);
    }

    /// Erase columns `[left, right]` of `row`.
    pub fn erase_row(&mut self, row: usize, left: usize, right: usize, style: &CellAttrs) {
        for cell in &mut self.row_mut(row)[left..=right] {
            cell.erase(style);
        }
    }

    /// Selectively erase columns `[left, right]` of `row`, skipping protected cells.
    pub fn selective_erase_row(&mut self, row: usize, left: usize, right: usize) {
        for cell in &mut self.row_mut(row)[left..=right] {
            if !cell.attrs.flags.contains(AttrFlags::PROTECTED) {
                cell.selective_erase();
            }
        }
    }

    pub fn clear(&mut self, style: &CellAttrs) {
        for cell in &mut self.cells {
            cell.erase(style);
        }
    }

    /// Text of a row with blanks rendered as spaces
    pub fn row_text(&self, row: usize) -> String {
        let mut text = String::with_capacity(self.cols);
        for cell in self.row(row) {
            if cell.is_continuation() {
                continue;
            }
            text.push(cell.display_char());
            text.extend(cell.combining.iter());
        }
        text
    }
}
