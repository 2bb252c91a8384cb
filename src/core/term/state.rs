//! Terminal state management
//!
//! [`TerminalState`] owns the primary and alternate grids, the cursor,
//! scroll margins, tab stops, modes and charsets, and applies parsed
//! [`Sequence`] values to them. CSI dispatch and SGR live in `csi.rs`.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use unicode_width::UnicodeWidthChar;

use super::charset::{Charset, Charsets, Slot};
use super::grid::{AttrFlags, Cell, CellAttrs, Grid, Hyperlink};
use super::parser::Sequence;

/// Default number of primary-screen lines kept after they scroll off
pub const DEFAULT_SCROLLBACK: usize = 10_000;

const MAX_COMBINING: usize = 8;

/// Cursor shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    /// Default (host terminal dependent)
    #[default]
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
}

impl CursorShape {
    /// Create from DECSCUSR parameter
    pub fn from_decscusr(n: u32) -> Self {
        match n {
            1 => CursorShape::BlinkingBlock,
            2 => CursorShape::SteadyBlock,
            3 => CursorShape::BlinkingUnderline,
            4 => CursorShape::SteadyUnderline,
            5 => CursorShape::BlinkingBar,
            6 => CursorShape::SteadyBar,
            _ => CursorShape::Default,
        }
    }
}

/// Cursor state
#[derive(Clone, Debug, Default)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
    /// Attributes applied to printed and erased cells
    pub attrs: CellAttrs,
    pub shape: CursorShape,
    /// The last column was written; the wrap happens on the next print
    pub pending_wrap: bool,
}

/// Saved cursor state (DECSC)
#[derive(Clone, Debug)]
struct SavedCursor {
    row: usize,
    col: usize,
    attrs: CellAttrs,
    pending_wrap: bool,
    origin_mode: bool,
    charsets: Charsets,
}

/// Scroll margins, inclusive and 0-indexed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Margins {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Margins {
    fn full(cols: usize, rows: usize) -> Self {
        Self {
            top: 0,
            bottom: rows - 1,
            left: 0,
            right: cols - 1,
        }
    }
}

/// Which mouse events the child asked to receive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseMode {
    #[default]
    None,
    /// Presses only (mode 9)
    X10,
    /// Presses and releases (mode 1000)
    Normal,
    /// Plus motion while a button is held (mode 1002)
    ButtonEvent,
    /// Plus all motion (mode 1003)
    AnyEvent,
}

/// Wire format of mouse reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseEncoding {
    #[default]
    Default,
    Utf8,
    Sgr,
}

/// Terminal modes
#[derive(Clone, Debug)]
pub struct TerminalModes {
    pub application_cursor: bool,
    pub application_keypad: bool,
    pub auto_wrap: bool,
    pub origin_mode: bool,
    pub insert_mode: bool,
    pub linefeed_newline: bool,
    pub cursor_visible: bool,
    pub bracketed_paste: bool,
    pub focus_events: bool,
    pub mouse: MouseMode,
    pub mouse_encoding: MouseEncoding,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            application_cursor: false,
            application_keypad: false,
            auto_wrap: true,
            origin_mode: false,
            insert_mode: false,
            linefeed_newline: false,
            cursor_visible: true,
            bracketed_paste: false,
            focus_events: false,
            mouse: MouseMode::None,
            mouse_encoding: MouseEncoding::Default,
        }
    }
}

/// Notifications for the owner of the emulator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermEvent {
    TitleChanged(String),
    Bell,
}

/// Terminal state holding all screen data
pub struct TerminalState {
    pub(super) primary: Grid,
    pub(super) alternate: Grid,
    pub(super) using_alternate: bool,
    pub(super) cursor: Cursor,
    saved: Option<SavedCursor>,
    pub(super) margins: Margins,
    pub(super) tab_stops: BTreeSet<usize>,
    pub(super) modes: TerminalModes,
    pub(super) charsets: Charsets,
    title: String,
    icon_name: String,
    pub(super) last_printed: Option<char>,
    scrollback: VecDeque<Vec<Cell>>,
    scrollback_limit: usize,
    replies: Vec<u8>,
    events: Vec<TermEvent>,
    dcs_active: bool,
}

fn default_tab_stops(from: usize, cols: usize) -> impl Iterator<Item = usize> {
    (from..cols).filter(|c| *c > 0 && c % 8 == 0)
}

impl TerminalState {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: usize, rows: usize, scrollback_limit: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            primary: Grid::new(cols, rows),
            alternate: Grid::new(cols, rows),
            using_alternate: false,
            cursor: Cursor::default(),
            saved: None,
            margins: Margins::full(cols, rows),
            tab_stops: default_tab_stops(0, cols).collect(),
            modes: TerminalModes::default(),
            charsets: Charsets::default(),
            title: String::new(),
            icon_name: String::new(),
            last_printed: None,
            scrollback: VecDeque::new(),
            scrollback_limit,
            replies: Vec::new(),
            events: Vec::new(),
            dcs_active: false,
        }
    }

    pub fn cols(&self) -> usize {
        self.primary.cols()
    }

    pub fn rows(&self) -> usize {
        self.primary.rows()
    }

    /// The grid currently being drawn to
    pub fn grid(&self) -> &Grid {
        if self.using_alternate {
            &self.alternate
        } else {
            &self.primary
        }
    }

    pub(super) fn grid_mut(&mut self) -> &mut Grid {
        if self.using_alternate {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn is_alternate(&self) -> bool {
        self.using_alternate
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn modes(&self) -> &TerminalModes {
        &self.modes
    }

    pub fn tab_stops(&self) -> impl Iterator<Item = usize> + '_ {
        self.tab_stops.iter().copied()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    pub fn scrollback_len(&self) -> usize {
        if self.using_alternate {
            0
        } else {
            self.scrollback.len()
        }
    }

    /// Row `row` of the screen as seen `scroll` lines back into history.
    ///
    /// History rows keep the width they had when they scrolled off, so the
    /// returned slice may be shorter or longer than [`Self::cols`].
    pub fn visible_row(&self, scroll: usize, row: usize) -> &[Cell] {
        let history = self.scrollback_len();
        let scroll = scroll.min(history);
        let line = history - scroll + row;
        if line < history {
            &self.scrollback[line]
        } else {
            self.grid().row((line - history).min(self.rows() - 1))
        }
    }

    /// Bytes the child should receive (status and attribute replies)
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    pub fn take_events(&mut self) -> Vec<TermEvent> {
        std::mem::take(&mut self.events)
    }

    pub(super) fn reply(&mut self, bytes: &[u8]) {
        self.replies.extend_from_slice(bytes);
    }

    /// Apply one parsed sequence
    pub fn apply(&mut self, seq: Sequence) {
        match seq {
            Sequence::Print(c) => self.print(c),
            Sequence::C0(byte) => self.execute(byte),
            Sequence::Esc {
                final_byte,
                intermediates,
            } => self.esc_dispatch(final_byte, &intermediates),
            Sequence::Csi {
                final_byte,
                intermediates,
                params,
            } => self.csi_dispatch(final_byte, &intermediates, &params),
            Sequence::Osc { payload } => self.osc_dispatch(&payload),
            Sequence::Dcs {
                final_byte,
                intermediates,
                params,
            } => {
                tracing::trace!(
                    "DCS hook {:?} {:?} {:?} (payload discarded)",
                    final_byte as char,
                    intermediates,
                    params
                );
                self.dcs_active = true;
            }
            Sequence::DcsData(_) => {}
            Sequence::DcsEnd => self.dcs_active = false,
            Sequence::ParseError(msg) => tracing::debug!("parse error: {}", msg),
            Sequence::Eof => {}
        }
    }

    /// Full reset (RIS). Size, history and title survive.
    pub fn reset(&mut self) {
        let (cols, rows) = (self.cols(), self.rows());
        self.primary.clear(&CellAttrs::default());
        self.alternate.clear(&CellAttrs::default());
        self.using_alternate = false;
        self.cursor = Cursor::default();
        self.saved = None;
        self.margins = Margins::full(cols, rows);
        self.tab_stops = default_tab_stops(0, cols).collect();
        self.modes = TerminalModes::default();
        self.charsets = Charsets::default();
        self.last_printed = None;
        self.dcs_active = false;
    }

    /// Forget the scrollback history.
    pub fn clear_history(&mut self) {
        self.scrollback.clear();
    }

    /// Resize both grids, keeping content anchored at the top left.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let (old_cols, old_rows) = (self.cols(), self.rows());
        if cols == old_cols && rows == old_rows {
            return;
        }
        let full_margins = self.margins == Margins::full(old_cols, old_rows);

        // Keep the cursor line on screen by pushing the top into history.
        if !self.using_alternate && self.cursor.row >= rows {
            let shift = self.cursor.row + 1 - rows;
            self.push_history(0, shift);
            self.primary.rotate_up(0, old_rows - 1, shift);
            self.cursor.row -= shift;
        }

        self.primary.resize(cols, rows);
        self.alternate.resize(cols, rows);

        self.cursor.row = self.cursor.row.min(rows - 1);
        self.cursor.col = self.cursor.col.min(cols - 1);
        self.cursor.pending_wrap = false;

        self.margins = if full_margins {
            Margins::full(cols, rows)
        } else {
            let bottom = self.margins.bottom.min(rows - 1);
            if self.margins.top <= bottom {
                Margins {
                    top: self.margins.top,
                    bottom,
                    left: 0,
                    right: cols - 1,
                }
            } else {
                Margins::full(cols, rows)
            }
        };

        self.tab_stops.retain(|&c| c < cols);
        self.tab_stops.extend(default_tab_stops(old_cols, cols));
    }

    // --- printing ---

    pub(super) fn print(&mut self, c: char) {
        let c = self.charsets.translate(c);
        self.put_glyph(c);
    }

    /// Write one already translated glyph at the cursor.
    pub(super) fn put_glyph(&mut self, c: char) {
        let width = match c.width() {
            Some(w) => w.min(2),
            None => return,
        };
        if width == 0 {
            self.combine(c);
            return;
        }
        let width = if self.cols() < 2 { 1 } else { width };

        if self.cursor.pending_wrap && self.modes.auto_wrap {
            self.wrap_line();
        }

        let right = self.right_bound();
        if width == 2 && self.cursor.col + 1 > right {
            if self.modes.auto_wrap {
                self.wrap_line();
            } else {
                self.cursor.col = right - 1;
            }
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        if self.modes.insert_mode {
            let style = self.cursor.attrs.clone();
            let cells = &mut self.grid_mut().row_mut(row)[col..=right];
            let shift = width.min(cells.len());
            cells.rotate_right(shift);
            for cell in &mut cells[..shift] {
                cell.erase(&style);
            }
        }

        self.clear_wide_overlap(row, col, width);

        let attrs = self.cursor.attrs.clone();
        let grid = self.grid_mut();
        if width == 2 {
            *grid.cell_mut(row, col + 1) = Cell::continuation(attrs.clone());
        }
        *grid.cell_mut(row, col) = Cell::new(c, width as u8, attrs);
        self.last_printed = Some(c);

        let last = col + width - 1;
        if last >= right {
            self.cursor.col = right;
            self.cursor.pending_wrap = self.modes.auto_wrap;
        } else {
            self.cursor.col = last + 1;
        }
    }

    /// Attach a zero-width character to the glyph before the cursor.
    fn combine(&mut self, c: char) {
        let (row, mut col) = (self.cursor.row, self.cursor.col);
        if !self.cursor.pending_wrap {
            if col == 0 {
                return;
            }
            col -= 1;
        }
        let grid = self.grid_mut();
        if grid.cell(row, col).is_continuation() && col > 0 {
            col -= 1;
        }
        let cell = grid.cell_mut(row, col);
        if cell.ch != '\0' && cell.combining.len() < MAX_COMBINING {
            cell.combining.push(c);
        }
    }

    /// Blank the other half of any wide glyph the write at `col` would split.
    fn clear_wide_overlap(&mut self, row: usize, col: usize, width: usize) {
        let cols = self.cols();
        let grid = self.grid_mut();
        if col > 0 && grid.cell(row, col).is_continuation() {
            grid.cell_mut(row, col - 1).selective_erase();
        }
        let end = col + width - 1;
        if end + 1 < cols && grid.cell(row, end).width == 2 {
            grid.cell_mut(row, end + 1).selective_erase();
        }
    }

    /// Materialize a pending wrap: mark the row as continued and move to the
    /// start of the next line.
    fn wrap_line(&mut self) {
        let (row, right) = (self.cursor.row, self.right_bound());
        self.grid_mut().cell_mut(row, right).wrapped = true;
        self.cursor.col = self.margins.left;
        self.index();
    }

    // --- C0 ---

    pub(super) fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => {
                tracing::trace!("bell");
                self.events.push(TermEvent::Bell);
            }
            0x08 => self.backspace(),
            0x09 => self.tab_forward(1),
            0x0a..=0x0c => {
                if self.modes.linefeed_newline {
                    self.carriage_return();
                }
                self.index();
            }
            0x0d => self.carriage_return(),
            0x0e => self.charsets.select(Slot::G1),
            0x0f => self.charsets.select(Slot::G0),
            _ => tracing::trace!("ignored C0 {:#04x}", byte),
        }
    }

    pub(super) fn carriage_return(&mut self) {
        self.cursor.col = if self.cursor.col >= self.margins.left {
            self.margins.left
        } else {
            0
        };
        self.cursor.pending_wrap = false;
    }

    /// Cursor left; at the left margin, continue on the previous row's right
    /// margin unless the cursor is already on the top row of the region.
    pub(super) fn backspace(&mut self) {
        if self.cursor.pending_wrap {
            self.cursor.pending_wrap = false;
            if self.cursor.col > 0 {
                self.cursor.col -= 1;
            }
            return;
        }
        if self.cursor.col > self.margins.left {
            self.cursor.col -= 1;
        } else if self.cursor.row > self.margins.top {
            self.cursor.row -= 1;
            self.cursor.col = self.margins.right;
        }
    }

    pub(super) fn tab_forward(&mut self, n: usize) {
        let right = self.right_bound();
        for _ in 0..n {
            let next = self.tab_stops.range(self.cursor.col + 1..).next().copied();
            self.cursor.col = next.unwrap_or(right).min(right);
        }
        self.cursor.pending_wrap = false;
    }

    pub(super) fn tab_backward(&mut self, n: usize) {
        let left = self.left_bound();
        for _ in 0..n {
            let prev = self.tab_stops.range(..self.cursor.col).next_back().copied();
            self.cursor.col = prev.unwrap_or(left).max(left);
        }
        self.cursor.pending_wrap = false;
    }

    /// Move down one line, scrolling the region at the bottom margin.
    pub(super) fn index(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.margins.bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows() {
            self.cursor.row += 1;
        }
    }

    pub(super) fn reverse_index(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.margins.top {
            self.scroll_down(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    // --- scrolling and line editing ---

    fn push_history(&mut self, top: usize, n: usize) {
        if self.scrollback_limit == 0 {
            return;
        }
        for row in top..top + n {
            self.scrollback.push_back(self.primary.row(row).to_vec());
        }
        while self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
    }

    /// Scroll the region up `n` lines, blanking the bottom.
    pub(super) fn scroll_up(&mut self, n: usize) {
        let Margins { top, bottom, .. } = self.margins;
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }
        if !self.using_alternate && top == 0 {
            self.push_history(top, n);
        }
        let style = self.cursor.attrs.clone();
        let cols = self.cols();
        let grid = self.grid_mut();
        grid.rotate_up(top, bottom, n);
        for row in bottom + 1 - n..=bottom {
            grid.erase_row(row, 0, cols - 1, &style);
        }
    }

    /// Scroll the region down `n` lines, blanking the top.
    pub(super) fn scroll_down(&mut self, n: usize) {
        let Margins { top, bottom, .. } = self.margins;
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }
        let style = self.cursor.attrs.clone();
        let cols = self.cols();
        let grid = self.grid_mut();
        grid.rotate_down(top, bottom, n);
        for row in top..top + n {
            grid.erase_row(row, 0, cols - 1, &style);
        }
    }

    /// Insert `n` blank lines at the cursor row, pushing the rest of the
    /// region down. No-op outside the scroll region.
    pub(super) fn insert_lines(&mut self, n: usize) {
        let Margins { top, bottom, .. } = self.margins;
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        let n = n.min(bottom - row + 1);
        let style = self.cursor.attrs.clone();
        let cols = self.cols();
        let grid = self.grid_mut();
        grid.rotate_down(row, bottom, n);
        for r in row..row + n {
            grid.erase_row(r, 0, cols - 1, &style);
        }
        self.cursor.col = self.margins.left;
        self.cursor.pending_wrap = false;
    }

    /// Delete `n` lines at the cursor row, pulling the rest of the region up.
    /// No-op outside the scroll region.
    pub(super) fn delete_lines(&mut self, n: usize) {
        let Margins { top, bottom, .. } = self.margins;
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        let n = n.min(bottom - row + 1);
        let style = self.cursor.attrs.clone();
        let cols = self.cols();
        let grid = self.grid_mut();
        grid.rotate_up(row, bottom, n);
        for r in bottom + 1 - n..=bottom {
            grid.erase_row(r, 0, cols - 1, &style);
        }
        self.cursor.col = self.margins.left;
        self.cursor.pending_wrap = false;
    }

    /// Insert `n` blank cells at the cursor, shifting the rest of the line
    /// right within the right margin.
    pub(super) fn insert_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let right = self.right_bound();
        self.cursor.pending_wrap = false;
        if col > right {
            return;
        }
        let n = n.min(right - col + 1);
        let style = self.cursor.attrs.clone();
        let cells = &mut self.grid_mut().row_mut(row)[col..=right];
        cells.rotate_right(n);
        for cell in &mut cells[..n] {
            cell.erase(&style);
        }
    }

    /// Delete `n` cells at the cursor, shifting the rest of the line left and
    /// blanking the vacated cells at the right margin.
    pub(super) fn delete_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let right = self.right_bound();
        self.cursor.pending_wrap = false;
        if col > right {
            return;
        }
        let n = n.min(right - col + 1);
        let style = self.cursor.attrs.clone();
        let cells = &mut self.grid_mut().row_mut(row)[col..=right];
        cells.rotate_left(n);
        let len = cells.len();
        for cell in &mut cells[len - n..] {
            cell.erase(&style);
        }
    }

    /// Erase `n` cells from the cursor without moving it.
    pub(super) fn erase_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let last = (col + n).min(self.cols()) - 1;
        let style = self.cursor.attrs.clone();
        self.grid_mut().erase_row(row, col, last, &style);
        self.cursor.pending_wrap = false;
    }

    fn erase_span(&mut self, row: usize, left: usize, right: usize, selective: bool) {
        let style = self.cursor.attrs.clone();
        let grid = self.grid_mut();
        if selective {
            grid.selective_erase_row(row, left, right);
        } else {
            grid.erase_row(row, left, right, &style);
        }
    }

    /// ED / DECSED
    pub(super) fn erase_display(&mut self, mode: u32, selective: bool) {
        let (rows, last_col) = (self.rows(), self.cols() - 1);
        let (row, col) = (self.cursor.row, self.cursor.col);
        match mode {
            0 => {
                self.erase_span(row, col, last_col, selective);
                for r in row + 1..rows {
                    self.erase_span(r, 0, last_col, selective);
                }
            }
            1 => {
                for r in 0..row {
                    self.erase_span(r, 0, last_col, selective);
                }
                self.erase_span(row, 0, col, selective);
            }
            2 => {
                for r in 0..rows {
                    self.erase_span(r, 0, last_col, selective);
                }
            }
            3 => self.clear_history(),
            _ => tracing::debug!("unknown erase-in-display mode {}", mode),
        }
        self.cursor.pending_wrap = false;
    }

    /// EL / DECSEL
    pub(super) fn erase_line(&mut self, mode: u32, selective: bool) {
        let last_col = self.cols() - 1;
        let (row, col) = (self.cursor.row, self.cursor.col);
        match mode {
            0 => self.erase_span(row, col, last_col, selective),
            1 => self.erase_span(row, 0, col, selective),
            2 => self.erase_span(row, 0, last_col, selective),
            _ => tracing::debug!("unknown erase-in-line mode {}", mode),
        }
        self.cursor.pending_wrap = false;
    }

    // --- cursor movement ---

    /// Right edge for the cursor: the right margin, or the screen edge when
    /// the cursor is already past it.
    pub(super) fn right_bound(&self) -> usize {
        if self.cursor.col <= self.margins.right {
            self.margins.right
        } else {
            self.cols() - 1
        }
    }

    fn left_bound(&self) -> usize {
        if self.cursor.col >= self.margins.left {
            self.margins.left
        } else {
            0
        }
    }

    pub(super) fn cursor_up(&mut self, n: usize) {
        let top = if self.cursor.row >= self.margins.top {
            self.margins.top
        } else {
            0
        };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(top);
        self.cursor.pending_wrap = false;
    }

    pub(super) fn cursor_down(&mut self, n: usize) {
        let bottom = if self.cursor.row <= self.margins.bottom {
            self.margins.bottom
        } else {
            self.rows() - 1
        };
        self.cursor.row = self.cursor.row.saturating_add(n).min(bottom);
        self.cursor.pending_wrap = false;
    }

    pub(super) fn cursor_forward(&mut self, n: usize) {
        let right = self.right_bound();
        self.cursor.col = self.cursor.col.saturating_add(n).min(right);
        self.cursor.pending_wrap = false;
    }

    pub(super) fn cursor_back(&mut self, n: usize) {
        let left = self.left_bound();
        self.cursor.col = self.cursor.col.saturating_sub(n).max(left);
        self.cursor.pending_wrap = false;
    }

    /// VPR: down `n` rows, clamped to the grid rather than the region
    pub(super) fn row_relative(&mut self, n: usize) {
        self.cursor.row = self.cursor.row.saturating_add(n).min(self.rows() - 1);
        self.cursor.pending_wrap = false;
    }

    /// HPR: right `n` columns, clamped to the grid
    pub(super) fn col_relative(&mut self, n: usize) {
        self.cursor.col = self.cursor.col.saturating_add(n).min(self.cols() - 1);
        self.cursor.pending_wrap = false;
    }

    /// Absolute column, clamped to the grid
    pub(super) fn set_col(&mut self, col: usize) {
        self.cursor.col = col.min(self.cols() - 1);
        self.cursor.pending_wrap = false;
    }

    /// Absolute row, relative to the top margin in origin mode
    pub(super) fn set_row(&mut self, row: usize) {
        self.cursor.row = if self.modes.origin_mode {
            self.margins.top.saturating_add(row).min(self.margins.bottom)
        } else {
            row.min(self.rows() - 1)
        };
        self.cursor.pending_wrap = false;
    }

    pub(super) fn move_to(&mut self, row: usize, col: usize) {
        self.set_row(row);
        self.set_col(col);
    }

    /// Cursor row as reported to the child (origin mode aware)
    pub(super) fn reported_row(&self) -> usize {
        if self.modes.origin_mode {
            self.cursor.row.saturating_sub(self.margins.top)
        } else {
            self.cursor.row
        }
    }

    /// DECSTBM with 0-indexed bounds. Invalid regions are ignored.
    pub(super) fn set_margins(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows() - 1);
        if top > bottom {
            tracing::debug!("ignoring scroll region {}..{}", top, bottom);
            return;
        }
        self.margins.top = top;
        self.margins.bottom = bottom;
        self.move_to(0, 0);
    }

    pub(super) fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            row: self.cursor.row,
            col: self.cursor.col,
            attrs: self.cursor.attrs.clone(),
            pending_wrap: self.cursor.pending_wrap,
            origin_mode: self.modes.origin_mode,
            charsets: self.charsets.clone(),
        });
    }

    pub(super) fn restore_cursor(&mut self) {
        match self.saved.clone() {
            Some(saved) => {
                self.cursor.row = saved.row.min(self.rows() - 1);
                self.cursor.col = saved.col.min(self.cols() - 1);
                self.cursor.attrs = saved.attrs;
                self.cursor.pending_wrap = saved.pending_wrap;
                self.modes.origin_mode = saved.origin_mode;
                self.charsets = saved.charsets;
            }
            None => {
                self.cursor.row = 0;
                self.cursor.col = 0;
                self.cursor.attrs.reset();
                self.cursor.pending_wrap = false;
                self.modes.origin_mode = false;
                self.charsets = Charsets::default();
            }
        }
    }

    pub(super) fn enter_alternate(&mut self) {
        if self.using_alternate {
            return;
        }
        self.alternate.clear(&CellAttrs::default());
        self.using_alternate = true;
    }

    pub(super) fn leave_alternate(&mut self) {
        if !self.using_alternate {
            return;
        }
        self.using_alternate = false;
        self.alternate.clear(&CellAttrs::default());
    }

    /// Soft reset (DECSTR)
    pub(super) fn soft_reset(&mut self) {
        let (cols, rows) = (self.cols(), self.rows());
        self.modes.insert_mode = false;
        self.modes.origin_mode = false;
        self.modes.auto_wrap = true;
        self.modes.cursor_visible = true;
        self.modes.application_cursor = false;
        self.modes.application_keypad = false;
        self.margins = Margins::full(cols, rows);
        self.cursor.attrs.reset();
        self.cursor.pending_wrap = false;
        self.charsets = Charsets::default();
        self.saved = None;
    }

    // --- ESC ---

    pub(super) fn esc_dispatch(&mut self, final_byte: u8, intermediates: &[u8]) {
        match (intermediates, final_byte) {
            ([], b'7') => self.save_cursor(),
            ([], b'8') => self.restore_cursor(),
            ([], b'D') => self.index(),
            ([], b'E') => {
                self.carriage_return();
                self.index();
            }
            ([], b'M') => self.reverse_index(),
            ([], b'H') => {
                self.tab_stops.insert(self.cursor.col);
            }
            ([], b'c') => self.reset(),
            ([], b'=') => self.modes.application_keypad = true,
            ([], b'>') => self.modes.application_keypad = false,
            ([], b'N') => self.charsets.single_shift(Slot::G2),
            ([], b'O') => self.charsets.single_shift(Slot::G3),
            ([], b'n') => self.charsets.select(Slot::G2),
            ([], b'o') => self.charsets.select(Slot::G3),
            // String terminator, the string itself was already dispatched
            ([], b'\\') => {}
            ([b'#'], b'8') => self.screen_alignment(),
            ([i], f) => match (Slot::from_intermediate(*i), Charset::from_final(f)) {
                (Some(slot), Some(charset)) => self.charsets.designate(slot, charset),
                _ => tracing::debug!("unhandled ESC {} {}", *i as char, f as char),
            },
            _ => tracing::debug!("unhandled ESC {:?} {}", intermediates, final_byte as char),
        }
    }

    /// DECALN: fill the screen with 'E'
    fn screen_alignment(&mut self) {
        let (cols, rows) = (self.cols(), self.rows());
        self.margins = Margins::full(cols, rows);
        let grid = self.grid_mut();
        for row in 0..rows {
            for cell in grid.row_mut(row) {
                *cell = Cell::new('E', 1, CellAttrs::default());
            }
        }
        self.move_to(0, 0);
    }

    // --- OSC ---

    pub(super) fn osc_dispatch(&mut self, payload: &str) {
        let (selector, text) = payload.split_once(';').unwrap_or((payload, ""));
        match selector {
            "0" => {
                self.icon_name = text.to_string();
                self.set_title(text);
            }
            "1" => self.icon_name = text.to_string(),
            "2" => self.set_title(text),
            "8" => self.set_hyperlink(text),
            _ => tracing::debug!("unhandled OSC {}", selector),
        }
    }

    fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.title = title.to_string();
            self.events.push(TermEvent::TitleChanged(self.title.clone()));
        }
    }

    /// `OSC 8 ; params ; url`, where params is a `:` separated `key=value`
    /// list. An empty url ends the link.
    fn set_hyperlink(&mut self, text: &str) {
        let (params, url) = text.split_once(';').unwrap_or(("", text));
        if url.is_empty() {
            self.cursor.attrs.link = None;
            return;
        }
        let id = params
            .split(':')
            .find_map(|kv| kv.strip_prefix("id="))
            .map(str::to_string);
        self.cursor.attrs.link = Some(Arc::new(Hyperlink {
            id,
            url: url.to_string(),
        }));
    }

    pub(super) fn set_protected(&mut self, on: bool) {
        self.cursor.attrs.flags.set(AttrFlags::PROTECTED, on);
    }
}
