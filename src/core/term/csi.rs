//! CSI dispatch and Select Graphic Rendition

use super::grid::{AttrFlags, Color};
use super::state::{CursorShape, MouseEncoding, MouseMode, TerminalState};

/// Parameter `i`, with 0 or missing meaning `default`
fn param(params: &[u32], i: usize, default: u32) -> u32 {
    match params.get(i) {
        Some(&0) | None => default,
        Some(&v) => v,
    }
}

/// Count-style parameter (default 1) as usize
fn count(params: &[u32], i: usize) -> usize {
    param(params, i, 1) as usize
}

/// Raw parameter value, 0 when missing
fn raw(params: &[u32], i: usize) -> u32 {
    params.get(i).copied().unwrap_or(0)
}

impl TerminalState {
    pub(super) fn csi_dispatch(&mut self, final_byte: u8, intermediates: &[u8], params: &[u32]) {
        match (intermediates, final_byte) {
            ([], b'@') => self.insert_chars(count(params, 0)),
            ([], b'A') => self.cursor_up(count(params, 0)),
            ([], b'B') => self.cursor_down(count(params, 0)),
            ([], b'C') => self.cursor_forward(count(params, 0)),
            ([], b'D') => self.cursor_back(count(params, 0)),
            ([], b'E') => {
                self.cursor_down(count(params, 0));
                self.carriage_return();
            }
            ([], b'F') => {
                self.cursor_up(count(params, 0));
                self.carriage_return();
            }
            ([], b'G') | ([], b'`') => self.set_col(count(params, 0) - 1),
            ([], b'H') | ([], b'f') => self.move_to(count(params, 0) - 1, count(params, 1) - 1),
            ([], b'I') => self.tab_forward(count(params, 0)),
            ([], b'J') => self.erase_display(raw(params, 0), false),
            ([b'?'], b'J') => self.erase_display(raw(params, 0), true),
            ([], b'K') => self.erase_line(raw(params, 0), false),
            ([b'?'], b'K') => self.erase_line(raw(params, 0), true),
            ([], b'L') => self.insert_lines(count(params, 0)),
            ([], b'M') => self.delete_lines(count(params, 0)),
            ([], b'P') => self.delete_chars(count(params, 0)),
            ([], b'S') => self.scroll_up(count(params, 0)),
            // Five or more parameters is the xterm mouse highlight form
            ([], b'T') if params.len() < 5 => self.scroll_down(count(params, 0)),
            ([], b'X') => self.erase_chars(count(params, 0)),
            ([], b'Z') => self.tab_backward(count(params, 0)),
            ([], b'b') => self.repeat_last(count(params, 0)),
            ([], b'c') if raw(params, 0) == 0 => self.reply(b"\x1b[?62;22c"),
            ([b'>'], b'c') if raw(params, 0) == 0 => self.reply(b"\x1b[>1;10;0c"),
            ([], b'a') => self.col_relative(count(params, 0)),
            ([], b'd') => self.set_row(count(params, 0) - 1),
            ([], b'e') => self.row_relative(count(params, 0)),
            ([], b'g') => self.clear_tab_stops(raw(params, 0)),
            ([], b'h') => self.set_ansi_modes(params, true),
            ([], b'l') => self.set_ansi_modes(params, false),
            ([b'?'], b'h') => self.set_private_modes(params, true),
            ([b'?'], b'l') => self.set_private_modes(params, false),
            ([], b'm') => self.select_graphic_rendition(params),
            ([], b'n') => self.device_status(raw(params, 0), false),
            ([b'?'], b'n') => self.device_status(raw(params, 0), true),
            ([], b'r') => {
                let top = count(params, 0) - 1;
                let bottom = param(params, 1, self.rows() as u32) as usize - 1;
                self.set_margins(top, bottom);
            }
            ([], b's') => self.save_cursor(),
            ([], b'u') => self.restore_cursor(),
            ([b' '], b'q') => self.cursor.shape = CursorShape::from_decscusr(raw(params, 0)),
            ([b'"'], b'q') => match raw(params, 0) {
                1 => self.set_protected(true),
                0 | 2 => self.set_protected(false),
                _ => {}
            },
            ([b'!'], b'p') => self.soft_reset(),
            _ => tracing::debug!(
                "unhandled CSI {:?} {:?} {}",
                params,
                intermediates,
                final_byte as char
            ),
        }
    }

    /// REP: print the last graphic character `n` more times
    fn repeat_last(&mut self, n: usize) {
        let Some(c) = self.last_printed else {
            return;
        };
        let n = n.min(self.cols() * self.rows());
        for _ in 0..n {
            self.put_glyph(c);
        }
    }

    /// TBC
    fn clear_tab_stops(&mut self, mode: u32) {
        match mode {
            0 => {
                self.tab_stops.remove(&self.cursor.col);
            }
            3 => self.tab_stops.clear(),
            _ => {}
        }
    }

    fn device_status(&mut self, kind: u32, private: bool) {
        match (kind, private) {
            (5, false) => self.reply(b"\x1b[0n"),
            (6, _) => {
                let row = self.reported_row() + 1;
                let col = self.cursor.col + 1;
                let reply = if private {
                    format!("\x1b[?{};{}R", row, col)
                } else {
                    format!("\x1b[{};{}R", row, col)
                };
                self.reply(reply.as_bytes());
            }
            _ => tracing::debug!("unhandled DSR {} (private: {})", kind, private),
        }
    }

    fn set_ansi_modes(&mut self, params: &[u32], on: bool) {
        for &mode in params {
            match mode {
                4 => self.modes.insert_mode = on,
                20 => self.modes.linefeed_newline = on,
                _ => tracing::debug!("unhandled ANSI mode {}", mode),
            }
        }
    }

    fn set_private_modes(&mut self, params: &[u32], on: bool) {
        for &mode in params {
            match mode {
                1 => self.modes.application_cursor = on,
                6 => {
                    self.modes.origin_mode = on;
                    self.move_to(0, 0);
                }
                7 => {
                    self.modes.auto_wrap = on;
                    if !on {
                        self.cursor.pending_wrap = false;
                    }
                }
                // Cursor blink is up to the host terminal
                12 => {}
                25 => self.modes.cursor_visible = on,
                9 => self.set_mouse(MouseMode::X10, on),
                1000 => self.set_mouse(MouseMode::Normal, on),
                1002 => self.set_mouse(MouseMode::ButtonEvent, on),
                1003 => self.set_mouse(MouseMode::AnyEvent, on),
                1004 => self.modes.focus_events = on,
                1005 => self.set_mouse_encoding(MouseEncoding::Utf8, on),
                1006 => self.set_mouse_encoding(MouseEncoding::Sgr, on),
                47 | 1047 => {
                    if on {
                        self.enter_alternate();
                    } else {
                        self.leave_alternate();
                    }
                }
                1048 => {
                    if on {
                        self.save_cursor();
                    } else {
                        self.restore_cursor();
                    }
                }
                1049 => {
                    if on {
                        self.save_cursor();
                        self.enter_alternate();
                    } else {
                        self.leave_alternate();
                        self.restore_cursor();
                    }
                }
                2004 => self.modes.bracketed_paste = on,
                _ => tracing::debug!("unhandled private mode {}", mode),
            }
        }
    }

    fn set_mouse(&mut self, mode: MouseMode, on: bool) {
        if on {
            self.modes.mouse = mode;
        } else if self.modes.mouse == mode {
            self.modes.mouse = MouseMode::None;
        }
    }

    fn set_mouse_encoding(&mut self, encoding: MouseEncoding, on: bool) {
        if on {
            self.modes.mouse_encoding = encoding;
        } else if self.modes.mouse_encoding == encoding {
            self.modes.mouse_encoding = MouseEncoding::Default;
        }
    }

    /// SGR. A truncated extended color stops processing of the rest of the
    /// list.
    pub(super) fn select_graphic_rendition(&mut self, params: &[u32]) {
        if params.is_empty() {
            self.reset_rendition();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            let flags = &mut self.cursor.attrs.flags;
            match params[i] {
                0 => self.reset_rendition(),
                1 => flags.insert(AttrFlags::BOLD),
                2 => flags.insert(AttrFlags::DIM),
                3 => flags.insert(AttrFlags::ITALIC),
                4 => flags.insert(AttrFlags::UNDERLINE),
                5 | 6 => flags.insert(AttrFlags::BLINK),
                7 => flags.insert(AttrFlags::INVERSE),
                8 => flags.insert(AttrFlags::HIDDEN),
                9 => flags.insert(AttrFlags::STRIKETHROUGH),
                21 => flags.remove(AttrFlags::BOLD),
                22 => flags.remove(AttrFlags::BOLD | AttrFlags::DIM),
                23 => flags.remove(AttrFlags::ITALIC),
                24 => flags.remove(AttrFlags::UNDERLINE),
                25 => flags.remove(AttrFlags::BLINK),
                27 => flags.remove(AttrFlags::INVERSE),
                28 => flags.remove(AttrFlags::HIDDEN),
                29 => flags.remove(AttrFlags::STRIKETHROUGH),
                n @ 30..=37 => self.cursor.attrs.fg = Color::Indexed((n - 30) as u8),
                n @ 90..=97 => self.cursor.attrs.fg = Color::Indexed((n - 90 + 8) as u8),
                n @ 40..=47 => self.cursor.attrs.bg = Color::Indexed((n - 40) as u8),
                n @ 100..=107 => self.cursor.attrs.bg = Color::Indexed((n - 100 + 8) as u8),
                39 => self.cursor.attrs.fg = Color::Default,
                49 => self.cursor.attrs.bg = Color::Default,
                selector @ (38 | 48) => match extended_color(&params[i + 1..]) {
                    Some((color, used)) => {
                        if selector == 38 {
                            self.cursor.attrs.fg = color;
                        } else {
                            self.cursor.attrs.bg = color;
                        }
                        i += used;
                    }
                    None => return,
                },
                n => tracing::trace!("unhandled SGR {}", n),
            }
            i += 1;
        }
    }

    /// SGR 0. Protection and the active hyperlink are not graphic rendition.
    fn reset_rendition(&mut self) {
        let attrs = &mut self.cursor.attrs;
        attrs.fg = Color::Default;
        attrs.bg = Color::Default;
        attrs.flags &= AttrFlags::PROTECTED;
    }
}

/// Decode `5;idx` or `2;r;g;b`, returning the color and the number of
/// parameters consumed.
fn extended_color(rest: &[u32]) -> Option<(Color, usize)> {
    match rest {
        [5, idx, ..] => Some((Color::Indexed(component(*idx)), 2)),
        [2, r, g, b, ..] => Some((Color::Rgb(component(*r), component(*g), component(*b)), 4)),
        _ => None,
    }
}

/// Saturate a colour parameter into a byte
fn component(value: u32) -> u8 {
    value.min(u8::MAX as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::grid::CellAttrs;
    use crate::core::term::Emulator;
    use proptest::prelude::*;

    fn text(term: &Emulator) -> Vec<String> {
        let grid = term.state().grid();
        (0..grid.rows()).map(|r| grid.row_text(r)).collect()
    }

    fn cursor(term: &Emulator) -> (usize, usize) {
        let c = term.state().cursor();
        (c.row, c.col)
    }

    #[test]
    fn test_insert_char_zero_means_one() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"ab\x1b[1G\x1b[0@");
        assert_eq!(text(&t), [" a"]);
        assert_eq!(cursor(&t), (0, 0));
    }

    #[test]
    fn test_insert_lines_past_bottom_clears_region() {
        let mut t = Emulator::new(2, 2);
        t.feed(b"\x1b[2;1Hab\x1b[1;1H\x1b[2L");
        assert_eq!(text(&t), ["  ", "  "]);
    }

    #[test]
    fn test_insert_lines_outside_region_is_noop() {
        let mut t = Emulator::new(1, 4);
        t.feed(b"a\r\nb\r\nc\r\nd\x1b[2;3r\x1b[4;1H\x1b[L");
        assert_eq!(text(&t), ["a", "b", "c", "d"]);
        t.feed(b"\x1b[2;1H\x1b[M");
        assert_eq!(text(&t), ["a", "c", " ", "d"]);
    }

    #[test]
    fn test_delete_chars_sequence() {
        let mut t = Emulator::new(4, 1);
        t.feed(b"abcd");
        assert_eq!(cursor(&t), (0, 3));

        t.feed(b"\x1b[1P");
        assert_eq!(text(&t), ["abc "]);
        t.feed(b"\x1b[2P");
        assert_eq!(text(&t), ["abc "]);

        t.feed(b"d\x1b[2G\x1b[2P");
        assert_eq!(text(&t), ["ad  "]);
    }

    #[test]
    fn test_delete_chars_keeps_background() {
        let mut t = Emulator::new(3, 1);
        t.feed(b"abc\x1b[1G\x1b[44m\x1b[P");
        let cell = t.state().grid().cell(0, 2);
        assert_eq!(cell.ch, '\0');
        assert_eq!(cell.attrs.bg, Color::Indexed(4));
    }

    #[test]
    fn test_cursor_up_zero_clamps_at_top() {
        let mut t = Emulator::new(2, 2);
        t.feed(b"\x1b[2;2H\x1b[0A");
        assert_eq!(cursor(&t), (0, 1));
        t.feed(b"\x1b[0A");
        assert_eq!(cursor(&t), (0, 1));
    }

    #[test]
    fn test_cursor_moves_clamp_to_margins() {
        let mut t = Emulator::new(5, 6);
        t.feed(b"\x1b[2;4r\x1b[3;1H\x1b[10B");
        assert_eq!(cursor(&t), (3, 0));
        t.feed(b"\x1b[10A");
        assert_eq!(cursor(&t), (1, 0));
        t.feed(b"\x1b[10C");
        assert_eq!(cursor(&t), (1, 4));
    }

    #[test]
    fn test_absolute_positioning_clamps_to_grid() {
        let mut t = Emulator::new(5, 3);
        t.feed(b"\x1b[99;99H");
        assert_eq!(cursor(&t), (2, 4));
        t.feed(b"\x1b[2d\x1b[3G");
        assert_eq!(cursor(&t), (1, 2));
        t.feed(b"\x1b[H");
        assert_eq!(cursor(&t), (0, 0));
    }

    #[test]
    fn test_relative_positioning_clamps_to_grid() {
        let mut t = Emulator::new(5, 4);
        t.feed(b"\x1b[2;2H\x1b[9e");
        assert_eq!(cursor(&t), (3, 1));
        t.feed(b"\x1b[9a");
        assert_eq!(cursor(&t), (3, 4));
        t.feed(b"\x1b[1;1H\x1b[e\x1b[2a");
        assert_eq!(cursor(&t), (1, 2));
    }

    #[test]
    fn test_row_relative_ignores_scroll_region() {
        let mut t = Emulator::new(10, 5);
        t.feed(b"\x1b[2;3r\x1b[2;1H\x1b[5e");
        assert_eq!(cursor(&t), (4, 0));
        // CUD still stops at the region bottom
        t.feed(b"\x1b[2;1H\x1b[5B");
        assert_eq!(cursor(&t), (2, 0));
    }

    #[test]
    fn test_relative_moves_clear_pending_wrap() {
        let mut t = Emulator::new(3, 3);
        t.feed(b"abc\x1b[e");
        assert!(!t.state().cursor().pending_wrap);
        t.feed(b"x");
        assert_eq!(text(&t), ["abc", "  x", "   "]);
    }

    #[test]
    fn test_origin_mode_positioning() {
        let mut t = Emulator::new(5, 6);
        t.feed(b"\x1b[3;5r\x1b[?6h");
        assert_eq!(cursor(&t), (2, 0));
        t.feed(b"\x1b[2;1H");
        assert_eq!(cursor(&t), (3, 0));
        t.feed(b"\x1b[9;1H");
        assert_eq!(cursor(&t), (4, 0));
        t.feed(b"\x1b[6n");
        assert_eq!(t.take_replies(), b"\x1b[3;1R");
    }

    #[test]
    fn test_scroll_region_homes_cursor() {
        let mut t = Emulator::new(4, 5);
        t.feed(b"\x1b[3;3H\x1b[2;4r");
        assert_eq!(cursor(&t), (0, 0));
        let m = t.state().margins();
        assert_eq!((m.top, m.bottom), (1, 3));
        // Invalid regions are ignored
        t.feed(b"\x1b[3;3H\x1b[4;2r");
        assert_eq!(cursor(&t), (2, 2));
        assert_eq!((t.state().margins().top, t.state().margins().bottom), (1, 3));
    }

    #[test]
    fn test_single_row_scroll_region() {
        let mut t = Emulator::new(3, 5);
        t.feed(b"\x1b[3;3r");
        let m = t.state().margins();
        assert_eq!((m.top, m.bottom), (2, 2));
        t.feed(b"\x1b[3;1Hab\n");
        assert_eq!(text(&t), ["   ", "   ", "   ", "   ", "   "]);
        assert_eq!(cursor(&t), (2, 2));
    }

    #[test]
    fn test_sgr_bold_then_normal_intensity() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[31;44m\x1b[1m\x1b[22m");
        let attrs = &t.state().cursor().attrs;
        assert_eq!(attrs.flags, CellAttrs::default().flags);
        assert_eq!(attrs.fg, Color::Indexed(1));
        assert_eq!(attrs.bg, Color::Indexed(4));

        t.feed(b"\x1b[2m\x1b[22m");
        assert!(t.state().cursor().attrs.flags.is_empty());
    }

    #[test]
    fn test_sgr_colors() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[91;102m");
        let attrs = &t.state().cursor().attrs;
        assert_eq!(attrs.fg, Color::Indexed(9));
        assert_eq!(attrs.bg, Color::Indexed(10));

        t.feed(b"\x1b[38;5;208;48;2;1;2;3m");
        let attrs = &t.state().cursor().attrs;
        assert_eq!(attrs.fg, Color::Indexed(208));
        assert_eq!(attrs.bg, Color::Rgb(1, 2, 3));

        t.feed(b"\x1b[38:2::10:20:30m");
        assert_eq!(t.state().cursor().attrs.fg, Color::Rgb(10, 20, 30));

        t.feed(b"\x1b[39;49m");
        let attrs = &t.state().cursor().attrs;
        assert_eq!((attrs.fg, attrs.bg), (Color::Default, Color::Default));
    }

    #[test]
    fn test_sgr_out_of_range_color_saturates() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[38;5;300;48;2;256;7;1000m");
        let attrs = &t.state().cursor().attrs;
        assert_eq!(attrs.fg, Color::Indexed(255));
        assert_eq!(attrs.bg, Color::Rgb(255, 7, 255));
    }

    #[test]
    fn test_sgr_truncated_extended_color_aborts_rest() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[1;38;2;5m");
        let attrs = &t.state().cursor().attrs;
        assert!(attrs.flags.contains(AttrFlags::BOLD));
        assert_eq!(attrs.fg, Color::Default);

        t.feed(b"\x1b[0m\x1b[38;7;4m");
        assert!(!t.state().cursor().attrs.flags.contains(AttrFlags::UNDERLINE));
    }

    #[test]
    fn test_sgr_reset() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[1;3;4;7;32m\x1b[m");
        assert_eq!(t.state().cursor().attrs, CellAttrs::default());
    }

    #[test]
    fn test_erase_in_line_keeps_background() {
        let mut t = Emulator::new(4, 1);
        t.feed(b"abcd\x1b[2G\x1b[1;45m\x1b[K");
        assert_eq!(text(&t), ["a   "]);
        let cell = t.state().grid().cell(0, 3);
        assert_eq!(cell.attrs.bg, Color::Indexed(5));
        assert!(cell.attrs.flags.is_empty());

        t.feed(b"\x1b[2K");
        assert_eq!(text(&t), ["    "]);
    }

    #[test]
    fn test_erase_in_display() {
        let mut t = Emulator::new(2, 3);
        t.feed(b"ab\r\ncd\r\nef\x1b[2;1H\x1b[J");
        assert_eq!(text(&t), ["ab", "  ", "  "]);

        let mut t = Emulator::new(2, 3);
        t.feed(b"ab\r\ncd\r\nef\x1b[2;1H\x1b[1J");
        assert_eq!(text(&t), ["  ", " d", "ef"]);
    }

    #[test]
    fn test_erase_scrollback() {
        let mut t = Emulator::new(1, 1);
        t.feed(b"a\nb\nc");
        assert_eq!(t.state().scrollback_len(), 2);
        t.feed(b"\x1b[3J");
        assert_eq!(t.state().scrollback_len(), 0);
    }

    #[test]
    fn test_selective_erase_spares_protected_cells() {
        let mut t = Emulator::new(4, 1);
        t.feed(b"a\x1b[1\"qbc\x1b[0\"qd\x1b[1G\x1b[?K");
        assert_eq!(text(&t), [" bc "]);
        t.feed(b"\x1b[K");
        assert_eq!(text(&t), ["    "]);
    }

    #[test]
    fn test_erase_chars_does_not_move_cursor() {
        let mut t = Emulator::new(5, 1);
        t.feed(b"abcde\x1b[2G\x1b[2X");
        assert_eq!(text(&t), ["a  de"]);
        assert_eq!(cursor(&t), (0, 1));
        t.feed(b"\x1b[99X");
        assert_eq!(text(&t), ["a    "]);
    }

    #[test]
    fn test_repeat_last_glyph() {
        let mut t = Emulator::new(5, 2);
        t.feed(b"x\x1b[3b");
        assert_eq!(text(&t), ["xxxx ", "     "]);
        t.feed(b"\x1b[9999999b");
        assert_eq!(cursor(&t).0, 1);
    }

    #[test]
    fn test_tab_stop_controls() {
        let mut t = Emulator::new(20, 1);
        t.feed(b"\x1b[3g\x1b[5G\x1bH\x1b[1G\t");
        assert_eq!(cursor(&t), (0, 4));
        t.feed(b"\x1b[Z");
        assert_eq!(cursor(&t), (0, 0));
        t.feed(b"\x1b[5G\x1b[g\x1b[1G\x1b[I");
        assert_eq!(cursor(&t), (0, 19));
    }

    #[test]
    fn test_scroll_up_and_down() {
        let mut t = Emulator::new(1, 3);
        t.feed(b"a\r\nb\r\nc\x1b[S");
        assert_eq!(text(&t), ["b", "c", " "]);
        t.feed(b"\x1b[2T");
        assert_eq!(text(&t), [" ", " ", "b"]);
        // Mouse highlight form is ignored
        t.feed(b"\x1b[1;1;1;1;1T");
        assert_eq!(text(&t), [" ", " ", "b"]);
    }

    #[test]
    fn test_device_attribute_replies() {
        let mut t = Emulator::new(4, 4);
        t.feed(b"\x1b[c\x1b[>c\x1b[5n\x1b[2;3H\x1b[6n\x1b[?6n");
        assert_eq!(
            t.take_replies(),
            b"\x1b[?62;22c\x1b[>1;10;0c\x1b[0n\x1b[2;3R\x1b[?2;3R".to_vec()
        );
        assert!(t.take_replies().is_empty());
    }

    #[test]
    fn test_modes() {
        let mut t = Emulator::new(4, 4);
        t.feed(b"\x1b[?1h\x1b[?25l\x1b[?2004h\x1b[?1002h\x1b[?1006h\x1b[4h");
        let modes = t.state().modes();
        assert!(modes.application_cursor);
        assert!(!modes.cursor_visible);
        assert!(modes.bracketed_paste);
        assert!(modes.insert_mode);
        assert_eq!(modes.mouse, MouseMode::ButtonEvent);
        assert_eq!(modes.mouse_encoding, MouseEncoding::Sgr);

        t.feed(b"\x1b[?1000l");
        assert_eq!(t.state().modes().mouse, MouseMode::ButtonEvent);
        t.feed(b"\x1b[?1002l\x1b[?1006l");
        assert_eq!(t.state().modes().mouse, MouseMode::None);
        assert_eq!(t.state().modes().mouse_encoding, MouseEncoding::Default);
    }

    #[test]
    fn test_insert_mode_shifts_line() {
        let mut t = Emulator::new(4, 1);
        t.feed(b"abc\x1b[1G\x1b[4hx");
        assert_eq!(text(&t), ["xabc"]);
    }

    #[test]
    fn test_cursor_shape() {
        let mut t = Emulator::new(2, 1);
        t.feed(b"\x1b[6 q");
        assert_eq!(t.state().cursor().shape, CursorShape::SteadyBar);
        t.feed(b"\x1b[ q");
        assert_eq!(t.state().cursor().shape, CursorShape::Default);
    }

    #[test]
    fn test_soft_reset() {
        let mut t = Emulator::new(3, 3);
        t.feed(b"\x1b[2;3r\x1b[?6h\x1b[1m\x1b[!p");
        let state = t.state();
        assert!(!state.modes().origin_mode);
        assert!(state.cursor().attrs.flags.is_empty());
        assert_eq!((state.margins().top, state.margins().bottom), (0, 2));
    }

    #[test]
    fn test_next_and_previous_line() {
        let mut t = Emulator::new(4, 4);
        t.feed(b"\x1b[2;3H\x1b[2E");
        assert_eq!(cursor(&t), (3, 0));
        t.feed(b"\x1b[3;3H\x1b[F");
        assert_eq!(cursor(&t), (1, 0));
    }

    fn line(cols: usize) -> impl Strategy<Value = String> {
        proptest::collection::vec(proptest::char::range('a', 'z'), cols)
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn test_insert_chars_never_moves_cells_left(
            content in line(8),
            col in 0usize..8,
            n in 0u32..12,
        ) {
            let mut t = Emulator::new(8, 1);
            t.feed(content.as_bytes());
            t.feed(format!("\x1b[{}G\x1b[{}@", col + 1, n).as_bytes());
            let n = (n.max(1) as usize).min(8 - col);
            let row = t.state().grid().row_text(0);
            let expected: String = content[..col]
                .chars()
                .chain(std::iter::repeat(' ').take(n))
                .chain(content[col..8 - n].chars())
                .collect();
            prop_assert_eq!(row, expected);
            prop_assert_eq!(t.state().cursor().col, col);
        }

        #[test]
        fn test_delete_chars_pulls_tail_left(
            content in line(8),
            col in 0usize..8,
            n in 0u32..12,
        ) {
            let mut t = Emulator::new(8, 1);
            t.feed(content.as_bytes());
            t.feed(format!("\x1b[{}G\x1b[{}P", col + 1, n).as_bytes());
            let n = (n.max(1) as usize).min(8 - col);
            let row = t.state().grid().row_text(0);
            let expected: String = content[..col]
                .chars()
                .chain(content[col + n..].chars())
                .chain(std::iter::repeat(' ').take(n))
                .collect();
            prop_assert_eq!(row, expected);
        }

        #[test]
        fn test_erase_chars_stays_in_row(
            content in line(6),
            col in 0usize..6,
            n in 0u32..20,
        ) {
            let mut t = Emulator::new(6, 1);
            t.feed(content.as_bytes());
            t.feed(format!("\x1b[{}G\x1b[{}X", col + 1, n).as_bytes());
            let n = (n.max(1) as usize).min(6 - col);
            let row = t.state().grid().row_text(0);
            let expected: String = content[..col]
                .chars()
                .chain(std::iter::repeat(' ').take(n))
                .chain(content[col + n..].chars())
                .collect();
            prop_assert_eq!(row, expected);
        }

        #[test]
        fn test_insert_delete_lines_respect_region(
            top in 0usize..5,
            height in 1usize..5,
            row in 0usize..6,
            n in 0u32..8,
            insert in any::<bool>(),
        ) {
            let rows = 6;
            let bottom = (top + height).min(rows - 1);
            let mut t = Emulator::new(1, rows);
            t.feed(b"a\r\nb\r\nc\r\nd\r\ne\r\nf");
            let before = text(&t);
            let op = if insert { 'L' } else { 'M' };
            t.feed(format!("\x1b[{};{}r\x1b[{};1H\x1b[{}{}", top + 1, bottom + 1, row + 1, n, op).as_bytes());
            let after = text(&t);

            for r in (0..top).chain(bottom + 1..rows) {
                prop_assert_eq!(&after[r], &before[r]);
            }
            if row < top || row > bottom {
                prop_assert_eq!(after, before);
            } else {
                let n = (n.max(1) as usize).min(bottom - row + 1);
                let blanks: Vec<usize> = if insert {
                    (row..row + n).collect()
                } else {
                    (bottom + 1 - n..=bottom).collect()
                };
                for r in blanks {
                    prop_assert_eq!(after[r].as_str(), " ");
                }
            }
        }
    }
}
