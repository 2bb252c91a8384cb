//! Key mapping for terminal input
//!
//! Converts key, mouse and paste input to the byte sequences a child expects,
//! honouring the modes it negotiated (cursor keys, mouse tracking, bracketed
//! paste).

use crate::core::term::{MouseEncoding, MouseMode, TerminalModes};
use crate::event::{KeyCode, KeyInput, Modifiers, MouseButton, MouseInput, MouseKind};

/// Key mapper for converting input events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Map a key press to bytes for the pty
    pub fn map(event: &KeyInput, modes: &TerminalModes) -> Option<Vec<u8>> {
        let mods = event.mods;

        match event.code {
            // Character keys
            KeyCode::Char(ch) => Some(Self::map_char(ch, mods)),

            // Enter
            KeyCode::Enter => {
                if modes.linefeed_newline {
                    Some(vec![0x0D, 0x0A])
                } else {
                    Some(vec![0x0D])
                }
            }

            // Backspace
            KeyCode::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    Some(vec![0x1B, 0x7F])
                } else {
                    Some(vec![0x7F])
                }
            }

            // Tab
            KeyCode::Tab => {
                if mods.contains(Modifiers::SHIFT) {
                    Some(b"\x1b[Z".to_vec())
                } else {
                    Some(vec![0x09])
                }
            }
            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),

            KeyCode::Esc => Some(vec![0x1B]),

            // Arrow keys
            KeyCode::Up => Some(Self::arrow_key(b'A', mods, modes)),
            KeyCode::Down => Some(Self::arrow_key(b'B', mods, modes)),
            KeyCode::Right => Some(Self::arrow_key(b'C', mods, modes)),
            KeyCode::Left => Some(Self::arrow_key(b'D', mods, modes)),

            // Navigation keys
            KeyCode::Home => Some(Self::special_key(b'H', mods, modes)),
            KeyCode::End => Some(Self::special_key(b'F', mods, modes)),
            KeyCode::PageUp => Some(Self::tilde_key(5, mods)),
            KeyCode::PageDown => Some(Self::tilde_key(6, mods)),
            KeyCode::Insert => Some(Self::tilde_key(2, mods)),
            KeyCode::Delete => Some(Self::tilde_key(3, mods)),

            // Function keys
            KeyCode::F(n) => {
                let bytes = Self::function_key(n, mods);
                (!bytes.is_empty()).then_some(bytes)
            }
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        if ctrl {
            if let Some(code) = Self::control_code(ch) {
                return if alt { vec![0x1B, code] } else { vec![code] };
            }
        }

        // Alt + key = ESC + key
        let mut bytes = Vec::with_capacity(5);
        if alt {
            bytes.push(0x1B);
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        bytes
    }

    /// C0 code for Ctrl + `ch`
    fn control_code(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1B),
            '\\' | '4' => Some(0x1C),
            ']' | '5' => Some(0x1D),
            '^' | '~' | '6' => Some(0x1E),
            '_' | '?' | '7' => Some(0x1F),
            _ => None,
        }
    }

    /// Arrow key sequence
    fn arrow_key(key: u8, mods: Modifiers, modes: &TerminalModes) -> Vec<u8> {
        if !mods.is_empty() {
            // With modifiers: ESC [ 1 ; <mod> <key>
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
        } else if modes.application_cursor {
            vec![0x1B, b'O', key]
        } else {
            vec![0x1B, b'[', key]
        }
    }

    /// Home / End, which follow the cursor key mode like the arrows
    fn special_key(key: u8, mods: Modifiers, modes: &TerminalModes) -> Vec<u8> {
        Self::arrow_key(key, mods, modes)
    }

    /// Tilde key sequence (PageUp, PageDown, Insert, Delete)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[{};{}~", code, mod_code).into_bytes()
        }
    }

    /// Function key sequence
    fn function_key(n: u8, mods: Modifiers) -> Vec<u8> {
        let mod_code = Self::modifier_code(mods);
        match n {
            1..=4 => {
                let key = b"PQRS"[n as usize - 1] as char;
                if mods.is_empty() {
                    format!("\x1bO{}", key).into_bytes()
                } else {
                    format!("\x1b[1;{}{}", mod_code, key).into_bytes()
                }
            }
            5..=12 => {
                let code = [15, 17, 18, 19, 20, 21, 23, 24][n as usize - 5];
                if mods.is_empty() {
                    format!("\x1b[{}~", code).into_bytes()
                } else {
                    format!("\x1b[{};{}~", code, mod_code).into_bytes()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Calculate xterm modifier code
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }

    /// Encode a mouse event (coordinates relative to the pane) in the mode
    /// and encoding the child asked for. Returns `None` when the child did
    /// not ask for this kind of event or it cannot be encoded.
    pub fn encode_mouse(event: &MouseInput, modes: &TerminalModes) -> Option<Vec<u8>> {
        let wanted = match (modes.mouse, event.kind) {
            (MouseMode::None, _) => false,
            (MouseMode::X10, MouseKind::Down(_)) => true,
            (MouseMode::X10, _) => false,
            (_, MouseKind::Down(_) | MouseKind::Up(_)) => true,
            (_, MouseKind::ScrollUp | MouseKind::ScrollDown) => true,
            (MouseMode::ButtonEvent | MouseMode::AnyEvent, MouseKind::Drag(_)) => true,
            (MouseMode::AnyEvent, MouseKind::Moved) => true,
            _ => false,
        };
        if !wanted {
            return None;
        }

        let (button, pressed) = match event.kind {
            MouseKind::Down(btn) => (Self::mouse_button_code(btn), true),
            MouseKind::Up(btn) => (Self::mouse_button_code(btn), false),
            MouseKind::Drag(btn) => (Self::mouse_button_code(btn) + 32, true),
            MouseKind::Moved => (35, true),
            MouseKind::ScrollUp => (64, true),
            MouseKind::ScrollDown => (65, true),
        };

        // X10 reports carry no modifiers
        let mut cb = button;
        if modes.mouse != MouseMode::X10 {
            if event.mods.contains(Modifiers::SHIFT) {
                cb += 4;
            }
            if event.mods.contains(Modifiers::ALT) {
                cb += 8;
            }
            if event.mods.contains(Modifiers::CTRL) {
                cb += 16;
            }
        }

        // 1-based coordinates for terminal protocol
        let x = u32::from(event.col) + 1;
        let y = u32::from(event.row) + 1;

        match modes.mouse_encoding {
            MouseEncoding::Sgr => {
                let suffix = if pressed { 'M' } else { 'm' };
                Some(format!("\x1b[<{};{};{}{}", cb, x, y, suffix).into_bytes())
            }
            MouseEncoding::Utf8 => {
                // Releases are button 3 in the legacy encodings
                let cb = if pressed { cb } else { 3 | (cb & !3) };
                let mut bytes = b"\x1b[M".to_vec();
                for value in [u32::from(cb) + 32, x + 32, y + 32] {
                    let ch = char::from_u32(value)?;
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                Some(bytes)
            }
            MouseEncoding::Default => {
                // Only coordinates up to 223 fit in one byte
                if x > 223 || y > 223 {
                    return None;
                }
                let cb = if pressed { cb } else { 3 | (cb & !3) };
                Some(vec![0x1b, b'[', b'M', cb + 32, x as u8 + 32, y as u8 + 32])
            }
        }
    }

    /// Convert a mouse button to its protocol code
    fn mouse_button_code(button: MouseButton) -> u8 {
        match button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }

    /// Wrap pasted text in bracketed paste markers when the child enabled them.
    pub fn encode_paste(text: &str, modes: &TerminalModes) -> Vec<u8> {
        if modes.bracketed_paste {
            // A paste must not be able to end the bracket early.
            let body = text.replace("\x1b[201~", "");
            let mut bytes = Vec::with_capacity(body.len() + 12);
            bytes.extend_from_slice(b"\x1b[200~");
            bytes.extend_from_slice(body.as_bytes());
            bytes.extend_from_slice(b"\x1b[201~");
            bytes
        } else {
            text.replace("\r\n", "\r").replace('\n', "\r").into_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, mods: Modifiers) -> KeyInput {
        KeyInput::new(code, mods)
    }

    fn mouse(kind: MouseKind, col: u16, row: u16) -> MouseInput {
        MouseInput {
            kind,
            col,
            row,
            mods: Modifiers::empty(),
        }
    }

    fn modes(mouse: MouseMode, encoding: MouseEncoding) -> TerminalModes {
        TerminalModes {
            mouse,
            mouse_encoding: encoding,
            ..TerminalModes::default()
        }
    }

    #[test]
    fn test_char_keys() {
        let modes = TerminalModes::default();

        assert_eq!(KeyMapper::map(&key(KeyCode::Char('a'), Modifiers::empty()), &modes), Some(b"a".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('c'), Modifiers::CTRL), &modes), Some(vec![0x03]));
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('x'), Modifiers::ALT), &modes), Some(vec![0x1B, b'x']));
        assert_eq!(
            KeyMapper::map(&key(KeyCode::Char('a'), Modifiers::CTRL | Modifiers::ALT), &modes),
            Some(vec![0x1B, 0x01])
        );
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('é'), Modifiers::empty()), &modes), Some("é".as_bytes().to_vec()));
    }

    #[test]
    fn test_arrow_keys() {
        let mut modes = TerminalModes::default();

        assert_eq!(KeyMapper::map(&key(KeyCode::Up, Modifiers::empty()), &modes), Some(b"\x1b[A".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::Up, Modifiers::CTRL), &modes), Some(b"\x1b[1;5A".to_vec()));

        modes.application_cursor = true;
        assert_eq!(KeyMapper::map(&key(KeyCode::Left, Modifiers::empty()), &modes), Some(b"\x1bOD".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::Home, Modifiers::empty()), &modes), Some(b"\x1bOH".to_vec()));
    }

    #[test]
    fn test_function_keys() {
        let modes = TerminalModes::default();

        assert_eq!(KeyMapper::map(&key(KeyCode::F(1), Modifiers::empty()), &modes), Some(b"\x1bOP".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::F(5), Modifiers::empty()), &modes), Some(b"\x1b[15~".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::F(2), Modifiers::SHIFT), &modes), Some(b"\x1b[1;2Q".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::F(12), Modifiers::CTRL), &modes), Some(b"\x1b[24;5~".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::F(20), Modifiers::empty()), &modes), None);
    }

    #[test]
    fn test_enter_follows_newline_mode() {
        let mut modes = TerminalModes::default();
        assert_eq!(KeyMapper::map(&key(KeyCode::Enter, Modifiers::empty()), &modes), Some(vec![0x0D]));
        modes.linefeed_newline = true;
        assert_eq!(KeyMapper::map(&key(KeyCode::Enter, Modifiers::empty()), &modes), Some(vec![0x0D, 0x0A]));
    }

    #[test]
    fn test_mouse_not_requested() {
        let modes = TerminalModes::default();
        assert_eq!(KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Left), 0, 0), &modes), None);
    }

    #[test]
    fn test_mouse_encoding_x10() {
        let modes = modes(MouseMode::Normal, MouseEncoding::Default);
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Left), 0, 0), &modes),
            Some(vec![0x1b, b'[', b'M', 32, 33, 33])
        );
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Right), 10, 5), &modes),
            Some(vec![0x1b, b'[', b'M', 34, 43, 38])
        );
        // Release is reported as button 3
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::Up(MouseButton::Left), 0, 0), &modes),
            Some(vec![0x1b, b'[', b'M', 35, 33, 33])
        );
        assert_eq!(KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Left), 300, 0), &modes), None);
    }

    #[test]
    fn test_mouse_encoding_sgr() {
        let modes = modes(MouseMode::Normal, MouseEncoding::Sgr);
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Left), 0, 0), &modes),
            Some(b"\x1b[<0;1;1M".to_vec())
        );
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::Up(MouseButton::Left), 10, 20), &modes),
            Some(b"\x1b[<0;11;21m".to_vec())
        );
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::ScrollUp, 5, 5), &modes),
            Some(b"\x1b[<64;6;6M".to_vec())
        );
        assert_eq!(
            KeyMapper::encode_mouse(&mouse(MouseKind::ScrollDown, 5, 5), &modes),
            Some(b"\x1b[<65;6;6M".to_vec())
        );
    }

    #[test]
    fn test_mouse_encoding_utf8_large_coordinates() {
        let modes = modes(MouseMode::Normal, MouseEncoding::Utf8);
        let bytes = KeyMapper::encode_mouse(&mouse(MouseKind::Down(MouseButton::Left), 299, 0), &modes).unwrap();
        let mut expected = b"\x1b[M ".to_vec();
        expected.extend_from_slice("\u{14c}".as_bytes());
        expected.push(b'!');
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_mouse_mode_filters() {
        let drag = mouse(MouseKind::Drag(MouseButton::Left), 1, 1);
        let moved = mouse(MouseKind::Moved, 1, 1);
        let release = mouse(MouseKind::Up(MouseButton::Left), 1, 1);

        let x10 = modes(MouseMode::X10, MouseEncoding::Sgr);
        assert!(KeyMapper::encode_mouse(&release, &x10).is_none());

        let normal = modes(MouseMode::Normal, MouseEncoding::Sgr);
        assert!(KeyMapper::encode_mouse(&release, &normal).is_some());
        assert!(KeyMapper::encode_mouse(&drag, &normal).is_none());

        let button = modes(MouseMode::ButtonEvent, MouseEncoding::Sgr);
        assert_eq!(KeyMapper::encode_mouse(&drag, &button), Some(b"\x1b[<32;2;2M".to_vec()));
        assert!(KeyMapper::encode_mouse(&moved, &button).is_none());

        let any = modes(MouseMode::AnyEvent, MouseEncoding::Sgr);
        assert_eq!(KeyMapper::encode_mouse(&moved, &any), Some(b"\x1b[<35;2;2M".to_vec()));
    }

    #[test]
    fn test_paste() {
        let mut modes = TerminalModes::default();
        assert_eq!(KeyMapper::encode_paste("a\nb", &modes), b"a\rb".to_vec());
        modes.bracketed_paste = true;
        assert_eq!(KeyMapper::encode_paste("a\nb", &modes), b"\x1b[200~a\nb\x1b[201~".to_vec());
    }
}
