//! VT sequence parser
//!
//! A byte-fed implementation of the DEC VT500-series state diagram. The
//! parser knows nothing about screens: it turns a byte stream into
//! [`Sequence`] values which [`super::TerminalState`] then applies.
//!
//! The transition table is the pure function [`transition`]. Everything
//! mutable (intermediates, raw parameters, the OSC payload, a partial UTF-8
//! character) lives in one [`Parser`] per stream.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

const MAX_INTERMEDIATES: usize = 4;
const MAX_PARAM_BYTES: usize = 1024;
const MAX_OSC_BYTES: usize = 64 * 1024;

const CAN: char = '\u{18}';
const SUB: char = '\u{1a}';
const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';
const ST: char = '\u{9c}';

/// One decoded unit of terminal output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sequence {
    Print(char),
    C0(u8),
    Esc {
        final_byte: u8,
        intermediates: Vec<u8>,
    },
    Csi {
        final_byte: u8,
        intermediates: Vec<u8>,
        params: Vec<u32>,
    },
    Osc {
        payload: String,
    },
    Dcs {
        final_byte: u8,
        intermediates: Vec<u8>,
        params: Vec<u32>,
    },
    DcsData(u8),
    DcsEnd,
    /// A malformed numeric parameter; the parser is back in ground state
    ParseError(String),
    Eof,
}

/// Parser states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsIgnore,
    DcsPassthrough,
    OscString,
    SosPmApc,
}

/// Action attached to a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Ignore,
    Print,
    Execute,
    Clear,
    Collect,
    Param,
    EscDispatch,
    CsiDispatch,
    Put,
    OscPut,
}

fn is_c0(c: u32) -> bool {
    c <= 0x17 || c == 0x19 || (0x1c..=0x1f).contains(&c)
}

/// The state diagram: where `c` leads from `state`, and what to do on the way.
///
/// Entry and exit actions (clear, OSC start/end, DCS hook/unhook) are not
/// part of the table; the parser runs them whenever the state changes.
pub fn transition(state: State, c: char) -> (State, Action) {
    // Anywhere transitions
    match c {
        CAN | SUB => return (State::Ground, Action::Execute),
        ESC => return (State::Escape, Action::Clear),
        _ => {}
    }

    let b = c as u32;
    match state {
        State::Ground => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x7f..=0x9f => (state, Action::Ignore),
            _ => (state, Action::Print),
        },
        State::Escape => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x20..=0x2f => (State::EscapeIntermediate, Action::Collect),
            0x50 => (State::DcsEntry, Action::None),
            0x58 | 0x5e | 0x5f => (State::SosPmApc, Action::None),
            0x5b => (State::CsiEntry, Action::None),
            0x5d => (State::OscString, Action::None),
            0x30..=0x7e => (State::Ground, Action::EscDispatch),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::EscapeIntermediate => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x20..=0x2f => (state, Action::Collect),
            0x30..=0x7e => (State::Ground, Action::EscDispatch),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::CsiEntry => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x20..=0x2f => (State::CsiIntermediate, Action::Collect),
            0x30..=0x3b => (State::CsiParam, Action::Param),
            0x3c..=0x3f => (State::CsiParam, Action::Collect),
            0x40..=0x7e => (State::Ground, Action::CsiDispatch),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::CsiParam => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x30..=0x3b => (state, Action::Param),
            0x3c..=0x3f => (State::CsiIgnore, Action::None),
            0x20..=0x2f => (State::CsiIntermediate, Action::Collect),
            0x40..=0x7e => (State::Ground, Action::CsiDispatch),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::CsiIntermediate => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x20..=0x2f => (state, Action::Collect),
            0x30..=0x3f => (State::CsiIgnore, Action::None),
            0x40..=0x7e => (State::Ground, Action::CsiDispatch),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::CsiIgnore => match b {
            _ if is_c0(b) => (state, Action::Execute),
            0x20..=0x3f | 0x7f => (state, Action::Ignore),
            0x40..=0x7e => (State::Ground, Action::None),
            _ => (State::Ground, Action::None),
        },
        State::DcsEntry => match b {
            _ if is_c0(b) => (state, Action::Ignore),
            0x20..=0x2f => (State::DcsIntermediate, Action::Collect),
            0x3a => (State::DcsIgnore, Action::None),
            0x30..=0x39 | 0x3b => (State::DcsParam, Action::Param),
            0x3c..=0x3f => (State::DcsParam, Action::Collect),
            0x40..=0x7e => (State::DcsPassthrough, Action::None),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::DcsParam => match b {
            _ if is_c0(b) => (state, Action::Ignore),
            0x30..=0x39 | 0x3b => (state, Action::Param),
            0x3a | 0x3c..=0x3f => (State::DcsIgnore, Action::None),
            0x20..=0x2f => (State::DcsIntermediate, Action::Collect),
            0x40..=0x7e => (State::DcsPassthrough, Action::None),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::DcsIntermediate => match b {
            _ if is_c0(b) => (state, Action::Ignore),
            0x20..=0x2f => (state, Action::Collect),
            0x30..=0x3f => (State::DcsIgnore, Action::None),
            0x40..=0x7e => (State::DcsPassthrough, Action::None),
            0x7f => (state, Action::Ignore),
            _ => (State::Ground, Action::None),
        },
        State::DcsPassthrough => match b {
            0x9c => (State::Ground, Action::None),
            0x7f => (state, Action::Ignore),
            _ => (state, Action::Put),
        },
        State::DcsIgnore | State::SosPmApc => match b {
            0x9c => (State::Ground, Action::None),
            _ => (state, Action::Ignore),
        },
        State::OscString => match c {
            BEL | ST => (State::Ground, Action::None),
            _ if b < 0x20 || b == 0x7f => (state, Action::Ignore),
            _ => (state, Action::OscPut),
        },
    }
}

/// Split raw CSI parameter text into integers.
///
/// Colon sub-parameters are normalized so SGR sees a flat list: two
/// elements keep only the first (`4:3` underline style), five are kept, and
/// six drop the color-space id at index 2 (`38:2::r:g:b`). Other colon
/// lists are dropped.
fn parse_params(raw: &str, colons: bool) -> Result<Vec<u32>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let mut fields: Vec<&str> = Vec::new();
    for field in raw.split(';') {
        if !colons || !field.contains(':') {
            fields.push(field);
            continue;
        }
        let sub: Vec<&str> = field.split(':').collect();
        match sub.len() {
            2 => fields.push(sub[0]),
            5 => fields.extend(sub),
            6 => fields.extend(
                sub.iter()
                    .enumerate()
                    .filter(|(i, _)| *i != 2)
                    .map(|(_, s)| *s),
            ),
            _ => {}
        }
    }

    fields
        .into_iter()
        .map(|field| {
            if field.is_empty() {
                Ok(0)
            } else {
                field
                    .parse::<u32>()
                    .map_err(|e| format!("invalid parameter {:?}: {}", field, e))
            }
        })
        .collect()
}

/// Incremental UTF-8 decoder. Bytes that do not form valid UTF-8 come out
/// one by one as the character with the same value.
#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    fn push(&mut self, byte: u8, out: &mut impl FnMut(char)) {
        if self.need > 0 {
            if byte & 0xc0 == 0x80 {
                self.buf[self.len] = byte;
                self.len += 1;
                if self.len == self.need {
                    match std::str::from_utf8(&self.buf[..self.len]) {
                        Ok(s) => s.chars().for_each(&mut *out),
                        Err(_) => self.buf[..self.len].iter().for_each(|&b| out(b as char)),
                    }
                    self.len = 0;
                    self.need = 0;
                }
                return;
            }
            self.flush(out);
        }

        let need = match byte {
            0x00..=0x7f => {
                out(byte as char);
                return;
            }
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => {
                out(byte as char);
                return;
            }
        };
        self.buf[0] = byte;
        self.len = 1;
        self.need = need;
    }

    /// Deliver a truncated sequence as raw bytes.
    fn flush(&mut self, out: &mut impl FnMut(char)) {
        for &b in &self.buf[..self.len] {
            out(b as char);
        }
        self.len = 0;
        self.need = 0;
    }
}

#[derive(Default)]
struct Scratch {
    intermediates: Vec<u8>,
    params: String,
    osc: String,
    has_colon: bool,
}

impl Scratch {
    fn clear(&mut self) {
        self.intermediates.clear();
        self.params.clear();
        self.has_colon = false;
    }
}

/// Parser state machine
#[derive(Default)]
pub struct Parser {
    state: State,
    scratch: Scratch,
    utf8: Utf8Decoder,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feed bytes, handing every completed sequence to `sink`.
    pub fn advance(&mut self, bytes: &[u8], sink: &mut impl FnMut(Sequence)) {
        let Self { state, scratch, utf8 } = self;
        for &byte in bytes {
            utf8.push(byte, &mut |c| step(state, scratch, c, sink));
        }
    }

    /// Feed bytes and collect the resulting sequences.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Sequence> {
        let mut out = Vec::new();
        self.advance(bytes, &mut |seq| out.push(seq));
        out
    }

    /// End of stream: terminate any open string and emit [`Sequence::Eof`].
    pub fn finish(&mut self, sink: &mut impl FnMut(Sequence)) {
        let Self { state, scratch, utf8 } = self;
        utf8.flush(&mut |c| step(state, scratch, c, sink));
        exit(*state, scratch, sink);
        *state = State::Ground;
        scratch.clear();
        scratch.osc.clear();
        sink(Sequence::Eof);
    }
}

fn step(state: &mut State, scratch: &mut Scratch, c: char, sink: &mut impl FnMut(Sequence)) {
    let (next, action) = transition(*state, c);
    let changed = next != *state;
    if changed {
        exit(*state, scratch, sink);
    }
    perform(action, scratch, c, sink);
    if changed {
        *state = next;
        enter(state, scratch, c, sink);
    }
}

fn perform(action: Action, scratch: &mut Scratch, c: char, sink: &mut impl FnMut(Sequence)) {
    match action {
        Action::None | Action::Ignore => {}
        Action::Print => sink(Sequence::Print(c)),
        Action::Execute => sink(Sequence::C0(c as u8)),
        Action::Clear => scratch.clear(),
        Action::Collect => {
            if scratch.intermediates.len() < MAX_INTERMEDIATES {
                scratch.intermediates.push(c as u8);
            }
        }
        Action::Param => {
            if scratch.params.len() < MAX_PARAM_BYTES {
                scratch.has_colon |= c == ':';
                scratch.params.push(c);
            }
        }
        Action::EscDispatch => sink(Sequence::Esc {
            final_byte: c as u8,
            intermediates: std::mem::take(&mut scratch.intermediates),
        }),
        Action::CsiDispatch => match parse_params(&scratch.params, scratch.has_colon) {
            Ok(params) => sink(Sequence::Csi {
                final_byte: c as u8,
                intermediates: std::mem::take(&mut scratch.intermediates),
                params,
            }),
            Err(e) => sink(Sequence::ParseError(format!("csi: {}", e))),
        },
        Action::Put => {
            let mut buf = [0u8; 4];
            for &b in c.encode_utf8(&mut buf).as_bytes() {
                sink(Sequence::DcsData(b));
            }
        }
        Action::OscPut => {
            if scratch.osc.len() < MAX_OSC_BYTES {
                scratch.osc.push(c);
            }
        }
    }
}

fn enter(state: &mut State, scratch: &mut Scratch, c: char, sink: &mut impl FnMut(Sequence)) {
    match *state {
        State::CsiEntry | State::DcsEntry => scratch.clear(),
        State::OscString => scratch.osc.clear(),
        State::DcsPassthrough => match parse_params(&scratch.params, false) {
            Ok(params) => sink(Sequence::Dcs {
                final_byte: c as u8,
                intermediates: std::mem::take(&mut scratch.intermediates),
                params,
            }),
            Err(e) => {
                sink(Sequence::ParseError(format!("dcs: {}", e)));
                *state = State::Ground;
            }
        },
        _ => {}
    }
}

fn exit(state: State, scratch: &mut Scratch, sink: &mut impl FnMut(Sequence)) {
    match state {
        State::OscString => sink(Sequence::Osc {
            payload: std::mem::take(&mut scratch.osc),
        }),
        State::DcsPassthrough => sink(Sequence::DcsEnd),
        _ => {}
    }
}

/// Pull-style adapter: reads `R` on demand and yields sequences, ending with
/// [`Sequence::Eof`] once the reader is exhausted.
pub struct Sequences<R> {
    reader: R,
    parser: Parser,
    pending: VecDeque<Sequence>,
    buf: Box<[u8]>,
    done: bool,
}

impl<R: Read> Sequences<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Parser::new(),
            pending: VecDeque::new(),
            buf: vec![0u8; 4096].into_boxed_slice(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for Sequences<R> {
    type Item = Sequence;

    fn next(&mut self) -> Option<Sequence> {
        while self.pending.is_empty() && !self.done {
            let pending = &mut self.pending;
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.parser.finish(&mut |seq| pending.push_back(seq));
                    self.done = true;
                }
                Ok(n) => self.parser.advance(&self.buf[..n], &mut |seq| pending.push_back(seq)),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!("sequence source failed: {}", e);
                    self.parser.finish(&mut |seq| pending.push_back(seq));
                    self.done = true;
                }
            }
        }
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(bytes: &[u8]) -> Vec<Sequence> {
        Parser::new().feed(bytes)
    }

    fn csi(final_byte: u8, intermediates: &[u8], params: &[u32]) -> Sequence {
        Sequence::Csi {
            final_byte,
            intermediates: intermediates.to_vec(),
            params: params.to_vec(),
        }
    }

    #[test]
    fn test_print_and_execute() {
        assert_eq!(
            parse(b"a\r\n"),
            vec![Sequence::Print('a'), Sequence::C0(b'\r'), Sequence::C0(b'\n')]
        );
    }

    #[test]
    fn test_csi_params() {
        assert_eq!(parse(b"\x1b[1;2H"), vec![csi(b'H', b"", &[1, 2])]);
        assert_eq!(parse(b"\x1b[H"), vec![csi(b'H', b"", &[])]);
        assert_eq!(parse(b"\x1b[;5H"), vec![csi(b'H', b"", &[0, 5])]);
        assert_eq!(parse(b"\x1b[?1049h"), vec![csi(b'h', b"?", &[1049])]);
        assert_eq!(parse(b"\x1b[2 q"), vec![csi(b'q', b" ", &[2])]);
    }

    #[test]
    fn test_colon_normalization() {
        // Underline style keeps only the first value
        assert_eq!(parse(b"\x1b[4:3m"), vec![csi(b'm', b"", &[4])]);
        // Five element truecolor is passed through
        assert_eq!(parse(b"\x1b[38:2:1:2:3m"), vec![csi(b'm', b"", &[38, 2, 1, 2, 3])]);
        // Six elements drop the color space id
        assert_eq!(parse(b"\x1b[38:2::10:20:30m"), vec![csi(b'm', b"", &[38, 2, 10, 20, 30])]);
        assert_eq!(parse(b"\x1b[1;48:2:9:1:2:3m"), vec![csi(b'm', b"", &[1, 48, 2, 1, 2, 3])]);
    }

    #[test]
    fn test_overflowing_param_is_parse_error() {
        let out = parse(b"\x1b[99999999999999999999Ax");
        assert!(matches!(out[0], Sequence::ParseError(_)));
        assert_eq!(out[1], Sequence::Print('x'));
    }

    #[test]
    fn test_esc_dispatch() {
        assert_eq!(
            parse(b"\x1b(0"),
            vec![Sequence::Esc { final_byte: b'0', intermediates: b"(".to_vec() }]
        );
        assert_eq!(
            parse(b"\x1b7"),
            vec![Sequence::Esc { final_byte: b'7', intermediates: vec![] }]
        );
    }

    #[test]
    fn test_osc_terminators() {
        let title = Sequence::Osc { payload: "0;hello".to_string() };
        assert_eq!(parse(b"\x1b]0;hello\x07"), vec![title.clone()]);

        // ST ends the string, then dispatches ESC \
        assert_eq!(
            parse(b"\x1b]0;hello\x1b\\"),
            vec![title, Sequence::Esc { final_byte: b'\\', intermediates: vec![] }]
        );
    }

    #[test]
    fn test_osc_utf8_payload() {
        assert_eq!(
            parse("\x1b]2;héllo ✓\x07".as_bytes()),
            vec![Sequence::Osc { payload: "2;héllo ✓".to_string() }]
        );
    }

    #[test]
    fn test_can_aborts_sequence() {
        assert_eq!(parse(b"\x1b[12\x18a"), vec![Sequence::C0(0x18), Sequence::Print('a')]);
    }

    #[test]
    fn test_esc_restarts_sequence() {
        assert_eq!(parse(b"\x1b[12\x1b[3A"), vec![csi(b'A', b"", &[3])]);
    }

    #[test]
    fn test_c0_inside_csi_executes() {
        assert_eq!(parse(b"\x1b[1\r2A"), vec![Sequence::C0(b'\r'), csi(b'A', b"", &[12])]);
    }

    #[test]
    fn test_csi_ignore_swallows_sequence() {
        assert_eq!(parse(b"\x1b[1?2Ab"), vec![Sequence::Print('b')]);
    }

    #[test]
    fn test_dcs_hook_put_unhook() {
        assert_eq!(
            parse(b"\x1bP1$qm\x1b\\"),
            vec![
                Sequence::Dcs { final_byte: b'q', intermediates: b"$".to_vec(), params: vec![1] },
                Sequence::DcsData(b'm'),
                Sequence::DcsEnd,
                Sequence::Esc { final_byte: b'\\', intermediates: vec![] },
            ]
        );
    }

    #[test]
    fn test_sos_pm_apc_ignored() {
        assert_eq!(
            parse(b"\x1b_payload\x1b\\z"),
            vec![Sequence::Esc { final_byte: b'\\', intermediates: vec![] }, Sequence::Print('z')]
        );
    }

    #[test]
    fn test_utf8_split_across_feeds() {
        let mut parser = Parser::new();
        let bytes = "é✓".as_bytes();
        let mut out = parser.feed(&bytes[..1]);
        out.extend(parser.feed(&bytes[1..4]));
        out.extend(parser.feed(&bytes[4..]));
        assert_eq!(out, vec![Sequence::Print('é'), Sequence::Print('✓')]);
    }

    #[test]
    fn test_invalid_utf8_delivered_raw() {
        assert_eq!(parse(b"\xffa"), vec![Sequence::Print('\u{ff}'), Sequence::Print('a')]);
        assert_eq!(parse(b"\xc3a"), vec![Sequence::Print('\u{c3}'), Sequence::Print('a')]);
    }

    #[test]
    fn test_finish_terminates_open_osc() {
        let mut parser = Parser::new();
        let mut out = parser.feed(b"\x1b]2;unterminated");
        parser.finish(&mut |seq| out.push(seq));
        assert_eq!(
            out,
            vec![Sequence::Osc { payload: "2;unterminated".to_string() }, Sequence::Eof]
        );
        assert_eq!(parser.state(), State::Ground);
    }

    #[test]
    fn test_sequences_iterator_ends_with_eof() {
        let seqs: Vec<Sequence> = Sequences::new(&b"hi\x1b[m"[..]).collect();
        assert_eq!(
            seqs,
            vec![
                Sequence::Print('h'),
                Sequence::Print('i'),
                csi(b'm', b"", &[]),
                Sequence::Eof,
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_arbitrary_input_recovers_after_can(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut parser = Parser::new();
            parser.feed(&bytes);
            // CAN (after completing any partial UTF-8 with an ASCII byte) always lands in ground
            let out = parser.feed(b"\x18z");
            prop_assert_eq!(parser.state(), State::Ground);
            prop_assert_eq!(out.last(), Some(&Sequence::Print('z')));
        }

        #[test]
        fn prop_chunking_does_not_change_output(
            bytes in proptest::collection::vec(any::<u8>(), 0..256),
            split in 0usize..256,
        ) {
            let split = split.min(bytes.len());
            let whole = Parser::new().feed(&bytes);
            let mut parser = Parser::new();
            let mut chunked = parser.feed(&bytes[..split]);
            chunked.extend(parser.feed(&bytes[split..]));
            prop_assert_eq!(whole, chunked);
        }
    }
}
