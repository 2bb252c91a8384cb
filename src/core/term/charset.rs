//! G0-G3 character set slots

/// A designatable character set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Ascii,
    /// DEC special graphics (line drawing)
    DecSpecial,
    Uk,
}

impl Charset {
    /// Charset named by the final byte of `ESC ( F` and friends
    pub fn from_final(byte: u8) -> Option<Self> {
        match byte {
            b'B' | b'@' => Some(Charset::Ascii),
            b'0' | b'2' => Some(Charset::DecSpecial),
            b'A' => Some(Charset::Uk),
            _ => None,
        }
    }

    pub fn map(self, ch: char) -> char {
        match self {
            Charset::Ascii => ch,
            Charset::Uk if ch == '#' => '£',
            Charset::Uk => ch,
            Charset::DecSpecial => dec_special(ch),
        }
    }
}

fn dec_special(ch: char) -> char {
    match ch {
        '`' => '◆',
        'a' => '▒',
        'b' => '␉',
        'c' => '␌',
        'd' => '␍',
        'e' => '␊',
        'f' => '°',
        'g' => '±',
        'h' => '␤',
        'i' => '␋',
        'j' => '┘',
        'k' => '┐',
        'l' => '┌',
        'm' => '└',
        'n' => '┼',
        'o' => '⎺',
        'p' => '⎻',
        'q' => '─',
        'r' => '⎼',
        's' => '⎽',
        't' => '├',
        'u' => '┤',
        'v' => '┴',
        'w' => '┬',
        'x' => '│',
        'y' => '≤',
        'z' => '≥',
        '{' => 'π',
        '|' => '≠',
        '}' => '£',
        '~' => '·',
        _ => ch,
    }
}

/// One of the four designation slots
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    G0,
    G1,
    G2,
    G3,
}

impl Slot {
    /// Slot designated by the intermediate of `ESC ( F`, `ESC ) F`, ...
    pub fn from_intermediate(byte: u8) -> Option<Self> {
        match byte {
            b'(' => Some(Slot::G0),
            b')' | b'-' => Some(Slot::G1),
            b'*' | b'.' => Some(Slot::G2),
            b'+' | b'/' => Some(Slot::G3),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::G0 => 0,
            Slot::G1 => 1,
            Slot::G2 => 2,
            Slot::G3 => 3,
        }
    }
}

/// Designations plus the locking and single shift state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Charsets {
    slots: [Charset; 4],
    selected: Slot,
    single_shift: Option<Slot>,
}

impl Charsets {
    pub fn designate(&mut self, slot: Slot, charset: Charset) {
        self.slots[slot.index()] = charset;
    }

    /// Locking shift (SI, SO, LS2, LS3)
    pub fn select(&mut self, slot: Slot) {
        self.selected = slot;
        self.single_shift = None;
    }

    pub fn selected(&self) -> Slot {
        self.selected
    }

    /// SS2/SS3: the next printed character only
    pub fn single_shift(&mut self, slot: Slot) {
        self.single_shift = Some(slot);
    }

    /// Map a printable character, consuming any pending single shift.
    pub fn translate(&mut self, ch: char) -> char {
        let slot = self.single_shift.take().unwrap_or(self.selected);
        self.slots[slot.index()].map(ch)
    }
}
