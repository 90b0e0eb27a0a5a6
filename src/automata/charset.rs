use super::opcode::SET_WORDS;

/// A 256-bit byte set stored as sixteen program words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharSet([u16; SET_WORDS]);

impl CharSet {
    pub fn new() -> CharSet {
        CharSet::default()
    }

    pub fn insert(&mut self, c: u8) {
        self.0[(c >> 4) as usize] |= 1 << (c & 15);
    }

    /// Insert `c` and, when `fold` is set, its other ASCII case.
    pub fn insert_folded(&mut self, c: u8, fold: bool) {
        if fold {
            self.insert(c.to_ascii_lowercase());
            self.insert(c.to_ascii_uppercase());
        } else {
            self.insert(c);
        }
    }

    pub fn insert_class(&mut self, class: fn(u8) -> bool) {
        for c in 0..=u8::MAX {
            if class(c) {
                self.insert(c);
            }
        }
    }

    pub fn insert_complement(&mut self, class: fn(u8) -> bool) {
        for c in 0..=u8::MAX {
            if !class(c) {
                self.insert(c);
            }
        }
    }

    pub fn contains(&self, c: u8) -> bool {
        contains(&self.0, c)
    }

    pub fn words(&self) -> &[u16] {
        &self.0
    }
}

/// Membership test directly against the sixteen words of a program bitset.
#[inline]
pub fn contains(set: &[u16], c: u8) -> bool {
    set[(c >> 4) as usize] & (1 << (c & 15)) != 0
}

pub fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t'..=b'\r')
}

pub fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

pub fn is_hex(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

pub fn is_letter(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

pub fn is_upper(c: u8) -> bool {
    c.is_ascii_uppercase()
}

pub fn is_lower(c: u8) -> bool {
    c.is_ascii_lowercase()
}

pub fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Punctuation other than the underscore, which counts as a word byte.
pub fn is_delim(c: u8) -> bool {
    c.is_ascii_punctuation() && c != b'_'
}

/// Class named by a POSIX bracket expression such as `[:alpha:]`.
pub fn posix(name: &[u8]) -> Option<fn(u8) -> bool> {
    let class: fn(u8) -> bool = match name {
        b"alnum" => |c| c.is_ascii_alphanumeric(),
        b"alpha" => is_letter,
        b"ascii" => |c| c.is_ascii(),
        b"blank" => |c| c == b' ' || c == b'\t',
        b"cntrl" => |c| c.is_ascii_control(),
        b"digit" => is_digit,
        b"graph" => |c| c.is_ascii_graphic(),
        b"lower" => is_lower,
        b"print" => |c| c.is_ascii_graphic() || c == b' ',
        b"punct" => |c| c.is_ascii_punctuation(),
        b"space" => is_space,
        b"upper" => is_upper,
        b"word" => is_word,
        b"xdigit" => is_hex,
        _ => return None,
    };
    Some(class)
}
