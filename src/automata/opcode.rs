//! Instruction set of the compiled program.
//!
//! Every instruction starts with one of the opcode words below. Operands
//! follow inline; relative offsets are signed and measured from the word that
//! holds them.

pub const END: u16 = 0;
pub const FAIL: u16 = 1;
pub const SUCCEED: u16 = 2;

pub const LINE_BEG: u16 = 3;
pub const LINE_END: u16 = 4;
pub const WORD_BEG: u16 = 5;
pub const WORD_END: u16 = 6;
pub const WORD_BND: u16 = 7;
pub const WORD_INT: u16 = 8;
pub const STR_BEG: u16 = 9;
pub const STR_END: u16 = 10;

pub const ANY_OF: u16 = 11;
pub const ANY_BUT: u16 = 12;
pub const ANY: u16 = 13;
pub const ANY_NL: u16 = 14;
pub const SPACE: u16 = 15;
pub const SPACE_NL: u16 = 16;
pub const NOT_SPACE: u16 = 17;
pub const DIGIT: u16 = 18;
pub const NOT_DIGIT: u16 = 19;
pub const NOT_DIGIT_NL: u16 = 20;
pub const LETTER: u16 = 21;
pub const NOT_LETTER: u16 = 22;
pub const NOT_LETTER_NL: u16 = 23;
pub const WORD: u16 = 24;
pub const NOT_WORD: u16 = 25;
pub const NOT_WORD_NL: u16 = 26;
pub const HEX: u16 = 27;
pub const NOT_HEX: u16 = 28;
pub const NOT_HEX_NL: u16 = 29;
pub const PUNCT: u16 = 30;
pub const NOT_PUNCT: u16 = 31;
pub const NOT_PUNCT_NL: u16 = 32;
pub const UPPER: u16 = 33;
pub const LOWER: u16 = 34;

pub const CHARS: u16 = 35;
pub const CHARS_CI: u16 = 36;
pub const CHAR: u16 = 37;
pub const CHAR_CI: u16 = 38;

pub const JUMP: u16 = 39;
pub const BRANCH: u16 = 40;
pub const BRANCHREV: u16 = 41;

// Repeat prefixes come in greedy, lazy, possessive triples.
pub const STAR: u16 = 42;
pub const MIN_STAR: u16 = 43;
pub const POS_STAR: u16 = 44;
pub const PLUS: u16 = 45;
pub const MIN_PLUS: u16 = 46;
pub const POS_PLUS: u16 = 47;
pub const QUEST: u16 = 48;
pub const MIN_QUEST: u16 = 49;
pub const POS_QUEST: u16 = 50;
pub const REP: u16 = 51;
pub const MIN_REP: u16 = 52;
pub const POS_REP: u16 = 53;

pub const AHEAD_NEG: u16 = 54;
pub const AHEAD_POS: u16 = 55;
pub const BEHIND_NEG: u16 = 56;
pub const BEHIND_POS: u16 = 57;
pub const ATOMIC: u16 = 58;

pub const SUB_BEG_0: u16 = 59;
pub const SUB_BEG_9: u16 = SUB_BEG_0 + 9;
pub const SUB_END_0: u16 = 69;
pub const SUB_END_9: u16 = SUB_END_0 + 9;
pub const REF_0: u16 = 79;
pub const REF_9: u16 = REF_0 + 9;
pub const REF_CI_0: u16 = 89;
pub const REF_CI_9: u16 = REF_CI_0 + 9;
pub const ZERO_0: u16 = 99;
pub const ZERO_9: u16 = ZERO_0 + 9;
pub const INCR_0: u16 = 109;
pub const INCR_9: u16 = INCR_0 + 9;
pub const JUMPLT_0: u16 = 119;
pub const JUMPLT_9: u16 = JUMPLT_0 + 9;
pub const JUMPGT_0: u16 = 129;
pub const JUMPGT_9: u16 = JUMPGT_0 + 9;

/// Number of words taken by a bitset payload.
pub const SET_WORDS: usize = 16;

/// Words used by the instruction at `at`, or `None` for an unknown opcode or
/// a literal run whose length word is missing.
pub fn width(code: &[u16], at: usize) -> Option<usize> {
    let n = match *code.get(at)? {
        END | FAIL | SUCCEED => 1,
        LINE_BEG..=STR_END => 1,
        ANY_OF | ANY_BUT => 1 + SET_WORDS,
        ANY..=LOWER => 1,
        CHARS | CHARS_CI => 2 + (*code.get(at + 1)? as usize + 1) / 2,
        CHAR | CHAR_CI => 2,
        JUMP | BRANCH | BRANCHREV => 2,
        STAR..=POS_QUEST => 1,
        REP..=POS_REP => 3,
        AHEAD_NEG | AHEAD_POS => 2,
        BEHIND_NEG | BEHIND_POS => 3,
        ATOMIC => 2,
        SUB_BEG_0..=INCR_9 => 1,
        JUMPLT_0..=JUMPGT_9 => 3,
        _ => return None,
    };
    Some(n)
}

/// True for instructions that test exactly one subject byte.
pub fn is_single(op: u16) -> bool {
    matches!(op, ANY_OF..=LOWER | CHAR | CHAR_CI)
}

/// Position of the relative offset operand of a jumping instruction.
pub fn offset_operand(op: u16) -> Option<usize> {
    match op {
        JUMP | BRANCH | BRANCHREV | AHEAD_NEG | AHEAD_POS | ATOMIC => Some(1),
        BEHIND_NEG | BEHIND_POS | JUMPLT_0..=JUMPGT_9 => Some(2),
        _ => None,
    }
}

/// Absolute target of the relative offset stored at `operand`.
pub fn target(code: &[u16], operand: usize) -> Option<usize> {
    let off = *code.get(operand)? as i16;
    operand.checked_add_signed(off as isize)
}

pub fn name(op: u16) -> &'static str {
    const SIMPLE: [&str; 59] = [
        "END", "FAIL", "SUCCEED", "LINE_BEG", "LINE_END", "WORD_BEG", "WORD_END", "WORD_BND",
        "WORD_INT", "STR_BEG", "STR_END", "ANY_OF", "ANY_BUT", "ANY", "ANY_NL", "SPACE",
        "SPACE_NL", "NOT_SPACE", "DIGIT", "NOT_DIGIT", "NOT_DIGIT_NL", "LETTER", "NOT_LETTER",
        "NOT_LETTER_NL", "WORD", "NOT_WORD", "NOT_WORD_NL", "HEX", "NOT_HEX", "NOT_HEX_NL",
        "PUNCT", "NOT_PUNCT", "NOT_PUNCT_NL", "UPPER", "LOWER", "CHARS", "CHARS_CI", "CHAR",
        "CHAR_CI", "JUMP", "BRANCH", "BRANCHREV", "STAR", "MIN_STAR", "POS_STAR", "PLUS",
        "MIN_PLUS", "POS_PLUS", "QUEST", "MIN_QUEST", "POS_QUEST", "REP", "MIN_REP", "POS_REP",
        "AHEAD_NEG", "AHEAD_POS", "BEHIND_NEG", "BEHIND_POS", "ATOMIC",
    ];
    match op {
        SUB_BEG_0..=SUB_BEG_9 => "SUB_BEG",
        SUB_END_0..=SUB_END_9 => "SUB_END",
        REF_0..=REF_9 => "REF",
        REF_CI_0..=REF_CI_9 => "REF_CI",
        ZERO_0..=ZERO_9 => "ZERO",
        INCR_0..=INCR_9 => "INCR",
        JUMPLT_0..=JUMPLT_9 => "JUMPLT",
        JUMPGT_0..=JUMPGT_9 => "JUMPGT",
        _ => SIMPLE.get(op as usize).copied().unwrap_or("?"),
    }
}

/// Register or group number encoded in a family opcode.
pub fn index(op: u16) -> usize {
    match op {
        SUB_BEG_0..=JUMPGT_9 => ((op - SUB_BEG_0) % 10) as usize,
        _ => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn widths() {
        assert_eq!(Some(1), width(&[END], 0));
        assert_eq!(Some(2), width(&[CHAR, b'a' as u16], 0));
        assert_eq!(Some(3), width(&[CHARS, 2], 0));
        assert_eq!(Some(4), width(&[CHARS, 3], 0));
        assert_eq!(None, width(&[CHARS], 0));
        assert_eq!(Some(17), width(&[ANY_BUT], 0));
        assert_eq!(Some(3), width(&[POS_REP], 0));
        assert_eq!(Some(3), width(&[JUMPGT_9], 0));
        assert_eq!(Some(1), width(&[INCR_0 + 4], 0));
        assert_eq!(None, width(&[JUMPGT_9 + 1], 0));
    }

    #[test]
    fn families() {
        assert_eq!("SUB_END", name(SUB_END_0 + 3));
        assert_eq!(3, index(SUB_END_0 + 3));
        assert_eq!(9, index(JUMPLT_9));
        assert_eq!("ATOMIC", name(ATOMIC));
        assert_eq!("BRANCHREV", name(BRANCHREV));
        assert!(is_single(CHAR_CI));
        assert!(!is_single(CHARS));
    }

    #[test]
    fn targets() {
        let code = [JUMP, (-1i16) as u16];
        assert_eq!(Some(0), target(&code, 1));
        let code = [BRANCH, 3, END];
        assert_eq!(Some(4), target(&code, 1));
        assert_eq!(Some(1), offset_operand(BRANCH));
        assert_eq!(Some(2), offset_operand(JUMPLT_0 + 1));
        assert_eq!(None, offset_operand(CHAR));
    }
}
