use std::{cell::Cell, result};

use bitflags::bitflags;
use log::{debug, trace};

use crate::{
    automata::{
        charset::{self, CharSet},
        opcode::*,
        program::{Program, MAX_WORDS},
    },
    errors::{Error, ErrorKind},
    mode::CompileMode,
};

type Result<T> = result::Result<T, Error>;

/// Stand-in for an unbounded repeat count or match length.
pub const INF: u32 = 16384;

/// Capture slots, counted loop registers and back-reference targets each.
pub const NSUBEXP: usize = 10;

const GREEDY: u16 = 0;
const LAZY: u16 = 1;
const POSSESSIVE: u16 = 2;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Flags: u8 {
        /// Always consumes at least one byte.
        const WIDTH = 1 << 0;
        /// A single instruction testing exactly one byte.
        const SIMPLE = 1 << 1;
    }
}

/// What the parser learned about the code it just emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Info {
    flags: Flags,
    smin: u32,
    smax: u32,
}

impl Info {
    const WORST: Info = Info {
        flags: Flags::empty(),
        smin: 0,
        smax: 0,
    };

    fn single() -> Info {
        Info {
            flags: Flags::WIDTH | Flags::SIMPLE,
            smin: 1,
            smax: 1,
        }
    }

    fn then(self, next: Info) -> Info {
        let mut flags = Flags::empty();
        if self.flags.contains(Flags::WIDTH) || next.flags.contains(Flags::WIDTH) {
            flags |= Flags::WIDTH;
        }
        Info {
            flags,
            smin: (self.smin + next.smin).min(INF),
            smax: (self.smax + next.smax).min(INF),
        }
    }

    fn or(self, other: Info) -> Info {
        let mut flags = Flags::empty();
        if self.flags.contains(Flags::WIDTH) && other.flags.contains(Flags::WIDTH) {
            flags |= Flags::WIDTH;
        }
        Info {
            flags,
            smin: self.smin.min(other.smin),
            smax: self.smax.max(other.smax),
        }
    }
}

/// The result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub program: Program,
    /// Capture slots the program uses, the whole match included.
    pub groups: usize,
}

/// Compile `pattern` into a program.
///
/// The parser runs twice over the pattern: first only counting words, then
/// emitting into a buffer reserved to exactly that size.
pub fn compile(pattern: &[u8], mode: CompileMode) -> Result<Compiled> {
    let (size, groups) = {
        let mut c = Compiler::new(pattern, mode, Emitter::measure());
        c.run()?;
        (c.out.pc, c.npar + 1)
    };
    trace!("sizing pass for {:?}: {} words", pattern.escape_ascii().to_string(), size);

    if mode.contains(CompileMode::SYNTAX) {
        return Ok(Compiled {
            program: Program::fallback(),
            groups,
        });
    }
    if size > MAX_WORDS {
        return Err(Error::new(ErrorKind::Complex, pattern.len()));
    }

    let mut c = Compiler::new(pattern, mode, Emitter::with_capacity(size)?);
    c.run()?;
    let code = c.out.code.unwrap_or_default();
    assert_eq!(size, code.len(), "emitting pass diverged from sizing pass");

    debug!(
        "compiled {:?} into {} words with {} groups",
        pattern.escape_ascii().to_string(),
        size,
        groups
    );
    Ok(Compiled {
        program: Program::from_compiled(code),
        groups,
    })
}

/// Words the emitting pass will produce for `pattern`.
pub fn measure(pattern: &[u8], mode: CompileMode) -> Result<usize> {
    let mut c = Compiler::new(pattern, mode, Emitter::measure());
    c.run()?;
    Ok(c.out.pc)
}

/// Output buffer that either stores words or only counts them.
struct Emitter {
    code: Option<Vec<u16>>,
    pc: usize,
}

impl Emitter {
    fn measure() -> Emitter {
        Emitter { code: None, pc: 1 }
    }

    fn with_capacity(size: usize) -> Result<Emitter> {
        let mut code = Vec::new();
        code.try_reserve_exact(size)
            .map_err(|_| Error::new(ErrorKind::Memory, 0))?;
        code.push(size as u16);
        Ok(Emitter {
            code: Some(code),
            pc: 1,
        })
    }

    fn append(&mut self, words: &[u16]) -> usize {
        let at = self.pc;
        if let Some(code) = self.code.as_mut() {
            code.extend_from_slice(words);
        }
        self.pc += words.len();
        at
    }

    /// Shift everything from `at` onward down and put `words` in the gap.
    fn insert(&mut self, at: usize, words: &[u16]) {
        if let Some(code) = self.code.as_mut() {
            code.splice(at..at, words.iter().copied());
        }
        self.pc += words.len();
    }

    fn set(&mut self, at: usize, word: u16) {
        if let Some(code) = self.code.as_mut() {
            code[at] = word;
        }
    }

    fn patch(&mut self, operand: usize, target: usize) {
        self.set(operand, rel(operand, target));
    }
}

/// Relative offset stored at `operand` so that it reaches `target`.
fn rel(operand: usize, target: usize) -> u16 {
    (target as isize - operand as isize) as i16 as u16
}

struct Compiler<'a> {
    pattern: &'a [u8],
    pos: Cell<usize>,
    mode: CompileMode,
    out: Emitter,
    npar: usize,
    nbra: usize,
}

impl<'a> Compiler<'a> {
    fn new(pattern: &'a [u8], mode: CompileMode, out: Emitter) -> Compiler<'a> {
        Compiler {
            pattern,
            pos: Cell::new(0),
            mode,
            out,
            npar: 0,
            nbra: 0,
        }
    }

    fn offset(&self) -> usize {
        self.pos.get()
    }

    fn is_eof(&self) -> bool {
        self.offset() >= self.pattern.len()
    }

    fn char(&self) -> Option<u8> {
        self.char_at(0)
    }

    fn char_at(&self, ahead: usize) -> Option<u8> {
        self.pattern.get(self.offset() + ahead).copied()
    }

    fn bump(&self) {
        self.pos.set(self.offset() + 1);
    }

    fn error(&self, kind: ErrorKind) -> Error {
        Error::new(kind, self.offset())
    }

    fn ignore_case(&self) -> bool {
        self.mode.contains(CompileMode::IGNORE_CASE)
    }

    fn newline(&self) -> bool {
        self.mode.contains(CompileMode::NEWLINE)
    }

    fn run(&mut self) -> Result<Info> {
        if self.pattern.is_empty() {
            return Err(self.error(ErrorKind::Empty));
        }
        let info = if self.mode.contains(CompileMode::VERBATIM) {
            self.verbatim()
        } else {
            self.expression()?
        };
        if !self.is_eof() {
            return Err(self.error(ErrorKind::Paren));
        }
        self.out.append(&[END]);
        Ok(info)
    }

    fn verbatim(&mut self) -> Info {
        let bytes = self.pattern;
        self.pos.set(bytes.len());
        self.literal(bytes)
    }

    fn expression(&mut self) -> Result<Info> {
        let mut at = self.out.pc;
        let mut jumps = vec![];
        let mut info = self.alternative()?;
        while self.char() == Some(b'|') {
            self.bump();
            let end = self.out.pc;
            self.out.insert(at, &[BRANCH, rel(at + 1, end + 4)]);
            jumps.push(self.out.append(&[JUMP, 0]) + 1);
            at = self.out.pc;
            info = info.or(self.alternative()?);
        }
        let end = self.out.pc;
        for operand in jumps {
            self.out.patch(operand, end);
        }
        Ok(info)
    }

    fn alternative(&mut self) -> Result<Info> {
        let mut info = Info::WORST;
        while let Some(c) = self.char() {
            if c == b'|' || c == b')' {
                break;
            }
            info = info.then(self.piece()?);
        }
        Ok(info)
    }

    fn piece(&mut self) -> Result<Info> {
        let ptr = self.out.pc;
        let mut info = self.atom()?;

        if !matches!(self.char(), Some(b'*' | b'+' | b'?' | b'{')) {
            return Ok(info);
        }
        if !info.flags.contains(Flags::WIDTH) {
            return Err(self.error(ErrorKind::NoAtom));
        }
        let (min, max) = self.quantifier()?;
        let greed = match self.char() {
            Some(b'?') => {
                self.bump();
                LAZY
            }
            Some(b'+') => {
                self.bump();
                POSSESSIVE
            }
            _ => GREEDY,
        };
        if matches!(self.char(), Some(b'*' | b'+' | b'?' | b'{')) {
            return Err(self.error(ErrorKind::Repeat));
        }

        let simple = info.flags.contains(Flags::SIMPLE);
        info.flags.remove(Flags::SIMPLE);
        if min == 0 {
            info.flags.remove(Flags::WIDTH);
        }
        info.smin = (min * info.smin).min(INF);
        info.smax = (max * info.smax).min(INF);

        if min == 1 && max == 1 {
            return Ok(info);
        }
        if simple {
            match (min, max) {
                (0, INF) => self.out.insert(ptr, &[STAR + greed]),
                (1, INF) => self.out.insert(ptr, &[PLUS + greed]),
                (0, 1) => self.out.insert(ptr, &[QUEST + greed]),
                _ => self.out.insert(ptr, &[REP + greed, min as u16, max as u16]),
            }
            return Ok(info);
        }
        if greed == POSSESSIVE {
            return Err(self.error(ErrorKind::Possessive));
        }
        self.loop_shape(ptr, min, max, greed == LAZY)?;
        Ok(info)
    }

    /// Wrap the multi-instruction body at `ptr..pc` in a loop.
    fn loop_shape(&mut self, ptr: usize, min: u32, max: u32, lazy: bool) -> Result<()> {
        let (fwd, rev) = if lazy {
            (BRANCHREV, BRANCH)
        } else {
            (BRANCH, BRANCHREV)
        };
        let end = self.out.pc;
        match (min, max) {
            (0, INF) => {
                self.out.insert(ptr, &[fwd, rel(ptr + 1, end + 4)]);
                self.out.append(&[JUMP, rel(end + 3, ptr)]);
            }
            (1, INF) => {
                self.out.append(&[rev, rel(end + 1, ptr)]);
            }
            (0, 1) => {
                self.out.insert(ptr, &[fwd, rel(ptr + 1, end + 2)]);
            }
            (n, m) if n == m => {
                let k = self.counter()?;
                self.out.insert(ptr, &[ZERO_0 + k]);
                self.out.append(&[INCR_0 + k]);
                self.out.append(&[JUMPLT_0 + k, n as u16, rel(end + 4, ptr + 1)]);
            }
            (0, m) => {
                let k = self.counter()?;
                self.out.insert(ptr, &[ZERO_0 + k]);
                self.out.insert(ptr + 1, &[fwd, rel(ptr + 2, end + 7)]);
                self.out.append(&[INCR_0 + k]);
                self.out.append(&[JUMPLT_0 + k, m as u16, rel(end + 6, ptr + 1)]);
            }
            (n, INF) => {
                let k = self.counter()?;
                self.out.insert(ptr, &[ZERO_0 + k]);
                self.out.append(&[INCR_0 + k]);
                self.out.append(&[JUMPLT_0 + k, n as u16, rel(end + 4, ptr + 1)]);
                self.out.append(&[rev, rel(end + 6, ptr + 1)]);
            }
            (n, m) => {
                let k = self.counter()?;
                self.out.insert(ptr, &[ZERO_0 + k]);
                self.out.append(&[INCR_0 + k]);
                self.out.append(&[JUMPLT_0 + k, n as u16, rel(end + 4, ptr + 1)]);
                // Leave once the body ran m times.
                self.out.append(&[JUMPGT_0 + k, (m - 1) as u16, rel(end + 7, end + 10)]);
                self.out.append(&[rev, rel(end + 9, ptr + 1)]);
            }
        }
        Ok(())
    }

    fn counter(&mut self) -> Result<u16> {
        if self.nbra >= NSUBEXP {
            return Err(self.error(ErrorKind::Complex));
        }
        self.nbra += 1;
        Ok((self.nbra - 1) as u16)
    }

    /// Parse `*`, `+`, `?` or a `{n,m}` bound into (min, max).
    fn quantifier(&mut self) -> Result<(u32, u32)> {
        let c = self.char();
        self.bump();
        match c {
            Some(b'*') => Ok((0, INF)),
            Some(b'+') => Ok((1, INF)),
            Some(b'?') => Ok((0, 1)),
            _ => self.counts(),
        }
    }

    fn counts(&mut self) -> Result<(u32, u32)> {
        let (mut min, mut max) = (0, INF);
        if self.char() != Some(b'}') {
            min = self.number();
            max = min;
            if self.char() == Some(b',') {
                self.bump();
                max = INF;
                if self.char() != Some(b'}') {
                    max = self.number();
                }
            }
            if min > max {
                return Err(self.error(ErrorKind::Range));
            }
            if max > INF || max == 0 {
                return Err(self.error(ErrorKind::Count));
            }
        }
        if self.char() != Some(b'}') {
            return Err(self.error(ErrorKind::Brace));
        }
        self.bump();
        Ok((min, max))
    }

    fn number(&mut self) -> u32 {
        let mut n: u32 = 0;
        while let Some(d @ b'0'..=b'9') = self.char() {
            n = (n * 10 + (d - b'0') as u32).min(INF + 1);
            self.bump();
        }
        n
    }

    fn atom(&mut self) -> Result<Info> {
        let c = match self.char() {
            Some(c) => c,
            None => return Err(self.error(ErrorKind::NoAtom)),
        };
        match c {
            b'(' => {
                self.bump();
                self.group()
            }
            b'.' => {
                self.bump();
                self.out.append(&[if self.newline() { ANY_NL } else { ANY }]);
                Ok(Info::single())
            }
            b'^' => {
                self.bump();
                self.out.append(&[LINE_BEG]);
                Ok(Info::WORST)
            }
            b'$' => {
                self.bump();
                self.out.append(&[LINE_END]);
                Ok(Info::WORST)
            }
            b'*' | b'+' | b'?' | b'{' | b'|' | b')' => Err(self.error(ErrorKind::NoAtom)),
            b'}' => Err(self.error(ErrorKind::Brace)),
            b'[' => {
                self.bump();
                self.charset()?;
                if self.char() != Some(b']') {
                    return Err(self.error(ErrorKind::Bracket));
                }
                self.bump();
                Ok(Info::single())
            }
            b']' => Err(self.error(ErrorKind::Bracket)),
            b'\\' => match self.char_at(1) {
                None => Err(self.error(ErrorKind::Escape)),
                Some(e) if is_special(e) => self.special(e),
                Some(_) => self.literal_run(),
            },
            _ => self.literal_run(),
        }
    }

    fn group(&mut self) -> Result<Info> {
        let mut info = if self.char() == Some(b'?') {
            self.bump();
            let kind = self.char();
            self.bump();
            match kind {
                Some(b':') => self.expression()?,
                Some(c @ (b'i' | b'I' | b'n' | b'N')) => {
                    let saved = self.mode;
                    match c {
                        b'i' => self.mode.insert(CompileMode::IGNORE_CASE),
                        b'I' => self.mode.remove(CompileMode::IGNORE_CASE),
                        b'n' => self.mode.insert(CompileMode::NEWLINE),
                        _ => self.mode.remove(CompileMode::NEWLINE),
                    }
                    let info = self.expression();
                    self.mode = saved;
                    info?
                }
                Some(b'>') => {
                    let at = self.out.append(&[ATOMIC, 0]);
                    let info = self.expression()?;
                    self.out.append(&[SUCCEED]);
                    self.out.patch(at + 1, self.out.pc);
                    info
                }
                Some(c @ (b'=' | b'!')) => {
                    let op = if c == b'=' { AHEAD_POS } else { AHEAD_NEG };
                    let at = self.out.append(&[op, 0]);
                    self.expression()?;
                    self.out.append(&[SUCCEED]);
                    self.out.patch(at + 1, self.out.pc);
                    Info::WORST
                }
                Some(b'<') => {
                    let op = match self.char() {
                        Some(b'=') => BEHIND_POS,
                        Some(b'!') => BEHIND_NEG,
                        _ => return Err(self.error(ErrorKind::Token)),
                    };
                    self.bump();
                    let at = self.out.append(&[op, 0, 0]);
                    let body = self.expression()?;
                    if body.smin != body.smax || body.smax >= INF {
                        return Err(self.error(ErrorKind::Behind));
                    }
                    self.out.append(&[SUCCEED]);
                    self.out.set(at + 1, body.smax as u16);
                    self.out.patch(at + 2, self.out.pc);
                    Info::WORST
                }
                _ => return Err(Error::new(ErrorKind::Token, self.offset() - 1)),
            }
        } else if self.mode.contains(CompileMode::CAPTURE) {
            self.npar += 1;
            let level = self.npar;
            if level >= NSUBEXP {
                return Err(self.error(ErrorKind::Complex));
            }
            self.out.append(&[SUB_BEG_0 + level as u16]);
            let info = self.expression()?;
            self.out.append(&[SUB_END_0 + level as u16]);
            info
        } else {
            self.expression()?
        };
        if self.char() != Some(b')') {
            return Err(self.error(ErrorKind::Paren));
        }
        self.bump();
        info.flags.remove(Flags::SIMPLE);
        Ok(info)
    }

    /// Escapes that are not plain bytes: classes, assertions, back-references.
    fn special(&mut self, e: u8) -> Result<Info> {
        if let b'1'..=b'9' = e {
            let level = (e - b'0') as usize;
            if !self.mode.contains(CompileMode::CAPTURE) || level > self.npar {
                return Err(self.error(ErrorKind::BackRef));
            }
            let op = if self.ignore_case() { REF_CI_0 } else { REF_0 };
            self.out.append(&[op + level as u16]);
            self.bump();
            self.bump();
            return Ok(Info {
                flags: Flags::empty(),
                smin: 0,
                smax: INF,
            });
        }
        self.bump();
        self.bump();
        let nl = self.newline();
        let (op, info) = match e {
            b'b' => (WORD_BND, Info::WORST),
            b'B' => (WORD_INT, Info::WORST),
            b'A' => (STR_BEG, Info::WORST),
            b'Z' => (STR_END, Info::WORST),
            b'<' => (WORD_BEG, Info::WORST),
            b'>' => (WORD_END, Info::WORST),
            b'w' => (WORD, Info::single()),
            b'W' => (if nl { NOT_WORD_NL } else { NOT_WORD }, Info::single()),
            b's' => (if nl { SPACE_NL } else { SPACE }, Info::single()),
            b'S' => (NOT_SPACE, Info::single()),
            b'd' => (DIGIT, Info::single()),
            b'D' => (if nl { NOT_DIGIT_NL } else { NOT_DIGIT }, Info::single()),
            b'h' => (HEX, Info::single()),
            b'H' => (if nl { NOT_HEX_NL } else { NOT_HEX }, Info::single()),
            b'p' => (PUNCT, Info::single()),
            b'P' => (if nl { NOT_PUNCT_NL } else { NOT_PUNCT }, Info::single()),
            b'l' => (LETTER, Info::single()),
            b'L' => (if nl { NOT_LETTER_NL } else { NOT_LETTER }, Info::single()),
            b'u' => (UPPER, Info::single()),
            _ => (LOWER, Info::single()),
        };
        self.out.append(&[op]);
        Ok(info)
    }

    /// Consume a backslash sequence that stands for a single byte.
    fn escape(&mut self) -> Result<u8> {
        self.bump();
        let c = match self.char() {
            Some(c) => c,
            None => return Err(self.error(ErrorKind::Escape)),
        };
        self.bump();
        let byte = match c {
            b'a' => 0x07,
            b'e' => 0x1b,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'c' => match self.char().map(|x| x.to_ascii_uppercase()) {
                Some(x @ b'@'..=b'_') => {
                    self.bump();
                    x - b'@'
                }
                _ => return Err(self.error(ErrorKind::Escape)),
            },
            b'0' => {
                let mut n: u32 = 0;
                for _ in 0..3 {
                    match self.char() {
                        Some(d @ b'0'..=b'7') => {
                            n = n * 8 + (d - b'0') as u32;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                if n > 0xff {
                    return Err(self.error(ErrorKind::Token));
                }
                n as u8
            }
            b'x' => {
                let mut n: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.char().and_then(|d| (d as char).to_digit(16)) {
                        Some(d) => {
                            n = n * 16 + d;
                            digits += 1;
                            self.bump();
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err(self.error(ErrorKind::Escape));
                }
                n as u8
            }
            c => c,
        };
        Ok(byte)
    }

    /// Merge consecutive plain bytes into one instruction.
    fn literal_run(&mut self) -> Result<Info> {
        let mut buf = vec![];
        while let Some(c) = self.char() {
            let back = self.offset();
            let byte = match c {
                b'\\' => match self.char_at(1) {
                    Some(e) if is_special(e) => break,
                    _ => self.escape()?,
                },
                b'^' | b'$' | b'.' | b'(' | b')' | b'[' | b']' | b'|' | b'}' => break,
                c => {
                    self.bump();
                    c
                }
            };
            buf.push(if self.ignore_case() {
                byte.to_ascii_lowercase()
            } else {
                byte
            });
            if matches!(self.char(), Some(b'*' | b'+' | b'?' | b'{')) {
                // aaa* is (aa)(a*)
                if buf.len() > 1 {
                    buf.pop();
                    self.pos.set(back);
                }
                break;
            }
        }
        debug_assert!(!buf.is_empty());
        Ok(self.literal(&buf))
    }

    fn literal(&mut self, bytes: &[u8]) -> Info {
        let ci = self.ignore_case();
        if let [c] = bytes {
            let c = if ci { c.to_ascii_lowercase() } else { *c };
            self.out.append(&[if ci { CHAR_CI } else { CHAR }, c as u16]);
            return Info::single();
        }
        let mut words = Vec::with_capacity(2 + (bytes.len() + 1) / 2);
        words.push(if ci { CHARS_CI } else { CHARS });
        words.push(bytes.len() as u16);
        words.extend(bytes.chunks(2).map(|pair| {
            let (lo, hi) = match *pair {
                [lo, hi] => (lo, hi),
                [lo] => (lo, 0),
                _ => (0, 0),
            };
            let (lo, hi) = if ci {
                (lo.to_ascii_lowercase(), hi.to_ascii_lowercase())
            } else {
                (lo, hi)
            };
            lo as u16 | (hi as u16) << 8
        }));
        self.out.append(&words);
        let len = (bytes.len() as u32).min(INF);
        Info {
            flags: Flags::WIDTH,
            smin: len,
            smax: len,
        }
    }

    /// Parse the body of a bracket expression, leaving the closing `]`.
    fn charset(&mut self) -> Result<()> {
        let fold = self.ignore_case();
        let mut set = CharSet::new();
        let op = if self.char() == Some(b'^') {
            self.bump();
            ANY_BUT
        } else {
            ANY_OF
        };
        let mut first = true;
        loop {
            match self.char() {
                None => break,
                Some(b']') if !first => break,
                _ => {}
            }
            first = false;
            let lo = match self.class_member(&mut set)? {
                Some(lo) => lo,
                None => continue,
            };
            if self.char() == Some(b'-') && !matches!(self.char_at(1), None | Some(b']')) {
                self.bump();
                let hi = match self.class_member(&mut set)? {
                    Some(hi) => hi,
                    None => return Err(self.error(ErrorKind::Range)),
                };
                if lo > hi {
                    return Err(self.error(ErrorKind::Range));
                }
                for c in lo..=hi {
                    set.insert_folded(c, fold);
                }
            } else {
                set.insert_folded(lo, fold);
            }
        }
        if op == ANY_BUT && !self.newline() {
            set.insert(b'\n');
        }
        self.out.append(&[op]);
        self.out.append(set.words());
        Ok(())
    }

    /// A single byte of a bracket expression, or `None` after adding a
    /// whole class to `set`.
    fn class_member(&mut self, set: &mut CharSet) -> Result<Option<u8>> {
        match (self.char(), self.char_at(1)) {
            (Some(b'['), Some(b':')) => {
                let name_at = self.offset() + 2;
                let name_len = self.pattern[name_at..]
                    .windows(2)
                    .position(|w| w == b":]")
                    .ok_or_else(|| self.error(ErrorKind::Class))?;
                let class = charset::posix(&self.pattern[name_at..name_at + name_len])
                    .ok_or_else(|| self.error(ErrorKind::Class))?;
                set.insert_class(class);
                self.pos.set(name_at + name_len + 2);
                Ok(None)
            }
            (Some(b'\\'), Some(e)) => {
                let (class, negate): (fn(u8) -> bool, bool) = match e {
                    b'w' | b'W' => (charset::is_word, e == b'W'),
                    b's' | b'S' => (charset::is_space, e == b'S'),
                    b'd' | b'D' => (charset::is_digit, e == b'D'),
                    b'h' | b'H' => (charset::is_hex, e == b'H'),
                    b'p' | b'P' => (charset::is_delim, e == b'P'),
                    b'l' | b'L' => (charset::is_letter, e == b'L'),
                    b'u' => (charset::is_upper, false),
                    b'U' => (charset::is_lower, false),
                    b'b' => {
                        self.bump();
                        self.bump();
                        return Ok(Some(0x08));
                    }
                    _ => return self.escape().map(Some),
                };
                self.bump();
                self.bump();
                if negate {
                    set.insert_complement(class);
                } else {
                    set.insert_class(class);
                }
                Ok(None)
            }
            (Some(b'\\'), None) => Err(Error::new(ErrorKind::Escape, self.offset() + 1)),
            (Some(c), _) => {
                self.bump();
                Ok(Some(c))
            }
            (None, _) => Err(self.error(ErrorKind::Bracket)),
        }
    }
}

/// Escaped bytes that end a literal run.
fn is_special(e: u8) -> bool {
    matches!(
        e,
        b'w' | b'W'
            | b's'
            | b'S'
            | b'd'
            | b'D'
            | b'h'
            | b'H'
            | b'p'
            | b'P'
            | b'l'
            | b'L'
            | b'u'
            | b'U'
            | b'b'
            | b'B'
            | b'A'
            | b'Z'
            | b'<'
            | b'>'
            | b'1'..=b'9'
    )
}

#[cfg(test)]
mod test {
    use super::{compile, measure, INF};
    use crate::automata::opcode::*;
    use crate::errors::ErrorKind;
    use crate::mode::CompileMode;
    use pretty_assertions::assert_eq;

    fn cm(s: &str, mode: CompileMode) -> Result<Vec<u16>, ErrorKind> {
        compile(s.as_bytes(), mode)
            .map(|c| c.program.words().to_vec())
            .map_err(|e| e.kind())
    }

    fn c(s: &str) -> Result<Vec<u16>, ErrorKind> {
        cm(s, CompileMode::CAPTURE)
    }

    fn program(mut v: Vec<u16>) -> Result<Vec<u16>, ErrorKind> {
        v.insert(0, v.len() as u16 + 2);
        v.push(END);
        Ok(v)
    }

    fn ch(c: char) -> u16 {
        c as u16
    }

    fn pair(lo: char, hi: char) -> u16 {
        lo as u16 | (hi as u16) << 8
    }

    fn off(n: i16) -> u16 {
        n as u16
    }

    #[test]
    fn literals() {
        assert_eq!(program(vec![CHAR, ch('a')]), c("a"));
        assert_eq!(program(vec![CHARS, 2, pair('a', 'b')]), c("ab"));
        assert_eq!(
            program(vec![CHARS, 3, pair('a', 'b'), pair('c', '\0')]),
            c("abc")
        );
        assert_eq!(
            program(vec![CHARS_CI, 2, pair('a', 'b')]),
            cm("Ab", CompileMode::IGNORE_CASE)
        );
        assert_eq!(
            program(vec![CHARS, 3, pair('\t', '*'), pair('A', '\0')]),
            c("\\t\\*\\x41")
        );
        assert_eq!(program(vec![CHAR, 0o101]), c("\\0101"));
        assert_eq!(program(vec![CHAR, 0x1a]), c("\\cz"));
    }

    #[test]
    fn held_back_before_quantifier() {
        assert_eq!(
            program(vec![CHARS, 2, pair('a', 'a'), STAR, CHAR, ch('a')]),
            c("aaa*")
        );
        assert_eq!(
            program(vec![CHAR, ch('a'), PLUS, CHAR, ch('\n')]),
            c("a\\n+")
        );
    }

    #[test]
    fn alternate() {
        assert_eq!(
            program(vec![BRANCH, 5, CHAR, ch('a'), JUMP, 3, CHAR, ch('b')]),
            c("a|b")
        );
        assert_eq!(
            program(vec![
                BRANCH,
                5,
                CHAR,
                ch('a'),
                JUMP,
                9,
                BRANCH,
                5,
                CHAR,
                ch('b'),
                JUMP,
                3,
                CHAR,
                ch('c'),
            ]),
            c("a|b|c")
        );
        // no branch at all without a second alternative
        assert_eq!(program(vec![CHAR, ch('a')]), c("(?:a)"));
    }

    #[test]
    fn simple_repeats() {
        assert_eq!(program(vec![STAR, CHAR, ch('a')]), c("a*"));
        assert_eq!(program(vec![MIN_STAR, CHAR, ch('a')]), c("a*?"));
        assert_eq!(program(vec![POS_STAR, CHAR, ch('a')]), c("a*+"));
        assert_eq!(program(vec![PLUS, DIGIT]), c("\\d+"));
        assert_eq!(program(vec![MIN_QUEST, ANY]), c(".??"));
        assert_eq!(program(vec![REP, 2, 3, CHAR, ch('a')]), c("a{2,3}"));
        assert_eq!(program(vec![POS_REP, 2, INF as u16, WORD]), c("\\w{2,}+"));
        assert_eq!(program(vec![CHAR, ch('a')]), c("a{1}"));
        assert_eq!(program(vec![STAR, CHAR, ch('a')]), c("a{}"));
        assert_eq!(c("a*"), c("a{0,}"));
        assert_eq!(c("a+"), c("a{1,}"));
        assert_eq!(c("a?"), c("a{,1}"));
    }

    #[test]
    fn complex_repeats() {
        let ab = pair('a', 'b');
        assert_eq!(
            program(vec![BRANCH, 6, CHARS, 2, ab, JUMP, off(-6)]),
            c("(?:ab)*")
        );
        assert_eq!(
            program(vec![BRANCHREV, 6, CHARS, 2, ab, JUMP, off(-6)]),
            c("(?:ab)*?")
        );
        assert_eq!(
            program(vec![CHARS, 2, ab, BRANCHREV, off(-4)]),
            c("(?:ab)+")
        );
        assert_eq!(program(vec![BRANCH, 4, CHARS, 2, ab]), c("(?:ab)?"));
        assert_eq!(
            program(vec![ZERO_0, CHARS, 2, ab, INCR_0, JUMPLT_0, 2, off(-6)]),
            c("(?:ab){2}")
        );
        assert_eq!(
            program(vec![
                ZERO_0,
                BRANCH,
                8,
                CHARS,
                2,
                ab,
                INCR_0,
                JUMPLT_0,
                3,
                off(-8)
            ]),
            c("(?:ab){,3}")
        );
        assert_eq!(
            program(vec![
                ZERO_0,
                CHARS,
                2,
                ab,
                INCR_0,
                JUMPLT_0,
                2,
                off(-6),
                BRANCHREV,
                off(-8)
            ]),
            c("(?:ab){2,}")
        );
        assert_eq!(
            program(vec![
                ZERO_0,
                CHARS,
                2,
                ab,
                INCR_0,
                JUMPLT_0,
                1,
                off(-6),
                JUMPGT_0,
                1,
                3,
                BRANCHREV,
                off(-11)
            ]),
            c("(?:ab){1,2}")
        );
        assert_eq!(
            program(vec![
                SUB_BEG_0 + 1,
                CHAR,
                ch('a'),
                SUB_END_0 + 1,
                BRANCH,
                off(-5)
            ]),
            c("(a)+?")
        );
    }

    #[test]
    fn groups() {
        assert_eq!(
            program(vec![SUB_BEG_0 + 1, CHAR, ch('a'), SUB_END_0 + 1, REF_0 + 1]),
            c("(a)\\1")
        );
        assert_eq!(
            program(vec![
                SUB_BEG_0 + 1,
                CHAR_CI,
                ch('a'),
                SUB_END_0 + 1,
                REF_CI_0 + 1,
            ]),
            cm("(A)\\1", CompileMode::CAPTURE | CompileMode::IGNORE_CASE)
        );
        assert_eq!(program(vec![CHAR, ch('a')]), cm("(a)", CompileMode::empty()));
        assert_eq!(
            program(vec![ATOMIC, 5, PLUS, CHAR, ch('a'), SUCCEED, CHAR, ch('a')]),
            c("(?>a+)a")
        );
        assert_eq!(
            program(vec![AHEAD_NEG, 4, CHAR, ch('a'), SUCCEED]),
            c("(?!a)")
        );
        assert_eq!(
            program(vec![
                BEHIND_POS,
                2,
                5,
                CHARS,
                2,
                pair('a', 'a'),
                SUCCEED,
                CHAR,
                ch('b')
            ]),
            c("(?<=aa)b")
        );
        assert_eq!(
            program(vec![CHAR_CI, ch('a'), CHAR, ch('b')]),
            c("(?ia)b")
        );
        assert_eq!(program(vec![ANY_NL, ANY]), c("(?n.)."));
    }

    #[test]
    fn anchors_and_classes() {
        assert_eq!(
            program(vec![
                LINE_BEG, WORD_BND, WORD_INT, STR_BEG, STR_END, WORD_BEG, WORD_END, LINE_END,
            ]),
            c("^\\b\\B\\A\\Z\\<\\>$")
        );
        assert_eq!(
            program(vec![NOT_DIGIT_NL, SPACE_NL, NOT_SPACE]),
            cm("\\D\\s\\S", CompileMode::NEWLINE)
        );
        assert_eq!(program(vec![UPPER, LOWER]), c("\\u\\U"));
    }

    fn set_of(s: &str, mode: CompileMode) -> (u16, crate::automata::charset::CharSet) {
        let words = cm(s, mode).expect("valid class");
        let mut set = crate::automata::charset::CharSet::new();
        for c in 0..=255u8 {
            if crate::automata::charset::contains(&words[2..18], c) {
                set.insert(c);
            }
        }
        (words[1], set)
    }

    #[test]
    fn charsets() {
        let (op, set) = set_of("[a-cx]", CompileMode::empty());
        assert_eq!(ANY_OF, op);
        assert!(set.contains(b'b') && set.contains(b'x'));
        assert!(!set.contains(b'd') && !set.contains(b'B'));

        let (_, set) = set_of("[a-c]", CompileMode::IGNORE_CASE);
        assert!(set.contains(b'B'));

        let (op, set) = set_of("[^a]", CompileMode::empty());
        assert_eq!(ANY_BUT, op);
        assert!(set.contains(b'\n'));
        let (_, set) = set_of("[^a]", CompileMode::NEWLINE);
        assert!(!set.contains(b'\n'));

        let (_, set) = set_of("[]-]", CompileMode::empty());
        assert!(set.contains(b']') && set.contains(b'-'));
        let (_, set) = set_of("[a-]", CompileMode::empty());
        assert!(set.contains(b'a') && set.contains(b'-'));

        let (_, set) = set_of("[\\d\\b[:upper:]]", CompileMode::empty());
        assert!(set.contains(b'5') && set.contains(8) && set.contains(b'Q'));
        assert!(!set.contains(b'q'));

        let (_, set) = set_of("[\\x30-\\x32]", CompileMode::empty());
        assert!(set.contains(b'1') && !set.contains(b'3'));
        assert!(c("[a-a]").is_ok());
    }

    #[test]
    fn verbatim() {
        assert_eq!(
            program(vec![CHARS, 3, pair('a', '*'), pair('(', '\0')]),
            cm("a*(", CompileMode::VERBATIM)
        );
        assert_eq!(program(vec![CHAR, ch('[')]), cm("[", CompileMode::VERBATIM));
    }

    #[test]
    fn syntax_only() {
        let compiled = compile(b"(a)(b)", CompileMode::SYNTAX | CompileMode::CAPTURE).unwrap();
        assert!(compiled.program.is_fallback());
        assert_eq!(3, compiled.groups);
        assert_eq!(Err(ErrorKind::Paren), cm("(a", CompileMode::SYNTAX));
    }

    #[test]
    fn errors() {
        assert_eq!(Err(ErrorKind::Empty), c(""));
        assert_eq!(Err(ErrorKind::Paren), c("(a"));
        assert_eq!(Err(ErrorKind::Paren), c("a)"));
        assert_eq!(Err(ErrorKind::Bracket), c("[a"));
        assert_eq!(Err(ErrorKind::Bracket), c("a]"));
        assert_eq!(Err(ErrorKind::Brace), c("a}"));
        assert_eq!(Err(ErrorKind::Brace), c("a{2"));
        assert_eq!(Err(ErrorKind::Range), c("[z-a]"));
        assert_eq!(Err(ErrorKind::Range), c("a{3,1}"));
        assert_eq!(Err(ErrorKind::Range), c("[a-\\d]"));
        assert_eq!(Err(ErrorKind::Count), c("a{0}"));
        assert_eq!(Err(ErrorKind::Count), c("a{,0}"));
        assert_eq!(Err(ErrorKind::Count), c("a{2,16385}"));
        assert_eq!(Err(ErrorKind::NoAtom), c("*a"));
        assert_eq!(Err(ErrorKind::NoAtom), c("^*"));
        assert_eq!(Err(ErrorKind::NoAtom), c("(?:a|)+"));
        assert_eq!(Err(ErrorKind::NoAtom), c("(a)\\1*"));
        assert_eq!(Err(ErrorKind::Repeat), c("a**"));
        assert_eq!(Err(ErrorKind::Repeat), c("a{2}{3}"));
        assert_eq!(Err(ErrorKind::BackRef), c("(a)\\2"));
        assert_eq!(Err(ErrorKind::BackRef), cm("(a)\\1", CompileMode::empty()));
        assert_eq!(Err(ErrorKind::Class), c("[[:vowel:]]"));
        assert_eq!(Err(ErrorKind::Class), c("[[:alpha]"));
        assert_eq!(Err(ErrorKind::Complex), c(&"(a)".repeat(10)));
        assert!(c(&"(a)".repeat(9)).is_ok());
        assert_eq!(Err(ErrorKind::Complex), c(&"(?:ab){2}".repeat(11)));
        assert_eq!(Err(ErrorKind::Behind), c("(?<=a+)b"));
        assert_eq!(Err(ErrorKind::Behind), c("(?<=a|bc)d"));
        assert_eq!(Err(ErrorKind::Possessive), c("(?:ab)++"));
        assert_eq!(Err(ErrorKind::Token), c("(?x)"));
        assert_eq!(Err(ErrorKind::Token), c("(?<x)"));
        assert_eq!(Err(ErrorKind::Token), c("\\0777"));
        assert_eq!(Err(ErrorKind::Escape), c("a\\"));
        assert_eq!(Err(ErrorKind::Escape), c("\\c1"));
        assert_eq!(Err(ErrorKind::Escape), c("\\xg"));
        assert_eq!(Err(ErrorKind::Escape), c("[\\"));
    }

    #[test]
    fn error_offsets() {
        let e = compile(b"ab)", CompileMode::empty()).unwrap_err();
        assert_eq!(ErrorKind::Paren, e.kind());
        assert_eq!(2, e.offset());
        let e = compile(b"a{3,1}", CompileMode::empty()).unwrap_err();
        assert_eq!(5, e.offset());
    }

    #[test]
    fn too_large() {
        let pattern = "a.".repeat(20000);
        assert_eq!(Err(ErrorKind::Complex), c(&pattern));
    }

    #[test]
    fn passes_agree() {
        let patterns = [
            "a",
            "abc|d|",
            "a*b+?c??d{2,5}+",
            "(a|b)*c",
            "(?:ab){2,7}?x",
            "(?:ab|cd){3}",
            "(?:a(?:bc){1,3}d)*",
            "[^a-z\\d[:punct:]]+",
            "(?<!xy)(?=z)\\w+\\b",
            "(?>a|ab)(c)\\1",
            "^\\<(\\w+)\\s+\\1\\>$",
            "a\\x41\\0101\\cA\\n*",
        ];
        for p in patterns {
            let words = c(p).expect(p);
            let size = measure(p.as_bytes(), CompileMode::CAPTURE).expect(p);
            assert_eq!(size, words.len(), "{}", p);
            assert_eq!(size, words[0] as usize, "{}", p);
        }
    }

    #[test]
    fn idempotent() {
        for p in ["(a+)\\1", "x(?:y|z){2,4}", "[[:alpha:]_]\\w*"] {
            assert_eq!(c(p), c(p));
        }
    }
}
