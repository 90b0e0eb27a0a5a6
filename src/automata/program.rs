use std::{
    borrow::Cow,
    fmt,
    io::{self, Read, Write},
};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::automata::opcode::{self, *};
use crate::errors::ProgramError;

/// The program every uncompiled or invalid expression runs: it never matches.
static FALLBACK: [u16; 2] = [2, FAIL];

/// Largest program the 16 bit relative offsets can address.
pub const MAX_WORDS: usize = i16::MAX as usize;

/// A compiled expression: a flat sequence of 16 bit words whose first word
/// holds the total length.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Program {
    code: Cow<'static, [u16]>,
}

impl Program {
    pub fn fallback() -> Program {
        Program {
            code: Cow::Borrowed(&FALLBACK),
        }
    }

    /// Wrap words produced by the compiler, which are valid by construction.
    pub(crate) fn from_compiled(code: Vec<u16>) -> Program {
        debug_assert_eq!(Ok(()), validate(&code).map_err(|e| e.to_string()));
        Program {
            code: Cow::Owned(code),
        }
    }

    /// Load a program from its words.
    ///
    /// Lengths, opcodes, operands and jump targets are checked, and a loop
    /// whose body has no byte test is rejected. That does not prove every
    /// search ends: a loop that only reads inside a look-around still loads,
    /// so run programs from untrusted sources under [`Limits::with_steps`].
    ///
    /// [`Limits::with_steps`]: crate::mode::Limits::with_steps
    pub fn from_words(words: Vec<u16>) -> Result<Program, ProgramError> {
        validate(&words)?;
        if words[..] == FALLBACK[..] {
            return Ok(Program::fallback());
        }
        Ok(Program {
            code: Cow::Owned(words),
        })
    }

    pub fn is_fallback(&self) -> bool {
        self.code[..] == FALLBACK[..]
    }

    pub fn words(&self) -> &[u16] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Number of capture slots the program fills, including the whole match.
    pub fn capture_count(&self) -> usize {
        self.instructions()
            .filter_map(|at| match self.code[at] {
                op @ SUB_BEG_0..=SUB_BEG_9 => Some(opcode::index(op) + 1),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }

    /// Start offsets of each instruction in program order.
    fn instructions(&self) -> impl Iterator<Item = usize> + '_ {
        let code = self.words();
        let mut at = 1;
        std::iter::from_fn(move || {
            if at >= code.len() {
                return None;
            }
            let here = at;
            at += opcode::width(code, at)?;
            Some(here)
        })
    }

    /// Save the program words in host byte order.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for &word in self.words() {
            w.write_u16::<NativeEndian>(word)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Program, ProgramError> {
        let len = r.read_u16::<NativeEndian>()? as usize;
        if len < 2 {
            return Err(ProgramError::Length {
                stored: len,
                actual: 1,
            });
        }
        let mut words = vec![0; len];
        words[0] = len as u16;
        r.read_u16_into::<NativeEndian>(&mut words[1..])?;
        Program::from_words(words)
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::fallback()
    }
}

fn validate(code: &[u16]) -> Result<(), ProgramError> {
    let stored = code.first().copied().unwrap_or(0) as usize;
    if stored != code.len() || code.len() < 2 || code.len() > MAX_WORDS {
        return Err(ProgramError::Length {
            stored,
            actual: code.len(),
        });
    }

    let mut starts = vec![false; code.len() + 1];
    let mut last = 1;
    let mut at = 1;
    while at < code.len() {
        let op = code[at];
        let w = match opcode::width(code, at) {
            Some(w) => w,
            None if op <= JUMPGT_9 => return Err(ProgramError::Truncated { at }),
            None => return Err(ProgramError::BadOpcode { op, at }),
        };
        if at + w > code.len() {
            return Err(ProgramError::Truncated { at });
        }
        starts[at] = true;
        last = at;
        at += w;
    }
    if !matches!(code[last], END | FAIL) {
        return Err(ProgramError::Unterminated);
    }

    for at in (1..code.len()).filter(|&at| starts[at]) {
        let op = code[at];
        if let STAR..=POS_REP = op {
            let next = at + opcode::width(code, at).unwrap_or(1);
            match code.get(next) {
                Some(&wrapped) if starts[next] && opcode::is_single(wrapped) => {}
                _ => {
                    return Err(ProgramError::BadOpcode {
                        op: code.get(next).copied().unwrap_or(op),
                        at: next,
                    })
                }
            }
        }
        if let Some(operand) = opcode::offset_operand(op) {
            let t = match opcode::target(code, at + operand) {
                Some(t) if t < code.len() && starts[t] => t,
                _ => return Err(ProgramError::BadTarget { at }),
            };
            if t <= at && !consumes(code, t, at) {
                return Err(ProgramError::EmptyLoop { at });
            }
        }
    }
    Ok(())
}

/// Does some instruction starting in `from..=to` always read a byte?
fn consumes(code: &[u16], from: usize, to: usize) -> bool {
    let mut at = from;
    while at <= to {
        match code[at] {
            CHARS | CHARS_CI if code[at + 1] > 0 => return true,
            PLUS..=POS_PLUS => return true,
            REP..=POS_REP if code[at + 1] > 0 => return true,
            // the test wrapped by an optional repeat may read nothing
            STAR..=POS_REP => at += opcode::width(code, at).unwrap_or(1),
            op if opcode::is_single(op) => return true,
            _ => {}
        }
        at += opcode::width(code, at).unwrap_or(1);
    }
    false
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.words();
        writeln!(f, "Program({} words)", code.len())?;
        for at in self.instructions() {
            let op = code[at];
            write!(f, "{:5} {}", at, opcode::name(op))?;
            match op {
                CHAR | CHAR_CI => write!(f, " '{}'", (code[at + 1] as u8).escape_ascii())?,
                CHARS | CHARS_CI => {
                    let n = code[at + 1] as usize;
                    let bytes: Vec<u8> = code[at + 2..]
                        .iter()
                        .flat_map(|w| [*w as u8, (*w >> 8) as u8])
                        .take(n)
                        .collect();
                    write!(f, " \"{}\"", bytes.escape_ascii())?
                }
                REP..=POS_REP => write!(f, " {{{},{}}}", code[at + 1], code[at + 2])?,
                BEHIND_NEG | BEHIND_POS => write!(f, " width {}", code[at + 1])?,
                JUMPLT_0..=JUMPGT_9 => write!(f, "_{} {}", opcode::index(op), code[at + 1])?,
                SUB_BEG_0..=INCR_9 => write!(f, "_{}", opcode::index(op))?,
                _ => {}
            }
            if let Some(operand) = opcode::offset_operand(op) {
                if let Some(t) = opcode::target(code, at + operand) {
                    write!(f, " -> {}", t)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
