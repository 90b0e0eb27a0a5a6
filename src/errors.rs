use std::io;

use thiserror::Error;

/// The reason a pattern failed to compile.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The pattern has no bytes at all.
    Empty,
    Paren,
    Bracket,
    Brace,
    /// A reversed class range or counted repeat, e.g. `[z-a]` or `a{5,2}`.
    Range,
    Escape,
    /// A counted repeat bound that is zero or too large.
    Count,
    /// A quantifier with nothing (or only an empty-matching atom) in front of it.
    NoAtom,
    /// A quantifier following another quantifier, e.g. `a**`.
    Repeat,
    BackRef,
    Class,
    /// Too many groups, counted loops or program words.
    Complex,
    Memory,
    Token,
    /// A look-behind whose body does not have a fixed width.
    Behind,
    /// A possessive quantifier on a multi-instruction body.
    Possessive,
}

impl ErrorKind {
    fn description(&self) -> &'static str {
        match *self {
            ErrorKind::Empty => "empty pattern",
            ErrorKind::Paren => "unmatched parenthesis",
            ErrorKind::Bracket => "unmatched bracket",
            ErrorKind::Brace => "unmatched brace",
            ErrorKind::Range => "bad character range",
            ErrorKind::Escape => "bad escape sequence",
            ErrorKind::Count => "bad counted repeat",
            ErrorKind::NoAtom => "no atom preceding repetition",
            ErrorKind::Repeat => "repeat following repeat",
            ErrorKind::BackRef => "bad backward reference",
            ErrorKind::Class => "bad character class",
            ErrorKind::Complex => "expression too complex",
            ErrorKind::Memory => "out of memory",
            ErrorKind::Token => "illegal token",
            ErrorKind::Behind => "bad look-behind pattern",
            ErrorKind::Possessive => "possessive repeat of a complex expression",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A compile error together with the pattern offset where it was detected.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("{kind} at offset {offset}")]
pub struct Error {
    kind: ErrorKind,
    offset: usize,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Error {
        Error { kind, offset }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Errors raised while loading a serialized program.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program")]
    Io(#[from] io::Error),
    #[error("program length word {stored} does not match {actual} words")]
    Length { stored: usize, actual: usize },
    #[error("unknown opcode {op} at word {at}")]
    BadOpcode { op: u16, at: usize },
    #[error("instruction at word {at} runs past the end of the program")]
    Truncated { at: usize },
    #[error("jump at word {at} leaves the program")]
    BadTarget { at: usize },
    #[error("program does not end with END or FAIL")]
    Unterminated,
    #[error("loop closed at word {at} can repeat without reading a byte")]
    EmptyLoop { at: usize },
}

/// A search aborted by an execution limit rather than by not matching.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum MatchError {
    #[error("backtracking depth exceeded {0}")]
    DepthLimit(usize),
    #[error("step budget of {0} instructions exhausted")]
    StepLimit(u64),
}
