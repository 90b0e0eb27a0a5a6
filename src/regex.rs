use std::io::{self, Read, Write};

use log::warn;

use crate::automata::compiler::compile;
use crate::automata::program::Program;
use crate::errors::{Error, MatchError, ProgramError};
use crate::executor::{Captures, Executor};
use crate::mode::{CompileMode, Limits, MatchMode};

/// A compiled regular expression.
///
/// An expression that was never compiled, or whose last compilation failed,
/// holds the fallback program and never matches.
#[derive(Debug, Clone, Default)]
pub struct Regex {
    program: Program,
    groups: usize,
}

impl Regex {
    /// Compile `pat` with capturing parentheses.
    pub fn new(pat: &str) -> Result<Regex, Error> {
        Regex::with_mode(pat.as_bytes(), CompileMode::CAPTURE)
    }

    pub fn with_mode(pattern: &[u8], mode: CompileMode) -> Result<Regex, Error> {
        let mut re = Regex::default();
        re.parse(pattern, mode)?;
        Ok(re)
    }

    /// Recompile in place. On error the expression is reset to the fallback.
    pub fn parse(&mut self, pattern: &[u8], mode: CompileMode) -> Result<(), Error> {
        match compile(pattern, mode) {
            Ok(compiled) => {
                self.program = compiled.program;
                self.groups = compiled.groups;
                Ok(())
            }
            Err(err) => {
                *self = Regex::default();
                Err(err)
            }
        }
    }

    /// Check the syntax of `pattern`, returning the capture slots it would use.
    pub fn check(pattern: &[u8], mode: CompileMode) -> Result<usize, Error> {
        compile(pattern, mode | CompileMode::SYNTAX).map(|c| c.groups)
    }

    pub fn from_program(program: Program) -> Regex {
        let groups = program.capture_count();
        Regex { program, groups }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn is_fallback(&self) -> bool {
        self.program.is_fallback()
    }

    /// Capture slots a match fills, counting the whole match as one.
    pub fn capture_count(&self) -> usize {
        self.groups.max(1)
    }

    /// Search `subject` for a match starting in `from..=to`.
    ///
    /// A search that runs into the default [`Limits`] is logged and reported
    /// as no match.
    ///
    /// # Panics
    ///
    /// If `ngroups` is not in `1..=10`.
    pub fn search(
        &self,
        subject: &[u8],
        from: usize,
        to: usize,
        mode: MatchMode,
        ngroups: usize,
    ) -> Option<Captures> {
        match self.try_search(subject, from, to, mode, ngroups, &Limits::default()) {
            Ok(found) => found,
            Err(err) => {
                warn!("search abandoned: {}", err);
                None
            }
        }
    }

    pub fn try_search(
        &self,
        subject: &[u8],
        from: usize,
        to: usize,
        mode: MatchMode,
        ngroups: usize,
        limits: &Limits,
    ) -> Result<Option<Captures>, MatchError> {
        Executor::new(&self.program, subject, mode, *limits).execute(from, to, ngroups)
    }

    pub fn is_match(&self, subject: &[u8]) -> bool {
        self.find(subject).is_some()
    }

    /// Range of the leftmost match.
    pub fn find(&self, subject: &[u8]) -> Option<(usize, usize)> {
        self.search(subject, 0, subject.len(), MatchMode::empty(), 1)
            .map(|caps| caps.whole())
    }

    pub fn captures(&self, subject: &[u8]) -> Option<Captures> {
        self.search(
            subject,
            0,
            subject.len(),
            MatchMode::empty(),
            self.capture_count(),
        )
    }

    /// Replace the leftmost match with the expanded `template`.
    pub fn replace(&self, subject: &[u8], template: &[u8]) -> Vec<u8> {
        match self.captures(subject) {
            Some(caps) => {
                let (b, e) = caps.whole();
                let mut out = subject[..b].to_vec();
                out.extend(caps.expand(subject, template));
                out.extend_from_slice(&subject[e..]);
                out
            }
            None => subject.to_vec(),
        }
    }

    /// Replace every non-overlapping match with the expanded `template`.
    pub fn replace_all(&self, subject: &[u8], template: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(subject.len());
        let mut last = 0;
        let mut pos = 0;
        while pos <= subject.len() {
            let caps = match self.search(
                subject,
                pos,
                subject.len(),
                MatchMode::empty(),
                self.capture_count(),
            ) {
                Some(caps) => caps,
                None => break,
            };
            let (b, e) = caps.whole();
            out.extend_from_slice(&subject[last..b]);
            out.extend(caps.expand(subject, template));
            last = e;
            pos = e;
            if b == e {
                // step over the byte after an empty match
                if let Some(&c) = subject.get(e) {
                    out.push(c);
                }
                last = e + 1;
                pos = e + 1;
            }
        }
        if last < subject.len() {
            out.extend_from_slice(&subject[last..]);
        }
        out
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.program.write_to(w)
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Regex, ProgramError> {
        Program::read_from(r).map(Regex::from_program)
    }
}

impl PartialEq for Regex {
    fn eq(&self, other: &Self) -> bool {
        self.program == other.program
    }
}

impl Eq for Regex {}
