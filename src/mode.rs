use bitflags::bitflags;

bitflags! {
    /// Options that change how a pattern is compiled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompileMode: u32 {
        /// Plain parentheses capture their match.
        const CAPTURE = 1 << 0;
        /// Letters match regardless of ASCII case.
        const IGNORE_CASE = 1 << 1;
        /// `.`, negated classes and negated shorthands also match `\n`.
        const NEWLINE = 1 << 2;
        /// The whole pattern is a literal byte string.
        const VERBATIM = 1 << 3;
        /// Check the syntax only, producing no program.
        const SYNTAX = 1 << 4;
    }
}

bitflags! {
    /// Options that change how a program is executed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MatchMode: u32 {
        /// Try start offsets from the end of the window down to its start.
        const BACKWARD = 1 << 0;
        /// The subject start is not the beginning of a line.
        const NOT_BOL = 1 << 1;
        /// The subject end is not the end of a line.
        const NOT_EOL = 1 << 2;
        /// Reject matches of length zero.
        const NOT_EMPTY = 1 << 3;
    }
}

/// Bounds on the work a single search may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of pending choice points. Each one holds a saved
    /// search state on the heap, about 400 bytes.
    pub depth: usize,
    /// Maximum number of dispatched instructions, if any.
    pub steps: Option<u64>,
}

impl Limits {
    pub const DEFAULT_DEPTH: usize = 10_000;

    pub fn with_steps(steps: u64) -> Limits {
        Limits {
            steps: Some(steps),
            ..Limits::default()
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            depth: Limits::DEFAULT_DEPTH,
            steps: None,
        }
    }
}
