//! Backtracking regular expressions over bytes.
//!
//! Patterns compile into a compact program of 16 bit words which a
//! backtracking interpreter runs against a subject. A compiled [`Regex`] is
//! immutable and may be shared between threads.

pub mod automata;
pub mod errors;
pub mod executor;
pub mod mode;
mod regex;
mod substitute;

pub use crate::automata::program::Program;
pub use crate::errors::{Error, ErrorKind, MatchError, ProgramError};
pub use crate::executor::Captures;
pub use crate::mode::{CompileMode, Limits, MatchMode};
pub use crate::regex::Regex;
