use log::trace;

use crate::automata::{
    charset::{self, is_word},
    compiler::{INF, NSUBEXP},
    opcode::{self, *},
    program::Program,
};
use crate::errors::MatchError;
use crate::mode::{Limits, MatchMode};

type Result<T> = std::result::Result<T, MatchError>;

/// Capture offsets of a successful match; group 0 is the whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures {
    slots: Vec<Option<(usize, usize)>>,
}

impl Captures {
    /// Byte range of group `i`, if it took part in the match.
    pub fn get(&self, i: usize) -> Option<(usize, usize)> {
        self.slots.get(i).copied().flatten()
    }

    pub fn whole(&self) -> (usize, usize) {
        self.slots[0].unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<(usize, usize)>> + '_ {
        self.slots.iter().copied()
    }
}

/// Everything a match attempt may change, restored at choice points.
#[derive(Debug, Clone, Copy)]
struct State {
    cur: usize,
    slots: [(Option<usize>, Option<usize>); NSUBEXP],
    count: [u32; NSUBEXP],
}

impl State {
    fn at(cur: usize) -> State {
        State {
            cur,
            slots: [(None, None); NSUBEXP],
            count: [0; NSUBEXP],
        }
    }
}

/// A way to continue once the current path fails.
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// Resume at `pc`.
    Retry { pc: usize, state: State },
    /// End points `lo..=hi` of a simple repeat that were not tried yet.
    Repeat {
        next: usize,
        state: State,
        lo: usize,
        hi: usize,
        lazy: bool,
    },
    /// An atomic group or look-around whose body is running.
    Guard {
        op: u16,
        target: usize,
        state: State,
    },
}

/// Backtracking interpreter for one program over one subject.
///
/// Choice points live on a heap `trail`, so the native stack stays flat
/// however deep the search goes. [`Limits::depth`] caps the trail length.
pub struct Executor<'a> {
    code: &'a [u16],
    subject: &'a [u8],
    mode: MatchMode,
    limits: Limits,
    state: State,
    trail: Vec<Frame>,
    start: usize,
    steps: u64,
}

impl<'a> Executor<'a> {
    pub fn new(program: &'a Program, subject: &'a [u8], mode: MatchMode, limits: Limits) -> Self {
        Executor {
            code: program.words(),
            subject,
            mode,
            limits,
            state: State::at(0),
            trail: vec![],
            start: 0,
            steps: 0,
        }
    }

    /// Try start offsets in `from..=to` until one matches.
    ///
    /// The window is clamped to the subject. With [`MatchMode::BACKWARD`] the
    /// offsets are tried from `to` down to `from`.
    pub fn execute(&mut self, from: usize, to: usize, ngroups: usize) -> Result<Option<Captures>> {
        assert!(
            (1..=NSUBEXP).contains(&ngroups),
            "group count {} outside 1..={}",
            ngroups,
            NSUBEXP
        );
        let to = to.min(self.subject.len());
        let from = from.min(to);
        trace!("searching {}..={} of {} bytes", from, to, self.subject.len());

        if self.mode.contains(MatchMode::BACKWARD) {
            for at in (from..=to).rev() {
                if self.attempt(at)? {
                    return Ok(Some(self.captures(ngroups)));
                }
            }
        } else {
            for at in from..=to {
                if self.attempt(at)? {
                    return Ok(Some(self.captures(ngroups)));
                }
            }
        }
        Ok(None)
    }

    /// Run the program anchored at `at`.
    pub fn attempt(&mut self, at: usize) -> Result<bool> {
        self.state = State::at(at);
        self.trail.clear();
        self.start = at;
        self.run()
    }

    fn captures(&self, ngroups: usize) -> Captures {
        let mut slots = vec![None; ngroups];
        slots[0] = Some((self.start, self.state.cur));
        for (n, slot) in slots.iter_mut().enumerate().skip(1) {
            if let (Some(b), Some(e)) = self.state.slots[n] {
                *slot = Some((b, e));
            }
        }
        Captures { slots }
    }

    fn tick(&mut self) -> Result<()> {
        if let Some(limit) = self.limits.steps {
            self.steps += 1;
            if self.steps > limit {
                return Err(MatchError::StepLimit(limit));
            }
        }
        Ok(())
    }

    fn jump(&self, operand: usize) -> usize {
        operand.wrapping_add_signed(self.code[operand] as i16 as isize)
    }

    fn push(&mut self, frame: Frame) -> Result<()> {
        if self.trail.len() >= self.limits.depth {
            return Err(MatchError::DepthLimit(self.limits.depth));
        }
        self.trail.push(frame);
        Ok(())
    }

    /// Remember the current state so the search can resume at `pc`.
    fn retry(&mut self, pc: usize) -> Result<()> {
        let state = self.state;
        self.push(Frame::Retry { pc, state })
    }

    fn guard(&mut self, op: u16, target: usize) -> Result<()> {
        let state = self.state;
        self.push(Frame::Guard { op, target, state })
    }

    /// Restore the newest choice point and return where to resume, or `None`
    /// once every choice is used up.
    fn backtrack(&mut self) -> Option<usize> {
        while let Some(frame) = self.trail.pop() {
            match frame {
                Frame::Retry { pc, state } => {
                    self.state = state;
                    return Some(pc);
                }
                Frame::Repeat {
                    next,
                    state,
                    lo,
                    hi,
                    lazy,
                } => {
                    let at = if lazy { lo } else { hi };
                    if lo < hi {
                        let (lo, hi) = if lazy { (lo + 1, hi) } else { (lo, hi - 1) };
                        self.trail.push(Frame::Repeat {
                            next,
                            state,
                            lo,
                            hi,
                            lazy,
                        });
                    }
                    self.state = state;
                    self.state.cur = at;
                    return Some(next);
                }
                // a negative look-around holds once its body has failed
                Frame::Guard {
                    op: AHEAD_NEG | BEHIND_NEG,
                    target,
                    state,
                } => {
                    self.state = state;
                    return Some(target);
                }
                Frame::Guard { .. } => {}
            }
        }
        None
    }

    /// Close the innermost atomic group or look-around whose body just
    /// matched, dropping the choice points left inside it.
    fn succeed(&mut self) -> Option<usize> {
        let at = self
            .trail
            .iter()
            .rposition(|f| matches!(f, Frame::Guard { .. }))?;
        let frame = self.trail[at];
        self.trail.truncate(at);
        match frame {
            Frame::Guard {
                op: ATOMIC,
                target,
                ..
            } => Some(target),
            Frame::Guard {
                op: AHEAD_POS | BEHIND_POS,
                target,
                state,
            } => {
                self.state.cur = state.cur;
                Some(target)
            }
            _ => None,
        }
    }

    /// Does the single-byte test at `pc` accept `c`?
    fn single(&self, pc: usize, c: u8) -> bool {
        let code = self.code;
        let nl = c == b'\n';
        match code[pc] {
            ANY_OF => charset::contains(&code[pc + 1..pc + 1 + SET_WORDS], c),
            ANY_BUT => !charset::contains(&code[pc + 1..pc + 1 + SET_WORDS], c),
            ANY => !nl,
            ANY_NL => true,
            SPACE => !nl && charset::is_space(c),
            SPACE_NL => charset::is_space(c),
            NOT_SPACE => !charset::is_space(c),
            DIGIT => charset::is_digit(c),
            NOT_DIGIT => !nl && !charset::is_digit(c),
            NOT_DIGIT_NL => !charset::is_digit(c),
            LETTER => charset::is_letter(c),
            NOT_LETTER => !nl && !charset::is_letter(c),
            NOT_LETTER_NL => !charset::is_letter(c),
            WORD => is_word(c),
            NOT_WORD => !nl && !is_word(c),
            NOT_WORD_NL => !is_word(c),
            HEX => charset::is_hex(c),
            NOT_HEX => !nl && !charset::is_hex(c),
            NOT_HEX_NL => !charset::is_hex(c),
            PUNCT => charset::is_delim(c),
            NOT_PUNCT => !nl && !charset::is_delim(c),
            NOT_PUNCT_NL => !charset::is_delim(c),
            UPPER => charset::is_upper(c),
            LOWER => charset::is_lower(c),
            CHAR => c as u16 == code[pc + 1],
            CHAR_CI => c.to_ascii_lowercase() as u16 == code[pc + 1],
            _ => false,
        }
    }

    /// Length of the literal run at `pc` if the subject continues with it.
    fn chars(&self, pc: usize) -> Option<usize> {
        let code = self.code;
        let cur = self.state.cur;
        let n = code[pc + 1] as usize;
        let got = self.subject.get(cur..cur + n)?;
        let words = &code[pc + 2..];
        for (i, &c) in got.iter().enumerate() {
            let w = words[i / 2];
            let want = if i % 2 == 0 { w as u8 } else { (w >> 8) as u8 };
            let c = if code[pc] == CHARS_CI {
                c.to_ascii_lowercase()
            } else {
                c
            };
            if c != want {
                return None;
            }
        }
        Some(n)
    }

    /// Length of the text captured by the group `op` refers to, if the
    /// subject continues with it.
    fn backref(&self, op: u16) -> Option<usize> {
        let s = self.subject;
        let cur = self.state.cur;
        let (b, e) = match self.state.slots[opcode::index(op)] {
            (Some(b), Some(e)) if b <= e => (b, e),
            _ => return None,
        };
        let got = s.get(cur..cur + (e - b))?;
        let same = if op >= REF_CI_0 {
            s[b..e].eq_ignore_ascii_case(got)
        } else {
            s[b..e] == *got
        };
        same.then_some(e - b)
    }

    fn run(&mut self) -> Result<bool> {
        let code = self.code;
        let s = self.subject;
        let mut pc = 1;
        loop {
            self.tick()?;
            let cur = self.state.cur;
            let op = code[pc];
            let next = match op {
                END => {
                    if !(self.mode.contains(MatchMode::NOT_EMPTY) && cur == self.start) {
                        return Ok(true);
                    }
                    None
                }
                FAIL => None,
                SUCCEED => self.succeed(),
                JUMP => Some(self.jump(pc + 1)),
                BRANCH => {
                    let alt = self.jump(pc + 1);
                    self.retry(alt)?;
                    Some(pc + 2)
                }
                BRANCHREV => {
                    self.retry(pc + 2)?;
                    Some(self.jump(pc + 1))
                }
                LINE_BEG => {
                    let ok = if cur > 0 {
                        s[cur - 1] == b'\n'
                    } else {
                        !self.mode.contains(MatchMode::NOT_BOL)
                    };
                    ok.then_some(pc + 1)
                }
                LINE_END => {
                    let ok = if cur < s.len() {
                        s[cur] == b'\n'
                    } else {
                        !self.mode.contains(MatchMode::NOT_EOL)
                    };
                    ok.then_some(pc + 1)
                }
                WORD_BEG..=WORD_INT => {
                    let before = cur > 0 && is_word(s[cur - 1]);
                    let after = cur < s.len() && is_word(s[cur]);
                    let ok = match op {
                        WORD_BEG => !before && after,
                        WORD_END => before && !after,
                        WORD_BND => before != after,
                        _ => before && after,
                    };
                    ok.then_some(pc + 1)
                }
                STR_BEG => (cur == 0).then_some(pc + 1),
                STR_END => (cur == s.len()).then_some(pc + 1),
                ANY_OF..=LOWER | CHAR | CHAR_CI => {
                    if cur < s.len() && self.single(pc, s[cur]) {
                        self.state.cur += 1;
                        Some(pc + opcode::width(code, pc).unwrap_or(1))
                    } else {
                        None
                    }
                }
                CHARS | CHARS_CI => self.chars(pc).map(|n| {
                    self.state.cur += n;
                    pc + 2 + (n + 1) / 2
                }),
                STAR..=POS_REP => self.repeat(pc)?,
                SUB_BEG_0..=SUB_BEG_9 => {
                    self.state.slots[opcode::index(op)] = (Some(cur), None);
                    Some(pc + 1)
                }
                SUB_END_0..=SUB_END_9 => {
                    self.state.slots[opcode::index(op)].1 = Some(cur);
                    Some(pc + 1)
                }
                REF_0..=REF_CI_9 => self.backref(op).map(|n| {
                    self.state.cur += n;
                    pc + 1
                }),
                AHEAD_NEG | AHEAD_POS | ATOMIC => {
                    let target = self.jump(pc + 1);
                    self.guard(op, target)?;
                    Some(pc + 2)
                }
                BEHIND_NEG | BEHIND_POS => {
                    let width = code[pc + 1] as usize;
                    let target = self.jump(pc + 2);
                    if cur >= width {
                        self.guard(op, target)?;
                        self.state.cur = cur - width;
                        Some(pc + 3)
                    } else if op == BEHIND_NEG {
                        Some(target)
                    } else {
                        None
                    }
                }
                ZERO_0..=ZERO_9 => {
                    self.state.count[opcode::index(op)] = 0;
                    Some(pc + 1)
                }
                INCR_0..=INCR_9 => {
                    self.state.count[opcode::index(op)] += 1;
                    Some(pc + 1)
                }
                JUMPLT_0..=JUMPGT_9 => {
                    let count = self.state.count[opcode::index(op)];
                    let bound = code[pc + 1] as u32;
                    let taken = if op <= JUMPLT_9 {
                        count < bound
                    } else {
                        count > bound
                    };
                    Some(if taken { self.jump(pc + 2) } else { pc + 3 })
                }
                _ => None,
            };
            pc = match next {
                Some(next) => next,
                None => match self.backtrack() {
                    Some(next) => next,
                    None => return Ok(false),
                },
            };
        }
    }

    /// Measure how far the wrapped single-byte test reaches, then continue
    /// from the first admissible end point, leaving the others as a choice.
    fn repeat(&mut self, pc: usize) -> Result<Option<usize>> {
        let code = self.code;
        let op = code[pc];
        let (min, max, greed, wrapped) = match op {
            REP..=POS_REP => (code[pc + 1] as u32, code[pc + 2] as u32, op - REP, pc + 3),
            _ => {
                let (min, max) = match (op - STAR) / 3 {
                    0 => (0, INF),
                    1 => (1, INF),
                    _ => (0, 1),
                };
                (min, max, (op - STAR) % 3, pc + 1)
            }
        };
        let next = wrapped + opcode::width(code, wrapped).unwrap_or(1);

        let s = self.subject;
        let cur = self.state.cur;
        let min = min as usize;
        let avail = s.len() - cur;
        if min > avail {
            return Ok(None);
        }
        let limit = if max >= INF {
            s.len()
        } else {
            cur + (max as usize).min(avail)
        };
        let mut end = cur;
        while end < limit && self.single(wrapped, s[end]) {
            end += 1;
        }
        let lo = cur + min;
        if end < lo {
            return Ok(None);
        }

        let state = self.state;
        let at = match greed {
            0 => {
                if lo < end {
                    self.push(Frame::Repeat {
                        next,
                        state,
                        lo,
                        hi: end - 1,
                        lazy: false,
                    })?;
                }
                end
            }
            1 => {
                if lo < end {
                    self.push(Frame::Repeat {
                        next,
                        state,
                        lo: lo + 1,
                        hi: end,
                        lazy: true,
                    })?;
                }
                lo
            }
            _ => end,
        };
        self.state.cur = at;
        Ok(Some(next))
    }
}
