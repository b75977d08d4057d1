//! Running a tagged DFA over an input buffer.
//!
//! Both executors behave exactly like the C emitted for the automaton:
//! the input is read up to the first NUL byte (or its end), which is seen as
//! the terminator symbol, and matches are resolved with the same
//! longest-match rule. `Dfa` walks the constructed states; `Lazy` recomputes
//! closures from the program at every step without merging states, which
//! makes it a reference for the construction.

use std::collections::HashMap;
use std::ops::Range;

use tracing::trace;

use crate::automata::action::{Action, MapItem, TdfaInsn};
use crate::automata::dfa::{
    choose_accept, compute_action, compute_finalizer, edge_table, AcceptPolicy, Dfa, StateId,
    FAIL_OUTCOME, SUCCESS_OUTCOME,
};
use crate::automata::kernel::{te_closure, Kernel};
use crate::automata::program::{symbol, Program};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutorType {
    Dfa,
    Lazy,
}

pub struct Executor {
    typ: ExecutorType,
}

impl Executor {
    pub fn new(typ: ExecutorType) -> Executor {
        Executor { typ }
    }

    pub fn exec(&self, dfa: &Dfa, input: &[u8]) -> Match {
        match self.typ {
            ExecutorType::Dfa => run(&DfaExecutor { dfa }, dfa.ntags, input),
            ExecutorType::Lazy => run(
                &LazyExecutor {
                    program: &dfa.program,
                    ntags: dfa.ntags,
                    policy: dfa.accept_policy,
                },
                dfa.ntags,
                input,
            ),
        }
    }
}

/// The result of a run.
///
/// Without tags `outcome` is the outcome of the accepting state that ended
/// the run, if any. With tags it is `SUCCESS_OUTCOME` when a match was
/// recorded and `FAIL_OUTCOME` otherwise, and `tags` holds the recorded
/// positions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Match {
    pub outcome: Option<usize>,
    pub tags: Vec<Option<usize>>,
}

impl Match {
    pub fn is_success(&self) -> bool {
        self.outcome == Some(SUCCESS_OUTCOME)
    }

    /// Byte range of group `i`, group 0 being the whole match.
    pub fn group(&self, i: usize) -> Option<Range<usize>> {
        let start = (*self.tags.get(2 * i)?)?;
        let end = (*self.tags.get(2 * i + 1)?)?;
        if start <= end {
            Some(start..end)
        } else {
            None
        }
    }
}

/// The state machine a run walks.
trait Automaton {
    type State;

    /// Runs the initializer and returns the initial state.
    fn init(&self, regs: &mut Registers) -> Self::State;

    /// Takes the transition on `c`, running its action.
    fn step(&self, state: &Self::State, c: u8, regs: &mut Registers) -> Self::State;

    /// The outcome and finalizer of an accepting state.
    fn accepting(&self, state: &Self::State) -> Option<(usize, Action)>;

    fn is_dead(&self, state: &Self::State) -> bool;
}

struct DfaExecutor<'a> {
    dfa: &'a Dfa,
}

impl Automaton for DfaExecutor<'_> {
    type State = StateId;

    fn init(&self, regs: &mut Registers) -> StateId {
        regs.apply(&self.dfa.initializer);
        self.dfa.start().label
    }

    fn step(&self, state: &StateId, c: u8, regs: &mut Registers) -> StateId {
        let span = self.dfa.state(*state).span_for(c);
        regs.apply(&span.action);
        span.to
    }

    fn accepting(&self, state: &StateId) -> Option<(usize, Action)> {
        let s = self.dfa.state(*state);
        if s.accepts {
            Some((s.accept_outcome, s.finalizer.clone()))
        } else {
            None
        }
    }

    fn is_dead(&self, state: &StateId) -> bool {
        self.dfa.state(*state).is_dead()
    }
}

struct LazyExecutor<'a> {
    program: &'a Program,
    ntags: usize,
    policy: AcceptPolicy,
}

impl Automaton for LazyExecutor<'_> {
    type State = Kernel;

    fn init(&self, regs: &mut Registers) -> Kernel {
        let initial = te_closure(
            self.program,
            &Kernel::single(self.program.start),
            self.ntags,
            true,
        );
        regs.apply(&compute_action(None, &initial));
        initial
    }

    fn step(&self, state: &Kernel, c: u8, regs: &mut Registers) -> Kernel {
        let (edge_begin, edge_end) = edge_table(self.program, state);
        let c = c as usize;
        let next = te_closure(self.program, &edge_end[c], self.ntags, false);
        regs.apply(&compute_action(Some(&edge_begin[c]), &next));
        next
    }

    fn accepting(&self, state: &Kernel) -> Option<(usize, Action)> {
        let (outcome, idx) = choose_accept(self.program, state, self.policy)?;
        Some((outcome, compute_finalizer(&state.0[idx])))
    }

    fn is_dead(&self, state: &Kernel) -> bool {
        state.is_empty()
    }
}

/// Slot storage and output tags, indexed the way the emitted C indexes
/// `YYTAG` and `YYFINAL`.
struct Registers {
    slots: HashMap<MapItem, usize>,
    finals: Vec<Option<usize>>,
    pos: usize,
}

impl Registers {
    fn new(ntags: usize) -> Registers {
        Registers {
            slots: HashMap::new(),
            finals: vec![None; ntags],
            pos: 0,
        }
    }

    fn apply(&mut self, action: &Action) {
        for insn in action.iter() {
            match *insn {
                TdfaInsn::SavePos { to } => {
                    self.slots.insert(to, self.pos);
                }
                TdfaInsn::Copy { to, from } => match self.slots.get(&from).copied() {
                    Some(v) => {
                        self.slots.insert(to, v);
                    }
                    None => {
                        self.slots.remove(&to);
                    }
                },
                TdfaInsn::SaveTag { tag, from } => {
                    self.finals[tag] = self.slots.get(&from).copied();
                }
            }
        }
    }

    /// Replaces the recorded match with the one `finalizer` describes,
    /// unless the recorded one starts elsewhere or is at least as long.
    fn longest_match(&mut self, ntags: usize, finalizer: &Action) {
        let update = match (self.finals[0], finalizer.tag_zero_source()) {
            (None, _) => true,
            (Some(start), Some(m)) if ntags > 1 => {
                let end = self.finals[1].map_or(-1, |e| e as i64);
                let candidate = self.slots.get(&m).map_or(-1, |&s| s as i64);
                candidate == start as i64
                    && (self.pos as i64 - candidate) > (end - start as i64)
            }
            (Some(_), _) => false,
        };
        if update {
            self.finals.iter_mut().for_each(|t| *t = None);
            self.apply(finalizer);
        }
    }

    fn finish(self, ntags: usize, accepted: Option<usize>) -> Match {
        if ntags == 0 {
            return Match {
                outcome: accepted,
                tags: vec![],
            };
        }
        let outcome = if self.finals[0].is_some() {
            SUCCESS_OUTCOME
        } else {
            FAIL_OUTCOME
        };
        Match {
            outcome: Some(outcome),
            tags: self.finals,
        }
    }
}

fn run<A: Automaton>(a: &A, ntags: usize, input: &[u8]) -> Match {
    let mut regs = Registers::new(ntags);
    let mut state = a.init(&mut regs);
    if let Some((outcome, finalizer)) = a.accepting(&state) {
        regs.apply(&finalizer);
        if ntags == 0 {
            return regs.finish(ntags, Some(outcome));
        }
    }

    loop {
        let c = input.get(regs.pos).map_or(0, |&b| symbol(b));
        trace!(pos = regs.pos, symbol = c, "step");
        if c == 0 {
            let next = a.step(&state, c, &mut regs);
            let accepted = match a.accepting(&next) {
                Some((outcome, finalizer)) if ntags == 0 || finalizer.is_empty() => {
                    regs.apply(&finalizer);
                    Some(outcome)
                }
                Some((_, finalizer)) => {
                    regs.longest_match(ntags, &finalizer);
                    None
                }
                None => None,
            };
            return regs.finish(ntags, accepted);
        }

        regs.pos += 1;
        let next = a.step(&state, c, &mut regs);
        if a.is_dead(&next) {
            return regs.finish(ntags, None);
        }
        if let Some((outcome, finalizer)) = a.accepting(&next) {
            if ntags == 0 || finalizer.is_empty() {
                regs.apply(&finalizer);
                return regs.finish(ntags, Some(outcome));
            }
            regs.longest_match(ntags, &finalizer);
        }
        state = next;
    }
}
