//! Tagged DFA construction.
//!
//! This is the subset construction described in Ville Laurikari's "NFAs
//! with Tagged Transitions, their Conversion to Deterministic Automata and
//! Application to Regular Expressions": states are closures of tagged
//! kernels, transitions carry the slot updates needed to keep capture
//! positions, and a new state is only allocated when no existing state is
//! equal to it up to a renaming of slots.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::automata::action::{Action, MapItem, TdfaInsn};
use crate::automata::kernel::{te_closure, Kernel, KernelPoint};
use crate::automata::program::{escape, Inst, Program, ALPHABET_SIZE};
use crate::errors::Error;

pub type StateId = usize;

/// Outcome index of the failure snippet when capturing.
pub const FAIL_OUTCOME: usize = 0;
/// Outcome index of the success snippet when capturing.
pub const SUCCESS_OUTCOME: usize = 1;

/// How a state picks among several simultaneous `Accept` points.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum AcceptPolicy {
    /// The numerically highest outcome id wins; the first one found wins
    /// among equal outcomes.
    #[default]
    HighestOutcome,
    /// The numerically highest outcome id wins; the highest priority wins
    /// among equal outcomes.
    HighestPriority,
}

#[derive(Clone, Debug)]
pub struct Config {
    accept_policy: AcceptPolicy,
    state_limit: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            accept_policy: AcceptPolicy::default(),
            state_limit: 10_000,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn accept_policy(mut self, policy: AcceptPolicy) -> Config {
        self.accept_policy = policy;
        self
    }

    /// Construction fails with `Error::StateLimit` rather than allocating
    /// more states than this.
    pub fn state_limit(mut self, limit: usize) -> Config {
        self.state_limit = limit;
        self
    }

    pub fn get_accept_policy(&self) -> AcceptPolicy {
        self.accept_policy
    }

    pub fn get_state_limit(&self) -> usize {
        self.state_limit
    }
}

/// A transition on every symbol in `[lb, ub]`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Span {
    pub lb: u8,
    pub ub: u8,
    pub to: StateId,
    pub action: Action,
}

#[derive(Clone, Debug, Serialize)]
pub struct State {
    pub label: StateId,
    #[serde(skip)]
    pub kernel: Kernel,
    pub accepts: bool,
    pub accept_outcome: usize,
    /// Index into `kernel` of the point the finalizer was built from.
    #[serde(skip)]
    pub accept_point: Option<usize>,
    pub finalizer: Action,
    pub spans: Vec<Span>,
}

impl State {
    fn new(label: StateId, kernel: Kernel) -> State {
        State {
            label,
            kernel,
            accepts: false,
            accept_outcome: 0,
            accept_point: None,
            finalizer: Action::new(),
            spans: vec![],
        }
    }

    /// A state with nothing left to match.
    pub fn is_dead(&self) -> bool {
        self.kernel.is_empty() && !self.accepts
    }

    pub fn span_for(&self, c: u8) -> &Span {
        self.spans
            .iter()
            .find(|s| s.lb <= c && c <= s.ub)
            .unwrap_or_else(|| panic!("state {} has no span for symbol {}", self.label, c))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Dfa {
    #[serde(skip)]
    pub program: Program,
    pub ntags: usize,
    /// One more than the highest slot version in use.
    pub nmapitems: usize,
    /// Run once before entering the start state.
    pub initializer: Action,
    pub states: Vec<State>,
    pub outcome_snippets: Vec<String>,
    pub accept_policy: AcceptPolicy,
}

impl Dfa {
    /// Builds the tagged DFA for `program`.
    ///
    /// With `ntags > 0` exactly two outcomes are required, `FAIL_OUTCOME`
    /// and `SUCCESS_OUTCOME`, and the automaton resolves competing matches
    /// by longest match. Without tags any positive number of outcomes may
    /// be used.
    pub fn new(
        program: Program,
        ntags: usize,
        outcome_snippets: Vec<String>,
        config: &Config,
    ) -> Result<Dfa, Error> {
        program.validate(ntags)?;
        if outcome_snippets.is_empty() {
            return Err(Error::NoOutcomes);
        }
        if ntags > 0 && outcome_snippets.len() != 2 {
            return Err(Error::OutcomeCount(outcome_snippets.len()));
        }
        for (ip, inst) in program.insts.iter().enumerate() {
            if let Inst::Accept(outcome) = *inst {
                if outcome >= outcome_snippets.len() {
                    return Err(Error::OutcomeOutOfRange {
                        ip,
                        outcome,
                        count: outcome_snippets.len(),
                    });
                }
            }
        }

        debug!(ntags, insts = program.insts.len(), "constructing tagged DFA");
        let mut dfa = Dfa {
            program,
            ntags,
            nmapitems: 0,
            initializer: Action::new(),
            states: vec![],
            outcome_snippets,
            accept_policy: config.accept_policy,
        };

        let initial = te_closure(&dfa.program, &Kernel::single(dfa.program.start), ntags, true);
        let initializer = compute_action(None, &initial);
        dfa.register(&initializer);
        dfa.initializer = initializer;
        trace!("initializer {{{}}}", dfa.initializer);

        let first = dfa.add_state(initial, config)?;
        let mut worklist = VecDeque::from([first]);
        while let Some(curr) = worklist.pop_front() {
            dfa.mark_accepting(curr);

            let (edge_begin, edge_end) = edge_table(&dfa.program, &dfa.states[curr].kernel);
            let mut spans = vec![];
            let mut c = 0;
            while c < ALPHABET_SIZE {
                let lb = c;
                c += 1;
                while c < ALPHABET_SIZE && same_config(&edge_end[c], &edge_end[lb]) {
                    c += 1;
                }

                let target = te_closure(&dfa.program, &edge_end[lb], ntags, false);
                let mut action = compute_action(Some(&edge_begin[lb]), &target);
                let to = match dfa.find_equivalent(&target) {
                    Some((existing, reorder)) => {
                        action.extend(reorder);
                        existing
                    }
                    None => {
                        let id = dfa.add_state(target, config)?;
                        worklist.push_back(id);
                        id
                    }
                };
                dfa.register(&action);
                trace!(
                    "state {}: '{}'-'{}' -> {} {{{}}}",
                    curr,
                    escape(lb as u8),
                    escape((c - 1) as u8),
                    to,
                    action
                );
                spans.push(Span {
                    lb: lb as u8,
                    ub: (c - 1) as u8,
                    to,
                    action,
                });
            }
            dfa.states[curr].spans = spans;
        }

        debug!(
            states = dfa.states.len(),
            nmapitems = dfa.nmapitems,
            "tagged DFA constructed"
        );
        Ok(dfa)
    }

    pub fn start(&self) -> &State {
        &self.states[0]
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id]
    }

    fn add_state(&mut self, kernel: Kernel, config: &Config) -> Result<StateId, Error> {
        if self.states.len() >= config.state_limit {
            return Err(Error::StateLimit(config.state_limit));
        }
        let id = self.states.len();
        trace!("add state {} w/kernel {{{}}}", id, kernel);
        self.states.push(State::new(id, kernel));
        Ok(id)
    }

    /// Ensures the slot table has room for every slot `action` writes.
    fn register(&mut self, action: &Action) {
        for insn in action.iter() {
            if let TdfaInsn::SavePos { to } | TdfaInsn::Copy { to, .. } = *insn {
                self.nmapitems = self.nmapitems.max(to.version + 1);
            }
        }
    }

    fn mark_accepting(&mut self, id: StateId) {
        let state = &mut self.states[id];
        debug_assert!(state.finalizer.is_empty(), "state {} accepted twice", id);
        if let Some((outcome, idx)) = choose_accept(&self.program, &state.kernel, self.accept_policy)
        {
            state.accepts = true;
            state.accept_outcome = outcome;
            state.accept_point = Some(idx);
            state.finalizer = compute_finalizer(&state.kernel.0[idx]);
        }
    }

    /// Looks for an existing state that `kernel` can be turned into by
    /// renaming slots, returning it with the copy instructions that do the
    /// renaming.
    fn find_equivalent(&self, kernel: &Kernel) -> Option<(StateId, Action)> {
        let addresses = kernel.addresses();
        let order = kernel.priority_order();
        for t in &self.states {
            if t.kernel.len() != kernel.len()
                || t.kernel.addresses() != addresses
                || t.kernel.priority_order() != order
            {
                continue;
            }
            let Some((shift_map, shift_back)) = slot_bijection(kernel, &t.kernel) else {
                continue;
            };
            if has_cycle(&shift_map) {
                trace!("state {}: reorder would be cyclic", t.label);
                continue;
            }
            let reorder = reorder_action(&shift_map, &shift_back);
            trace!("reuse state {} with reorder {{{}}}", t.label, reorder);
            return Some((t.label, reorder));
        }
        None
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, with_kernels: bool) -> fmt::Result {
        writeln!(f, "initializer {{{}}}", self.initializer)?;
        for s in &self.states {
            write!(f, "state {}", s.label)?;
            if s.accepts {
                write!(f, " accepts {}", s.accept_outcome)?;
            }
            if !s.finalizer.is_empty() {
                write!(f, " with finalizer {{{}}}", s.finalizer)?;
            }
            writeln!(f)?;
            if with_kernels {
                writeln!(f, "  kernel {{{}}}", s.kernel)?;
            }
            for span in &s.spans {
                if span.lb == span.ub {
                    write!(f, "  '{}' -> {}", escape(span.lb), span.to)?;
                } else {
                    write!(
                        f,
                        "  '{}'-'{}' -> {}",
                        escape(span.lb),
                        escape(span.ub),
                        span.to
                    )?;
                }
                if !span.action.is_empty() {
                    write!(f, " {{{}}}", span.action)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }

    /// The debug listing with every state's kernel included.
    pub fn dump_kernels(&self) -> String {
        struct WithKernels<'a>(&'a Dfa);
        impl fmt::Display for WithKernels<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.print(f, true)
            }
        }
        WithKernels(self).to_string()
    }
}

impl fmt::Display for Dfa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, false)
    }
}

/// Points on either side of the character edges out of `kernel`, indexed
/// by symbol: `(edge_begin, edge_end)`.
pub(crate) fn edge_table(program: &Program, kernel: &Kernel) -> (Vec<Kernel>, Vec<Kernel>) {
    let mut edge_begin = vec![Kernel::default(); ALPHABET_SIZE];
    let mut edge_end = vec![Kernel::default(); ALPHABET_SIZE];
    for point in kernel.iter() {
        if let Inst::Char(ref ch) = program.insts[point.ip] {
            for r in &ch.ranges {
                for c in r.lb..=r.ub {
                    edge_begin[c as usize].push(point.clone());
                    edge_end[c as usize].push(KernelPoint {
                        ip: r.goto,
                        priority: point.priority,
                        map_items: point.map_items.clone(),
                        parents: BTreeSet::new(),
                    });
                }
            }
        }
    }
    (edge_begin, edge_end)
}

/// Same instructions reached with the same priorities and slots.
fn same_config(a: &Kernel, b: &Kernel) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|(x, y)| {
            x.ip == y.ip
                && x.priority.compare(&y.priority) == Ordering::Equal
                && x.map_items == y.map_items
        })
}

/// Picks the accepting point of `kernel`, returning `(outcome, index)`.
pub(crate) fn choose_accept(
    program: &Program,
    kernel: &Kernel,
    policy: AcceptPolicy,
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, point) in kernel.iter().enumerate() {
        if let Inst::Accept(outcome) = program.insts[point.ip] {
            let better = match best {
                None => true,
                Some((o, _)) if outcome != o => outcome > o,
                Some((_, j)) => {
                    policy == AcceptPolicy::HighestPriority
                        && point.priority.compare(&kernel.0[j].priority) == Ordering::Greater
                }
            };
            if better {
                best = Some((outcome, i));
            }
        }
    }
    best
}

/// Position saves for every slot of `new` that `old` does not carry.
pub(crate) fn compute_action(old: Option<&Kernel>, new: &Kernel) -> Action {
    let old_items = old.map(Kernel::map_items).unwrap_or_default();
    let mut action = Action::new();
    for to in new.map_items() {
        if !old_items.contains(&to) {
            action.push(TdfaInsn::SavePos { to });
        }
    }
    action
}

/// Copies the accepting point's slots into the output tags.
pub(crate) fn compute_finalizer(point: &KernelPoint) -> Action {
    let mut action = Action::new();
    for &from in &point.map_items {
        action.push(TdfaInsn::SaveTag { tag: from.tag, from });
    }
    action
}

type ShiftMap = BTreeMap<MapItem, MapItem>;

/// Builds the one-to-one slot mapping from `s` (candidate) to `t`
/// (existing). Both kernels must cover the same instructions.
fn slot_bijection(s: &Kernel, t: &Kernel) -> Option<(ShiftMap, ShiftMap)> {
    let mut shift_map = ShiftMap::new(); // s -> t
    let mut shift_back = ShiftMap::new(); // t -> s
    for kp1 in s.iter() {
        let kp2 = t
            .find(kp1.ip)
            .unwrap_or_else(|| panic!("no point for instruction {} in equivalent kernel", kp1.ip));
        let mut seen_tags = BTreeSet::new();
        for &mt1 in &kp1.map_items {
            assert!(
                seen_tags.insert(mt1.tag),
                "tag {} appears twice in kernel point {}",
                mt1.tag,
                kp1
            );
            let mt2 = kp2.map_item(mt1.tag)?;
            if shift_map.get(&mt1).is_some_and(|&m| m != mt2)
                || shift_back.get(&mt2).is_some_and(|&m| m != mt1)
            {
                return None;
            }
            shift_map.insert(mt1, mt2);
            shift_back.insert(mt2, mt1);
        }
        if kp2.map_items.iter().any(|m| !seen_tags.contains(&m.tag)) {
            return None;
        }
    }
    Some((shift_map, shift_back))
}

/// A chain of copies `a <- b <- ... <- a` can't be done in place.
fn has_cycle(shift_map: &ShiftMap) -> bool {
    let mut okay: BTreeSet<MapItem> = BTreeSet::new();
    for &start in shift_map.keys() {
        if okay.contains(&start) {
            continue;
        }
        let mut seen = BTreeSet::new();
        let mut m = start;
        while let Some(&next) = shift_map.get(&m) {
            if next == m || okay.contains(&next) {
                break;
            }
            if seen.contains(&next) {
                return true;
            }
            seen.insert(m);
            m = next;
        }
        okay.insert(m);
        okay.extend(seen);
    }
    false
}

/// Orders the copies so that no slot is overwritten before its old value
/// has been copied out.
fn reorder_action(shift_map: &ShiftMap, shift_back: &ShiftMap) -> Action {
    let mut action = Action::new();
    let mut saved = BTreeSet::new();
    let mut to_shift: VecDeque<MapItem> = shift_back
        .iter()
        .filter(|(to, from)| to != from)
        .map(|(&to, _)| to)
        .collect();
    let mut stalled = 0;
    while let Some(to) = to_shift.pop_front() {
        if shift_map.contains_key(&to) && !saved.contains(&to) {
            stalled += 1;
            assert!(
                stalled <= to_shift.len(),
                "slot reorder cannot make progress at {}",
                to
            );
            to_shift.push_back(to);
            continue;
        }
        stalled = 0;
        let from = shift_back[&to];
        action.push(TdfaInsn::Copy { to, from });
        saved.insert(from);
    }
    action
}
