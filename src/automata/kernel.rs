//! Tagged configurations and their epsilon-closure.
//!
//! A kernel is the tagged analogue of a subset-construction state set: a
//! list of instruction pointers, each carrying the priority of the path that
//! reached it and the capture slots (map items) live along that path.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::trace;

use crate::automata::action::MapItem;
use crate::automata::priority::Priority;
use crate::automata::program::{Inst, InstPtr, InstTag, Program};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct KernelPoint {
    pub ip: InstPtr,
    pub priority: Priority,
    pub map_items: Vec<MapItem>,
    /// Instructions already visited along this epsilon chain. Only
    /// meaningful while a closure is being computed.
    #[serde(skip)]
    pub(crate) parents: BTreeSet<InstPtr>,
}

impl KernelPoint {
    pub fn new(ip: InstPtr) -> KernelPoint {
        KernelPoint {
            ip,
            priority: Priority::ROOT,
            map_items: vec![],
            parents: BTreeSet::new(),
        }
    }

    /// The point reached by following an epsilon edge to `ip`, or `None`
    /// if the edge closes a loop.
    fn successor(&self, ip: InstPtr, priority: Priority) -> Option<KernelPoint> {
        if self.parents.contains(&ip) {
            return None;
        }
        let mut parents = self.parents.clone();
        parents.insert(ip);
        Some(KernelPoint {
            ip,
            priority,
            map_items: self.map_items.clone(),
            parents,
        })
    }

    pub fn map_item(&self, tag: usize) -> Option<MapItem> {
        self.map_items.iter().copied().find(|m| m.tag == tag)
    }
}

impl fmt::Display for KernelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.ip, self.priority)?;
        for (i, m) in self.map_items.iter().enumerate() {
            f.write_str(if i == 0 { ":" } else { "," })?;
            write!(f, "{}", m)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Kernel(pub Vec<KernelPoint>);

impl Kernel {
    pub fn single(ip: InstPtr) -> Kernel {
        Kernel(vec![KernelPoint::new(ip)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KernelPoint> {
        self.0.iter()
    }

    pub fn push(&mut self, point: KernelPoint) {
        self.0.push(point);
    }

    pub fn find(&self, ip: InstPtr) -> Option<&KernelPoint> {
        self.iter().find(|p| p.ip == ip)
    }

    pub fn addresses(&self) -> BTreeSet<InstPtr> {
        self.iter().map(|p| p.ip).collect()
    }

    /// True if both kernels touch exactly the same instructions.
    pub fn same_ins(&self, other: &Kernel) -> bool {
        self.addresses() == other.addresses()
    }

    pub fn map_items(&self) -> BTreeSet<MapItem> {
        self.iter()
            .flat_map(|p| p.map_items.iter().copied())
            .collect()
    }

    /// Instruction pointers ordered from lowest to highest priority.
    pub fn priority_order(&self) -> Vec<InstPtr> {
        let mut points: Vec<&KernelPoint> = self.iter().collect();
        points.sort_by(|a, b| a.priority.compare(&b.priority).then(a.ip.cmp(&b.ip)));
        points.into_iter().map(|p| p.ip).collect()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

struct Closure<'p> {
    program: &'p Program,
    is_initial: bool,
    points: Vec<Option<KernelPoint>>,
    // ip -> index of the live point for it in `points`
    closure_map: HashMap<InstPtr, usize>,
    max_tags: Vec<usize>,
    worklist: Vec<KernelPoint>,
}

/// Computes the set of points that are tag-wise unambiguously reachable
/// from `start` through epsilon edges. Absent tags this is the ordinary
/// NFA epsilon-closure.
///
/// `Init` instructions are only followed when `is_initial` is set.
pub fn te_closure(program: &Program, start: &Kernel, ntags: usize, is_initial: bool) -> Kernel {
    let mut closure = Closure {
        program,
        is_initial,
        points: vec![],
        closure_map: HashMap::new(),
        max_tags: vec![0; ntags],
        worklist: vec![],
    };
    closure.seed(start);
    closure.run();
    Kernel(
        closure
            .points
            .into_iter()
            .flatten()
            .map(|mut p| {
                p.parents.clear();
                p
            })
            .collect(),
    )
}

impl Closure<'_> {
    fn seed(&mut self, start: &Kernel) {
        let mut seeds: Vec<KernelPoint> = vec![];
        for point in start.iter() {
            match seeds.iter().position(|s| s.ip == point.ip) {
                None => seeds.push(point.clone()),
                Some(i) => match point.priority.compare(&seeds[i].priority) {
                    Ordering::Greater => seeds[i] = point.clone(),
                    Ordering::Less => {}
                    Ordering::Equal => panic!(
                        "identical priorities for seed points {} and {}",
                        seeds[i], point
                    ),
                },
            }
        }

        // Rebalance: only the relative order of the seeds matters from here
        // on, so keep the priorities shallow.
        let mut order: Vec<usize> = (0..seeds.len()).collect();
        order.sort_by(|&a, &b| seeds[a].priority.compare(&seeds[b].priority));
        for (i, priority) in order.into_iter().zip(Priority::ranked(seeds.len())) {
            seeds[i].priority = priority;
        }

        for mut seed in seeds {
            seed.parents.clear();
            seed.parents.insert(seed.ip);
            for m in &seed.map_items {
                self.max_tags[m.tag] = self.max_tags[m.tag].max(m.version);
            }
            self.closure_map.insert(seed.ip, self.points.len());
            self.points.push(Some(seed.clone()));
            self.worklist.push(seed);
        }
    }

    fn run(&mut self) {
        while let Some(point) = self.worklist.pop() {
            match self.program.insts[point.ip] {
                Inst::Tag(InstTag { tag, goto }) => {
                    if let Some(mut next) = point.successor(goto, point.priority) {
                        self.retag(&mut next, tag);
                        self.admit(next);
                    }
                }
                Inst::Fork(fork) if fork.link == point.ip => {
                    self.pass(&point, fork.next);
                }
                Inst::Fork(fork) => {
                    let (preferred, fallback) = fork.targets();
                    let lower = point.successor(fallback, point.priority.refine_lower());
                    let higher = point.successor(preferred, point.priority.refine_higher());
                    if let Some(lower) = lower {
                        self.admit(lower);
                    }
                    if let Some(higher) = higher {
                        self.admit(higher);
                    }
                }
                Inst::Goto(goto) => self.pass(&point, goto),
                Inst::Init(goto) if self.is_initial => self.pass(&point, goto),
                Inst::Init(_) | Inst::Char(_) | Inst::Accept(_) => {}
            }
        }
    }

    fn pass(&mut self, point: &KernelPoint, ip: InstPtr) {
        if let Some(next) = point.successor(ip, point.priority) {
            self.admit(next);
        }
    }

    /// Replaces any slot for `tag` with a version unused in this closure.
    fn retag(&mut self, point: &mut KernelPoint, tag: usize) {
        point.map_items.retain(|m| m.tag != tag);
        self.max_tags[tag] += 1;
        point.map_items.push(MapItem::new(tag, self.max_tags[tag]));
    }

    fn admit(&mut self, next: KernelPoint) {
        if let Some(&idx) = self.closure_map.get(&next.ip) {
            let existing = self.points[idx]
                .as_ref()
                .expect("closure_map refers to a live point");
            match next.priority.compare(&existing.priority) {
                Ordering::Equal => panic!(
                    "identical priorities reaching instruction {}: {} and {}",
                    next.ip, existing, next
                ),
                Ordering::Less => return,
                Ordering::Greater => {
                    trace!("closure: {} replaces {}", next, existing);
                    self.points[idx] = None;
                }
            }
        }
        self.closure_map.insert(next.ip, self.points.len());
        self.points.push(Some(next.clone()));
        self.worklist.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::program::{CharRange, InstChar, InstFork};
    use pretty_assertions::assert_eq;

    fn chr(c: u8, goto: InstPtr) -> Inst {
        Inst::Char(InstChar {
            ranges: vec![CharRange {
                lb: c,
                ub: c,
                goto,
            }],
        })
    }

    fn fork(next: InstPtr, link: InstPtr, prefer_link: bool) -> Inst {
        Inst::Fork(InstFork {
            next,
            link,
            prefer_link,
        })
    }

    fn program(insts: Vec<Inst>) -> Program {
        Program { insts, start: 0 }
    }

    #[test]
    fn plain_closure() {
        // a|b
        let p = program(vec![
            fork(2, 1, true),
            chr(b'a', 3),
            chr(b'b', 3),
            Inst::Accept(0),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 0, true);
        assert_eq!(k.addresses().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        let a = k.find(1).unwrap();
        let b = k.find(2).unwrap();
        assert_eq!(a.priority.compare(&b.priority), Ordering::Greater);
        assert!(k.iter().all(|p| p.parents.is_empty()));
    }

    #[test]
    fn tags_get_fresh_versions() {
        // (t0 a | t0 b) shares tag 0 on both branches.
        let p = program(vec![
            fork(3, 1, true),
            Inst::Tag(InstTag { tag: 0, goto: 2 }),
            chr(b'a', 5),
            Inst::Tag(InstTag { tag: 0, goto: 4 }),
            chr(b'b', 5),
            Inst::Accept(0),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 1, true);
        let a = k.find(2).unwrap();
        let b = k.find(4).unwrap();
        assert_eq!(a.map_items.len(), 1);
        assert_eq!(b.map_items.len(), 1);
        assert!(a.map_items[0] != b.map_items[0]);
        assert_eq!(
            k.map_items().into_iter().collect::<Vec<_>>(),
            vec![MapItem::new(0, 1), MapItem::new(0, 2)]
        );
    }

    #[test]
    fn retag_replaces_slot() {
        // t0 t0 a
        let p = program(vec![
            Inst::Tag(InstTag { tag: 0, goto: 1 }),
            Inst::Tag(InstTag { tag: 0, goto: 2 }),
            chr(b'a', 3),
            Inst::Accept(0),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 1, true);
        assert_eq!(k.find(2).unwrap().map_items, vec![MapItem::new(0, 2)]);
    }

    #[test]
    fn higher_priority_wins() {
        // Both fork branches meet at the same char; only one point survives.
        let p = program(vec![
            fork(2, 1, true),
            Inst::Tag(InstTag { tag: 0, goto: 3 }),
            Inst::Tag(InstTag { tag: 1, goto: 3 }),
            chr(b'a', 4),
            Inst::Accept(0),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 2, true);
        let merged = k.find(3).unwrap();
        assert_eq!(merged.map_item(0).map(|m| m.tag), Some(0));
        assert_eq!(merged.map_item(1), None);
        assert_eq!(k.iter().filter(|p| p.ip == 3).count(), 1);

        let p = program(vec![
            fork(2, 1, false),
            Inst::Tag(InstTag { tag: 0, goto: 3 }),
            Inst::Tag(InstTag { tag: 1, goto: 3 }),
            chr(b'a', 4),
            Inst::Accept(0),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 2, true);
        let merged = k.find(3).unwrap();
        assert_eq!(merged.map_item(0), None);
        assert!(merged.map_item(1).is_some());
    }

    #[test]
    fn init_only_from_start() {
        let p = program(vec![Inst::Init(1), chr(b'a', 2), Inst::Accept(0)]);
        let k = te_closure(&p, &Kernel::single(0), 0, true);
        assert_eq!(k.len(), 2);
        let k = te_closure(&p, &Kernel::single(0), 0, false);
        assert_eq!(k.len(), 1);
    }

    #[test]
    fn loops_terminate() {
        // 0: fork to itself, 1: goto 2, 2: goto 1, 3: fork 1|3
        let p = program(vec![
            fork(1, 0, true),
            Inst::Goto(2),
            Inst::Goto(1),
            fork(3, 1, true),
        ]);
        let k = te_closure(&p, &Kernel::single(0), 0, true);
        assert_eq!(k.addresses().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        let k = te_closure(&p, &Kernel::single(3), 0, true);
        assert_eq!(k.addresses().into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn seeds_are_rebalanced() {
        let p = program(vec![chr(b'a', 1), Inst::Accept(0)]);
        let mut start = Kernel::default();
        let mut deep = KernelPoint::new(0);
        deep.priority = Priority::new(5, 40);
        start.push(deep);
        let mut shallow = KernelPoint::new(1);
        shallow.priority = Priority::new(1, 1);
        start.push(shallow);
        let k = te_closure(&p, &start, 0, false);
        assert_eq!(k.find(0).unwrap().priority, Priority::new(0, 1));
        assert_eq!(k.find(1).unwrap().priority, Priority::new(1, 1));
        assert_eq!(k.priority_order(), vec![0, 1]);
    }

    #[test]
    fn duplicate_seeds_keep_higher() {
        let p = program(vec![chr(b'a', 1), Inst::Accept(0)]);
        let mut low = KernelPoint::new(1);
        low.priority = Priority::new(0, 1);
        low.map_items.push(MapItem::new(0, 1));
        let mut high = KernelPoint::new(1);
        high.priority = Priority::new(1, 1);
        high.map_items.push(MapItem::new(0, 2));
        let k = te_closure(&p, &Kernel(vec![low, high]), 1, false);
        assert_eq!(k.len(), 1);
        assert_eq!(k.0[0].map_items, vec![MapItem::new(0, 2)]);
    }

    #[test]
    #[should_panic(expected = "identical priorities")]
    fn equal_seeds_panic() {
        let p = program(vec![chr(b'a', 1), Inst::Accept(0)]);
        let k = Kernel(vec![KernelPoint::new(1), KernelPoint::new(1)]);
        te_closure(&p, &k, 0, false);
    }

    #[test]
    fn display() {
        let mut kp = KernelPoint::new(4);
        kp.priority = Priority::new(3, 2);
        kp.map_items = vec![MapItem::new(0, 1), MapItem::new(1, 2)];
        assert_eq!(kp.to_string(), "4[3/2^2]:m[0,1],m[1,2]");
        assert_eq!(KernelPoint::new(0).to_string(), "0[0/2^0]");
    }
}
