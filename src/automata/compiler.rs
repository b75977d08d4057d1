use std::{result, vec};

use crate::{
    ast,
    automata::program::{
        CharRange, Inst, InstChar, InstFork, InstPtr, InstTag, Program, UNKNOWN_CHAR,
    },
    errors::Error,
};

#[derive(Debug, Eq, PartialEq)]
enum MaybeInst {
    Compiled(Inst),
    Uncompiled(InstHole),
    Split { greedy: bool },
    Split1 { link: InstPtr, greedy: bool },
}

impl MaybeInst {
    fn unwrap(self) -> Inst {
        match self {
            MaybeInst::Compiled(inst) => inst,
            _ => unreachable!(
                "must be called on a compiled instruction, \
                 instead it was called on: {:?}",
                self
            ),
        }
    }

    fn fill_split_link(&mut self, link: InstPtr) {
        let greedy = match *self {
            MaybeInst::Split { greedy } => greedy,
            _ => unreachable!(
                "must be called on Split instruction, \
                 instead it was called on: {:?}",
                self
            ),
        };
        *self = MaybeInst::Split1 { link, greedy };
    }

    fn fill(&mut self, goto: usize) {
        let maybe_inst = match *self {
            MaybeInst::Uncompiled(ref hole) => MaybeInst::Compiled(hole.fill(goto)),
            MaybeInst::Split { greedy } => MaybeInst::Split1 { link: goto, greedy },
            MaybeInst::Split1 { link, greedy } => MaybeInst::Compiled(Inst::Fork(InstFork {
                next: goto,
                link,
                prefer_link: greedy,
            })),
            MaybeInst::Compiled(_) => unreachable!("compiled cant be filled"),
        };
        *self = maybe_inst
    }
}

#[derive(Debug, Eq, PartialEq)]
enum InstHole {
    Char { ranges: Vec<(u8, u8)> },
    Tag { tag: usize },
    Goto,
    Init,
}
impl InstHole {
    fn fill(&self, goto: usize) -> Inst {
        match *self {
            InstHole::Char { ref ranges } => Inst::Char(InstChar {
                ranges: ranges
                    .iter()
                    .map(|&(lb, ub)| CharRange { lb, ub, goto })
                    .collect(),
            }),
            InstHole::Tag { tag } => Inst::Tag(InstTag { tag, goto }),
            InstHole::Goto => Inst::Goto(goto),
            InstHole::Init => Inst::Init(goto),
        }
    }
}

struct Patch {
    hole: Hole,
    entry: InstPtr,
}

enum Hole {
    One(InstPtr),
    Many(Vec<Hole>),
}
impl Hole {
    fn new(mut holes: Vec<Hole>) -> Hole {
        match holes.len() {
            1 => holes.pop().expect("exists"),
            _ => Hole::Many(holes),
        }
    }
}

type ResultPatch = result::Result<Patch, Error>;

/// Number of tags a tagged compilation of `ast` uses: a start and an end
/// tag for the whole match and for every capturing group.
pub fn tag_count(ast: &ast::Ast) -> usize {
    2 * (ast.capture_count() + 1)
}

/// Symbols matched by `.`: everything but the terminator.
const ANY: (u8, u8) = (1, UNKNOWN_CHAR);

pub struct Compiler {
    insts: Vec<MaybeInst>,
    tagged: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    /// A compiler that records group boundaries with tags: group `i`
    /// starts at tag `2i` and ends at tag `2i + 1`.
    pub fn new() -> Compiler {
        Compiler {
            insts: vec![],
            tagged: true,
        }
    }

    /// A compiler that ignores capturing groups.
    pub fn untagged() -> Compiler {
        Compiler {
            insts: vec![],
            tagged: false,
        }
    }

    /// Compiles `ast` followed by `Accept(0)`.
    pub fn compile(mut self, ast: &ast::Ast) -> result::Result<Program, Error> {
        let Patch { hole, entry } = self.c(ast)?;
        self.fill_to_next(hole);
        self.push_compiled(Inst::Accept(0));
        Ok(self.finish(entry))
    }

    /// Compiles a search for `ast` anywhere in the input (or only at its
    /// start when `anchored`). The program accepts with outcome 1 when the
    /// pattern matched, recording the match in tags 0 and 1, and with
    /// outcome 0 once the input ends without a match.
    pub fn compile_matcher(
        mut self,
        ast: &ast::Ast,
        anchored: bool,
    ) -> result::Result<Program, Error> {
        let entry = self.insts.len();
        let split = self.push_split_hole(true);

        // .*? (t0) pattern (t1) ACCEPT(1)
        let mut rule = if anchored {
            self.c_empty()?
        } else {
            self.c_zero_or_more(false, |c| c.c_class(vec![ANY]))?
        };
        if self.tagged {
            let tag = self.c_tag(0)?;
            rule = self.chain(rule, tag);
        }
        let body = self.c(ast)?;
        rule = self.chain(rule, body);
        if self.tagged {
            let tag = self.c_tag(1)?;
            rule = self.chain(rule, tag);
        }
        self.fill_to_next(rule.hole);
        self.push_compiled(Inst::Accept(1));

        // (.|\0)*? \0 ACCEPT(0)
        let split = self.fill_split(split, rule.entry);
        self.fill_to_next(split);
        let skip = self.c_zero_or_more(false, |c| c.c_class(vec![(0, UNKNOWN_CHAR)]))?;
        let end = self.c_class(vec![(0, 0)])?;
        let fail = self.chain(skip, end);
        self.fill_to_next(fail.hole);
        self.push_compiled(Inst::Accept(0));

        Ok(self.finish(entry))
    }

    /// Compiles each rule with its index as outcome. Where several rules
    /// match, earlier rules are preferred.
    pub fn compile_rules(mut self, asts: &[ast::Ast]) -> result::Result<Program, Error> {
        let (last, init) = asts.split_last().ok_or(Error::NoOutcomes)?;
        let entry = self.insts.len();
        let mut prev: Option<Hole> = None;
        for (outcome, ast) in init.iter().enumerate() {
            if let Some(prev) = prev.take() {
                self.fill_to_next(prev);
            }
            let split = self.push_split_hole(true);
            let rule = self.c_rule(ast, outcome)?;
            prev = Some(self.fill_split(split, rule));
        }
        if let Some(prev) = prev {
            self.fill_to_next(prev);
        }
        self.c_rule(last, init.len())?;
        Ok(self.finish(entry))
    }

    fn c_rule(&mut self, ast: &ast::Ast, outcome: usize) -> result::Result<InstPtr, Error> {
        let Patch { hole, entry } = self.c(ast)?;
        self.fill_to_next(hole);
        self.push_compiled(Inst::Accept(outcome));
        Ok(entry)
    }

    fn finish(self, entry: InstPtr) -> Program {
        let insts = self
            .insts
            .into_iter()
            .map(|i| i.unwrap())
            .collect::<Vec<_>>();
        Program {
            insts,
            start: entry,
        }
    }

    fn push_compiled(&mut self, inst: Inst) {
        self.insts.push(MaybeInst::Compiled(inst));
    }

    fn push_hole(&mut self, hole: InstHole) -> ResultPatch {
        let ip = self.insts.len();
        self.insts.push(MaybeInst::Uncompiled(hole));
        Ok(Patch {
            hole: Hole::One(ip),
            entry: ip,
        })
    }

    /// Fills the `link` branch of a split, leaving `next` as the returned
    /// hole.
    fn fill_split(&mut self, hole: Hole, link: InstPtr) -> Hole {
        match hole {
            Hole::One(pc) => {
                self.insts[pc].fill_split_link(link);
                Hole::One(pc)
            }
            Hole::Many(holes) => {
                let mut new_holes = vec![];
                for hole in holes {
                    new_holes.push(self.fill_split(hole, link));
                }
                Hole::new(new_holes)
            }
        }
    }

    fn fill_to_next(&mut self, hole: Hole) {
        let next = self.insts.len();
        self.fill(hole, next);
    }

    fn fill(&mut self, hole: Hole, goto: InstPtr) {
        match hole {
            Hole::One(pc) => self.insts[pc].fill(goto),
            Hole::Many(holes) => {
                for hole in holes {
                    self.fill(hole, goto)
                }
            }
        }
    }

    fn push_split_hole(&mut self, greedy: bool) -> Hole {
        let hole = self.insts.len();
        self.insts.push(MaybeInst::Split { greedy });
        Hole::One(hole)
    }

    fn chain(&mut self, first: Patch, second: Patch) -> Patch {
        self.fill(first.hole, second.entry);
        Patch {
            hole: second.hole,
            entry: first.entry,
        }
    }

    fn c(&mut self, ast: &ast::Ast) -> ResultPatch {
        match *ast {
            ast::Ast::Empty(_) => self.c_empty(),
            ast::Ast::Concat(ref concat) => self.c_concat(concat.asts()),
            ast::Ast::Repetition(ref repetition) => self.c_repetition(
                repetition.kind(),
                repetition.greedy,
                repetition.ast.as_ref(),
            ),
            ast::Ast::Literal(ref literal) => {
                let c = literal.char as u8;
                self.c_class(vec![(c, c)])
            }
            ast::Ast::Dot(_) => self.c_class(vec![ANY]),
            ast::Ast::Class(ref class) => self.c_class(class_ranges(class)),
            ast::Ast::Assertion(ref assertion) => match assertion.kind {
                ast::AssertionKind::StartLine => self.push_hole(InstHole::Init),
                ast::AssertionKind::EndLine => self.c_class(vec![(0, 0)]),
            },
            ast::Ast::Group(ref group) => self.c_group(group),
            ast::Ast::Alternation(ref alteration) => self.c_alternation(alteration.asts.as_ref()),
        }
    }

    fn c_concat(&mut self, concat: &[ast::Ast]) -> ResultPatch {
        let mut iter = concat.iter();
        let mut patch = match iter.next() {
            Some(e) => self.c(e)?,
            None => return self.c_empty(),
        };
        for e in iter {
            let p = self.c(e)?;
            patch = self.chain(patch, p);
        }
        Ok(patch)
    }

    fn c_class(&mut self, ranges: Vec<(u8, u8)>) -> ResultPatch {
        self.push_hole(InstHole::Char { ranges })
    }

    fn c_tag(&mut self, tag: usize) -> ResultPatch {
        self.push_hole(InstHole::Tag { tag })
    }

    fn c_group(&mut self, group: &ast::Group) -> ResultPatch {
        match group.capture_index() {
            Some(index) if self.tagged => {
                let index = index as usize;
                let start = self.c_tag(2 * index)?;
                let body = self.c(&group.ast)?;
                let patch = self.chain(start, body);
                let end = self.c_tag(2 * index + 1)?;
                Ok(self.chain(patch, end))
            }
            _ => self.c(&group.ast),
        }
    }

    fn c_alternation(&mut self, alt: &[ast::Ast]) -> ResultPatch {
        let mut holes: Vec<Hole> = vec![];
        let first_split_entry = self.insts.len();
        let mut prev: Option<Hole> = None;

        for ast in &alt[0..alt.len() - 1] {
            if let Some(prev) = prev.take() {
                self.fill_to_next(prev);
            }
            let split = self.push_split_hole(true);
            let Patch { hole, entry } = self.c(ast)?;
            holes.push(hole);
            prev = Some(self.fill_split(split, entry));
        }
        let Patch { hole, entry } = self.c(&alt[alt.len() - 1])?;
        holes.push(hole);
        if let Some(prev) = prev {
            self.fill(prev, entry);
        }
        Ok(Patch {
            hole: Hole::new(holes),
            entry: first_split_entry,
        })
    }

    fn c_empty(&mut self) -> ResultPatch {
        self.push_hole(InstHole::Goto)
    }

    fn c_repetition(
        &mut self,
        kind: ast::RepetitionKind,
        greedy: bool,
        ast: &ast::Ast,
    ) -> ResultPatch {
        use ast::RepetitionRange::*;
        let body = |c: &mut Compiler| c.c(ast);
        match kind {
            ast::RepetitionKind::ZeroOrOne => self.c_zero_or_one(greedy, body),
            ast::RepetitionKind::ZeroOrMore => self.c_zero_or_more(greedy, body),
            ast::RepetitionKind::OneOrMore => self.c_one_or_more(greedy, body),
            ast::RepetitionKind::Range(Exactly(n)) => self.c_exactly(n, body),
            ast::RepetitionKind::Range(AtLeast(n)) => {
                let head = self.c_exactly(n, body)?;
                let tail = self.c_zero_or_more(greedy, body)?;
                Ok(self.chain(head, tail))
            }
            ast::RepetitionKind::Range(Bounded(min, max)) => {
                let head = self.c_exactly(min, body)?;
                self.c_optional_tail(head, max - min, greedy, body)
            }
        }
    }

    fn c_exactly<F>(&mut self, n: u32, mut f: F) -> ResultPatch
    where
        F: FnMut(&mut Compiler) -> ResultPatch,
    {
        if n == 0 {
            return self.c_empty();
        }
        let mut patch = f(self)?;
        for _ in 1..n {
            let p = f(self)?;
            patch = self.chain(patch, p);
        }
        Ok(patch)
    }

    /// `head (x (x (x)?)?)?` with `count` nested optionals.
    fn c_optional_tail<F>(&mut self, head: Patch, count: u32, greedy: bool, mut f: F) -> ResultPatch
    where
        F: FnMut(&mut Compiler) -> ResultPatch,
    {
        let mut holes = vec![];
        let mut prev = head.hole;
        for _ in 0..count {
            let split_entry = self.insts.len();
            let split = self.push_split_hole(greedy);
            self.fill(prev, split_entry);
            let Patch { hole, entry } = f(self)?;
            holes.push(self.fill_split(split, entry));
            prev = hole;
        }
        holes.push(prev);
        Ok(Patch {
            hole: Hole::new(holes),
            entry: head.entry,
        })
    }

    fn c_zero_or_one<F>(&mut self, greedy: bool, mut f: F) -> ResultPatch
    where
        F: FnMut(&mut Compiler) -> ResultPatch,
    {
        let split_entry = self.insts.len();
        let split = self.push_split_hole(greedy);
        let Patch { hole, entry } = f(self)?;
        let split_hole = self.fill_split(split, entry);
        Ok(Patch {
            hole: Hole::new(vec![split_hole, hole]),
            entry: split_entry,
        })
    }

    fn c_zero_or_more<F>(&mut self, greedy: bool, mut f: F) -> ResultPatch
    where
        F: FnMut(&mut Compiler) -> ResultPatch,
    {
        let split_entry = self.insts.len();
        let split = self.push_split_hole(greedy);
        let Patch { hole, entry } = f(self)?;
        self.fill(hole, split_entry);
        let split_hole = self.fill_split(split, entry);
        Ok(Patch {
            hole: split_hole,
            entry: split_entry,
        })
    }

    fn c_one_or_more<F>(&mut self, greedy: bool, mut f: F) -> ResultPatch
    where
        F: FnMut(&mut Compiler) -> ResultPatch,
    {
        let Patch { hole, entry } = f(self)?;
        self.fill_to_next(hole);
        let split = self.push_split_hole(greedy);
        let split_hole = self.fill_split(split, entry);
        Ok(Patch {
            hole: split_hole,
            entry,
        })
    }
}

/// Sorted, merged symbol ranges of a class. Negated classes never match
/// the terminator but do match every non-ASCII byte.
fn class_ranges(class: &ast::Class) -> Vec<(u8, u8)> {
    let mut ranges: Vec<(u8, u8)> = class
        .ranges
        .iter()
        .map(|r| (r.start as u8, r.end as u8))
        .collect();
    ranges.sort_unstable();
    let mut merged: Vec<(u8, u8)> = vec![];
    for (lb, ub) in ranges {
        match merged.last_mut() {
            Some(last) if lb <= last.1.saturating_add(1) => last.1 = last.1.max(ub),
            _ => merged.push((lb, ub)),
        }
    }
    if !class.negated {
        return merged;
    }

    let mut negated = vec![];
    let mut next = ANY.0;
    for (lb, ub) in merged {
        if lb > next {
            negated.push((next, lb - 1));
        }
        next = next.max(ub.saturating_add(1));
    }
    if next <= UNKNOWN_CHAR {
        negated.push((next, UNKNOWN_CHAR));
    }
    negated
}

#[cfg(test)]
mod test {
    use super::{tag_count, Compiler, Error};
    use crate::ast::Ast;
    use crate::automata::program::Inst;
    use crate::{ast::parser::Parser, automata::program, automata::program::Program};
    use pretty_assertions::assert_eq;
    use std::result::Result;

    fn p(s: &str) -> Ast {
        Parser::new(s.to_string())
            .parse()
            .expect("should be valid ast")
    }

    fn c(s: &str) -> Result<Program, Error> {
        Compiler::new().compile(&p(s))
    }

    fn i_split(link: usize, next: usize) -> program::Inst {
        i_fork(link, next, true)
    }
    fn i_fork(link: usize, next: usize, prefer_link: bool) -> program::Inst {
        Inst::Fork(program::InstFork {
            next,
            link,
            prefer_link,
        })
    }
    fn i_ranges(ranges: &[(u8, u8)], goto: usize) -> program::Inst {
        Inst::Char(program::InstChar {
            ranges: ranges
                .iter()
                .map(|&(lb, ub)| program::CharRange { lb, ub, goto })
                .collect(),
        })
    }
    fn i_char(c: char, goto: usize) -> program::Inst {
        i_ranges(&[(c as u8, c as u8)], goto)
    }
    fn i_tag(tag: usize, goto: usize) -> program::Inst {
        Inst::Tag(program::InstTag { tag, goto })
    }
    fn i_match() -> program::Inst {
        Inst::Accept(0)
    }

    fn program(v: Vec<program::Inst>) -> std::result::Result<Program, Error> {
        Ok(Program { insts: v, start: 0 })
    }

    #[test]
    fn concat() {
        assert_eq!(
            c("ab"),
            program(vec![i_char('a', 1), i_char('b', 2), i_match()])
        );
    }

    #[test]
    fn alternate() {
        assert_eq!(
            c("a|b|c"),
            program(vec![
                i_split(1, 2),
                i_char('a', 5),
                i_split(3, 4),
                i_char('b', 5),
                i_char('c', 5),
                i_match(),
            ])
        );
        assert_eq!(
            c("a||c"),
            program(vec![
                i_split(1, 2),
                i_char('a', 5),
                i_split(3, 4),
                Inst::Goto(5),
                i_char('c', 5),
                i_match(),
            ])
        );
    }

    #[test]
    fn repeat_zero_or_many() {
        assert_eq!(
            c("a*"),
            program(vec![i_split(1, 2), i_char('a', 0), i_match()])
        );
        assert_eq!(
            c("a*?"),
            program(vec![i_fork(1, 2, false), i_char('a', 0), i_match()])
        );
        assert_eq!(
            c("a(?:bc)*"),
            program(vec![
                i_char('a', 1),
                i_split(2, 4),
                i_char('b', 3),
                i_char('c', 1),
                i_match(),
            ])
        );
    }

    #[test]
    fn repeat_zero_or_one() {
        assert_eq!(
            c("a?"),
            program(vec![i_split(1, 2), i_char('a', 2), i_match()])
        );
    }

    #[test]
    fn repeat_one_or_many() {
        assert_eq!(
            c("a+"),
            program(vec![i_char('a', 1), i_split(0, 2), i_match()])
        );
    }

    #[test]
    fn repeat_counted() {
        assert_eq!(
            c("a{2,3}"),
            program(vec![
                i_char('a', 1),
                i_char('a', 2),
                i_split(3, 4),
                i_char('a', 4),
                i_match(),
            ])
        );
        assert_eq!(
            c("a{2,}"),
            program(vec![
                i_char('a', 1),
                i_char('a', 2),
                i_split(3, 4),
                i_char('a', 2),
                i_match(),
            ])
        );
        assert_eq!(
            c("a{0}"),
            program(vec![Inst::Goto(1), i_match()])
        );
    }

    #[test]
    fn groups_and_classes() {
        assert_eq!(
            c("(a)"),
            program(vec![i_tag(2, 1), i_char('a', 2), i_tag(3, 3), i_match()])
        );
        assert_eq!(
            Compiler::untagged().compile(&p("(a)")),
            program(vec![i_char('a', 1), i_match()])
        );
        assert_eq!(
            c("[c-ea-b]"),
            program(vec![i_ranges(&[(b'a', b'e')], 1), i_match()])
        );
        assert_eq!(
            c("[^b-y]"),
            program(vec![i_ranges(&[(1, b'a'), (b'z', 128)], 1), i_match()])
        );
        assert_eq!(
            c("^.$"),
            program(vec![
                Inst::Init(1),
                i_ranges(&[(1, 128)], 2),
                i_ranges(&[(0, 0)], 3),
                i_match()
            ])
        );
    }

    #[test]
    fn matcher() {
        assert_eq!(
            Compiler::new().compile_matcher(&p("a"), false),
            program(vec![
                i_split(1, 7),
                i_fork(2, 3, false),
                i_ranges(&[(1, 128)], 1),
                i_tag(0, 4),
                i_char('a', 5),
                i_tag(1, 6),
                Inst::Accept(1),
                i_fork(8, 9, false),
                i_ranges(&[(0, 128)], 7),
                i_ranges(&[(0, 0)], 10),
                Inst::Accept(0),
            ])
        );
        assert_eq!(
            Compiler::new().compile_matcher(&p("a"), true),
            program(vec![
                i_split(1, 6),
                Inst::Goto(2),
                i_tag(0, 3),
                i_char('a', 4),
                i_tag(1, 5),
                Inst::Accept(1),
                i_fork(7, 8, false),
                i_ranges(&[(0, 128)], 6),
                i_ranges(&[(0, 0)], 9),
                Inst::Accept(0),
            ])
        );
        assert_eq!(tag_count(&p("(a)(b)?")), 6);
    }

    #[test]
    fn rules() {
        assert_eq!(
            Compiler::untagged().compile_rules(&[p("a"), p("b")]),
            program(vec![
                i_split(1, 3),
                i_char('a', 2),
                Inst::Accept(0),
                i_char('b', 4),
                Inst::Accept(1),
            ])
        );
        assert_eq!(
            Compiler::untagged().compile_rules(&[]),
            Err(Error::NoOutcomes)
        );
    }
}
