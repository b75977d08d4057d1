use std::fmt;
pub mod parser;

/// Counted repetitions above this are rejected.
pub const MAX_REPETITION: u32 = 1000;

#[derive(Debug, PartialEq, Eq)]
pub enum Ast {
    Empty(Empty),
    Concat(Concat),
    Repetition(Repetition),
    Literal(Literal),
    /// `.`: any character but the terminator.
    Dot(Span),
    Class(Class),
    Assertion(Assertion),
    Group(Group),
    Alternation(Alternation),
}

impl Ast {
    pub fn span(&self) -> &Span {
        match *self {
            Ast::Empty(ref x) => &x.span,
            Ast::Concat(ref x) => &x.span,
            Ast::Repetition(ref x) => &x.span,
            Ast::Literal(ref x) => &x.span,
            Ast::Dot(ref span) => span,
            Ast::Class(ref x) => &x.span,
            Ast::Assertion(ref x) => &x.span,
            Ast::Group(ref x) => &x.span,
            Ast::Alternation(ref x) => &x.span,
        }
    }

    /// Number of capturing groups, which is also the highest capture index.
    pub fn capture_count(&self) -> usize {
        match *self {
            Ast::Concat(ref x) => x.asts.iter().map(Ast::capture_count).max().unwrap_or(0),
            Ast::Alternation(ref x) => x.asts.iter().map(Ast::capture_count).max().unwrap_or(0),
            Ast::Repetition(ref x) => x.ast.capture_count(),
            Ast::Group(ref x) => {
                let own = match x.kind {
                    GroupKind::CaptureIndex(i) => i as usize,
                    GroupKind::NonCapturing => 0,
                };
                own.max(x.ast.capture_count())
            }
            Ast::Empty(_) | Ast::Literal(_) | Ast::Dot(_) | Ast::Class(_) | Ast::Assertion(_) => {
                0
            }
        }
    }

    /// True if every match must begin at the start of the input.
    pub fn is_anchored(&self) -> bool {
        match *self {
            Ast::Assertion(ref x) => x.kind == AssertionKind::StartLine,
            Ast::Concat(ref x) => x.asts.first().is_some_and(Ast::is_anchored),
            Ast::Alternation(ref x) => x.asts.iter().all(Ast::is_anchored),
            Ast::Group(ref x) => x.ast.is_anchored(),
            _ => false,
        }
    }
}

#[derive(PartialEq, Debug, Eq)]
pub struct Alternation {
    span: Span,
    pub asts: Vec<Ast>,
}

impl Alternation {
    pub fn into_ast(mut self) -> Ast {
        match self.asts.len() {
            0 => Ast::Empty(Empty { span: self.span }),
            1 => self.asts.pop().unwrap(),
            _ => Ast::Alternation(self),
        }
    }
}

#[derive(PartialEq, Debug, Eq)]
pub struct Group {
    span: Span,
    pub kind: GroupKind,
    pub ast: Box<Ast>,
}

impl Group {
    pub fn capture_index(&self) -> Option<u32> {
        match self.kind {
            GroupKind::CaptureIndex(i) => Some(i),
            GroupKind::NonCapturing => None,
        }
    }
}

#[derive(PartialEq, Debug, Eq, Clone, Copy)]
pub enum GroupKind {
    /// `(a)`, numbered from 1 in order of the opening parenthesis.
    CaptureIndex(u32),
    /// `(?:a)`
    NonCapturing,
}

#[derive(PartialEq, Debug, Eq)]
pub struct Empty {
    span: Span,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Concat {
    pub span: Span,
    pub asts: Vec<Ast>,
}
impl Concat {
    fn new(span: Span) -> Concat {
        Concat { span, asts: vec![] }
    }

    fn into_ast(mut self) -> Ast {
        match self.asts.len() {
            0 => Ast::Empty(Empty { span: self.span }),
            1 => self.asts.pop().unwrap(),
            _ => Ast::Concat(self),
        }
    }

    pub fn asts(&self) -> &[Ast] {
        self.asts.as_ref()
    }
}

#[derive(PartialEq, Debug, Eq)]
pub struct Literal {
    span: Span,
    pub kind: LiteralKind,
    pub char: char,
}

#[derive(PartialEq, Debug, Eq)]
pub enum LiteralKind {
    Verbatim,    // `a` or `0`
    Punctuation, // escaped `\*` or `\[`
    Special,     // `\n`, `\t` and friends
}

/// A bracketed class like `[a-z_]` or `[^0-9]`, or a Perl class like `\d`.
#[derive(PartialEq, Debug, Eq)]
pub struct Class {
    span: Span,
    pub negated: bool,
    pub ranges: Vec<ClassRange>,
}

#[derive(PartialEq, Debug, Eq, Clone, Copy)]
pub struct ClassRange {
    pub start: char,
    pub end: char,
}

impl ClassRange {
    pub fn new(start: char, end: char) -> ClassRange {
        ClassRange { start, end }
    }
}

#[derive(PartialEq, Debug, Eq)]
pub struct Assertion {
    span: Span,
    pub kind: AssertionKind,
}

#[derive(PartialEq, Debug, Eq, Clone, Copy)]
pub enum AssertionKind {
    /// `^`
    StartLine,
    /// `$`
    EndLine,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Repetition {
    span: Span,
    pub op: RepetitionOp,
    pub greedy: bool,
    pub ast: Box<Ast>,
}
impl Repetition {
    pub fn kind(&self) -> RepetitionKind {
        self.op.kind
    }
}

#[derive(PartialEq, Debug, Eq)]
pub struct RepetitionOp {
    span: Span,
    pub kind: RepetitionKind,
}

#[derive(PartialEq, Debug, Eq, Copy, Clone)]
pub enum RepetitionKind {
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
    Range(RepetitionRange),
}

#[derive(PartialEq, Debug, Eq, Copy, Clone)]
pub enum RepetitionRange {
    /// `{m}`
    Exactly(u32),
    /// `{m,}`
    AtLeast(u32),
    /// `{m,n}`
    Bounded(u32, u32),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Position {
    pub offset: usize,
}
impl Position {
    pub fn new(offset: usize) -> Position {
        Position { offset }
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Span {
    start: Position,
    end: Position,
}

impl Span {
    pub fn point(pos: Position) -> Span {
        Span {
            start: pos,
            end: pos,
        }
    }

    pub(crate) fn new(start: Position, end: Position) -> Span {
        Span { start, end }
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn end(&self) -> Position {
        self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({:?}, {:?})", self.start, self.end)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind} at {}..{} in {pattern:?}", .span.start.offset, .span.end.offset)]
pub struct Error {
    kind: ErrorKind,
    pattern: String,
    span: Span,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    RepetitionMissing,
    RepetitionCountUnclosed,
    RepetitionCountDecimalEmpty,
    RepetitionCountInvalid,
    RepetitionCountTooLarge,
    GroupUnopened,
    GroupUnclosed,
    GroupKindInvalid,
    ClassUnclosed,
    ClassRangeInvalid,
    EscapeUnexpectedEof,
    EscapeUnrecognized,
    NonAscii,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ErrorKind::*;
        match *self {
            RepetitionMissing => write!(f, "repetition operator missing expression"),
            RepetitionCountUnclosed => write!(f, "unclosed counted repetition"),
            RepetitionCountDecimalEmpty => write!(f, "repetition quantifier expects a valid decimal"),
            RepetitionCountInvalid => write!(
                f,
                "invalid repetition count range, the start must be <= the end"
            ),
            RepetitionCountTooLarge => {
                write!(f, "repetition count exceeds the limit of {}", MAX_REPETITION)
            }
            GroupUnopened => write!(f, "unopened group"),
            GroupUnclosed => write!(f, "unclosed group"),
            GroupKindInvalid => write!(f, "unrecognized group flag"),
            ClassUnclosed => write!(f, "unclosed character class"),
            ClassRangeInvalid => write!(
                f,
                "invalid character class range, the start must be <= the end"
            ),
            EscapeUnexpectedEof => write!(
                f,
                "incomplete escape sequence, reached end of pattern prematurely"
            ),
            EscapeUnrecognized => write!(f, "unrecognized escape sequence"),
            NonAscii => write!(f, "only ASCII characters are supported"),
        }
    }
}
