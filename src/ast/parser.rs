use crate::ast::{self, Ast, Position, Span, MAX_REPETITION};
use std::{borrow::Borrow, cell::Cell, result};

use super::Literal;

type Result<T> = result::Result<T, ast::Error>;

pub struct Parser {
    p: String,
    pos: Cell<Position>,
    capture_index: Cell<u32>,
    stack: Vec<GroupState>,
}

enum GroupState {
    Group {
        concat: ast::Concat,
        group: ast::Group,
    },
    Alternation {
        alt: ast::Alternation,
    },
}

impl Parser {
    pub fn new(p: String) -> Self {
        Parser {
            p,
            pos: Cell::new(Position::new(0)),
            capture_index: Cell::new(0),
            stack: vec![],
        }
    }

    fn pattern(&self) -> &str {
        self.p.borrow()
    }

    fn pos(&self) -> Position {
        self.pos.get()
    }

    fn span(&self) -> Span {
        Span::point(self.pos())
    }

    fn span_char(&self) -> Span {
        Span::new(
            self.pos(),
            Position {
                offset: self.offset() + self.char().len_utf8(),
            },
        )
    }

    fn error(&self, span: Span, kind: ast::ErrorKind) -> ast::Error {
        ast::Error {
            kind,
            pattern: self.pattern().to_string(),
            span,
        }
    }

    fn offset(&self) -> usize {
        self.pos().offset
    }

    fn bump(&self) -> bool {
        if self.is_eof() {
            return false;
        }
        self.pos
            .set(Position::new(self.pos().offset + self.char().len_utf8()));
        self.pattern()[self.offset()..].chars().next().is_some()
    }

    fn is_eof(&self) -> bool {
        self.offset() == self.p.len()
    }

    fn char(&self) -> char {
        self.char_at(self.pos().offset)
    }

    fn char_at(&self, i: usize) -> char {
        self.pattern()[i..]
            .chars()
            .next()
            .unwrap_or_else(|| panic!("expected char at offset {}", i))
    }

    fn peek(&self) -> Option<char> {
        if self.is_eof() {
            return None;
        }
        self.pattern()[self.offset() + self.char().len_utf8()..]
            .chars()
            .next()
    }

    pub fn parse(&mut self) -> Result<Ast> {
        if let Some((i, c)) = self.pattern().char_indices().find(|(_, c)| !c.is_ascii()) {
            let span = Span::new(Position::new(i), Position::new(i + c.len_utf8()));
            return Err(self.error(span, ast::ErrorKind::NonAscii));
        }

        let mut concat = ast::Concat::new(self.span());
        loop {
            if self.is_eof() {
                break;
            }

            match self.char() {
                '(' => concat = self.push_group(concat)?,
                ')' => concat = self.pop_group(concat)?,
                '|' => concat = self.push_alternate(concat)?,
                '?' => concat = self.parse_repetition(concat, ast::RepetitionKind::ZeroOrOne)?,
                '*' => concat = self.parse_repetition(concat, ast::RepetitionKind::ZeroOrMore)?,
                '+' => concat = self.parse_repetition(concat, ast::RepetitionKind::OneOrMore)?,
                '{' => concat = self.parse_counted_repetition(concat)?,
                '[' => concat.asts.push(Ast::Class(self.parse_class()?)),
                '\\' => concat.asts.push(self.parse_escape()?),
                '.' => {
                    concat.asts.push(Ast::Dot(self.span_char()));
                    self.bump();
                }
                '^' => concat.asts.push(self.parse_assertion(ast::AssertionKind::StartLine)),
                '$' => concat.asts.push(self.parse_assertion(ast::AssertionKind::EndLine)),
                _ => concat.asts.push(Ast::Literal(self.parse_primitive()?)),
            }
        }

        let ast = self.pop_end(concat)?;
        Ok(ast)
    }

    fn parse_primitive(&self) -> Result<Literal> {
        let l = Literal {
            span: self.span_char(),
            kind: ast::LiteralKind::Verbatim,
            char: self.char(),
        };
        self.bump();
        Ok(l)
    }

    fn parse_assertion(&self, kind: ast::AssertionKind) -> Ast {
        let a = ast::Assertion {
            span: self.span_char(),
            kind,
        };
        self.bump();
        Ast::Assertion(a)
    }

    fn parse_escape(&self) -> Result<Ast> {
        assert_eq!(self.char(), '\\');
        let start = self.pos();
        if !self.bump() {
            return Err(self.error(
                Span::new(start, self.pos()),
                ast::ErrorKind::EscapeUnexpectedEof,
            ));
        }
        let c = self.char();
        self.bump();
        let span = Span::new(start, self.pos());
        let literal = |kind, char| Ok(Ast::Literal(Literal { span, kind, char }));
        match c {
            'd' | 'D' | 's' | 'S' | 'w' | 'W' => Ok(Ast::Class(perl_class(span, c))),
            c if c.is_ascii_punctuation() => literal(ast::LiteralKind::Punctuation, c),
            c => match special(c) {
                Some(s) => literal(ast::LiteralKind::Special, s),
                None => Err(self.error(span, ast::ErrorKind::EscapeUnrecognized)),
            },
        }
    }

    fn parse_class(&self) -> Result<ast::Class> {
        assert_eq!(self.char(), '[');
        let start = self.pos();
        let unclosed = || {
            self.error(
                Span::new(start, Position::new(start.offset + 1)),
                ast::ErrorKind::ClassUnclosed,
            )
        };
        if !self.bump() {
            return Err(unclosed());
        }
        let mut negated = false;
        if self.char() == '^' {
            negated = true;
            if !self.bump() {
                return Err(unclosed());
            }
        }

        let mut ranges = vec![];
        loop {
            if self.is_eof() {
                return Err(unclosed());
            }
            // A leading `]` is a literal.
            if self.char() == ']' && !ranges.is_empty() {
                break;
            }
            let item_start = self.pos();
            let lo = self.parse_class_char()?;
            let is_range = !self.is_eof()
                && self.char() == '-'
                && self.peek().is_some_and(|c| c != ']');
            if is_range {
                self.bump();
                let hi = self.parse_class_char()?;
                if lo > hi {
                    return Err(self.error(
                        Span::new(item_start, self.pos()),
                        ast::ErrorKind::ClassRangeInvalid,
                    ));
                }
                ranges.push(ast::ClassRange::new(lo, hi));
            } else {
                ranges.push(ast::ClassRange::new(lo, lo));
            }
        }
        self.bump();
        Ok(ast::Class {
            span: Span::new(start, self.pos()),
            negated,
            ranges,
        })
    }

    /// One (possibly escaped) character inside brackets.
    fn parse_class_char(&self) -> Result<char> {
        let c = self.char();
        if c != '\\' {
            self.bump();
            return Ok(c);
        }
        let start = self.pos();
        if !self.bump() {
            return Err(self.error(
                Span::new(start, self.pos()),
                ast::ErrorKind::EscapeUnexpectedEof,
            ));
        }
        let c = self.char();
        self.bump();
        if c.is_ascii_punctuation() {
            return Ok(c);
        }
        special(c).ok_or_else(|| {
            self.error(
                Span::new(start, self.pos()),
                ast::ErrorKind::EscapeUnrecognized,
            )
        })
    }

    fn parse_repetition(
        &self,
        mut concat: ast::Concat,
        kind: ast::RepetitionKind,
    ) -> Result<ast::Concat> {
        assert!(self.char() == '?' || self.char() == '*' || self.char() == '+');

        let start = self.pos();
        let ast = concat
            .asts
            .pop()
            .ok_or_else(|| self.error(self.span(), ast::ErrorKind::RepetitionMissing))?;

        let mut greedy = true;
        if self.bump() && self.char() == '?' {
            greedy = false;
            self.bump();
        }
        concat.asts.push(Ast::Repetition(ast::Repetition {
            span: Span::new(ast.span().start(), self.pos()),
            op: ast::RepetitionOp {
                span: Span::new(start, self.pos()),
                kind,
            },
            greedy,
            ast: Box::new(ast),
        }));
        Ok(concat)
    }

    fn parse_counted_repetition(&self, mut concat: ast::Concat) -> Result<ast::Concat> {
        use ast::RepetitionRange::*;
        assert_eq!(self.char(), '{');

        let start = self.pos();
        let ast = concat
            .asts
            .pop()
            .ok_or_else(|| self.error(self.span(), ast::ErrorKind::RepetitionMissing))?;
        let unclosed =
            || self.error(Span::new(start, self.pos()), ast::ErrorKind::RepetitionCountUnclosed);

        if !self.bump() {
            return Err(unclosed());
        }
        let min = self.parse_decimal()?;
        let range = if self.is_eof() {
            return Err(unclosed());
        } else if self.char() == ',' {
            if !self.bump() {
                return Err(unclosed());
            }
            if self.char() == '}' {
                AtLeast(min)
            } else {
                Bounded(min, self.parse_decimal()?)
            }
        } else {
            Exactly(min)
        };
        if self.is_eof() || self.char() != '}' {
            return Err(unclosed());
        }
        self.bump();
        if let Bounded(m, n) = range {
            if m > n {
                return Err(self.error(
                    Span::new(start, self.pos()),
                    ast::ErrorKind::RepetitionCountInvalid,
                ));
            }
        }

        let mut greedy = true;
        if !self.is_eof() && self.char() == '?' {
            greedy = false;
            self.bump();
        }
        concat.asts.push(Ast::Repetition(ast::Repetition {
            span: Span::new(ast.span().start(), self.pos()),
            op: ast::RepetitionOp {
                span: Span::new(start, self.pos()),
                kind: ast::RepetitionKind::Range(range),
            },
            greedy,
            ast: Box::new(ast),
        }));
        Ok(concat)
    }

    fn parse_decimal(&self) -> Result<u32> {
        let start = self.pos();
        let mut n: u32 = 0;
        let mut digits = 0;
        while !self.is_eof() {
            let Some(d) = self.char().to_digit(10) else {
                break;
            };
            n = n.saturating_mul(10).saturating_add(d);
            digits += 1;
            self.bump();
        }
        let span = Span::new(start, self.pos());
        if digits == 0 {
            return Err(self.error(span, ast::ErrorKind::RepetitionCountDecimalEmpty));
        }
        if n > MAX_REPETITION {
            return Err(self.error(span, ast::ErrorKind::RepetitionCountTooLarge));
        }
        Ok(n)
    }

    fn push_group(&mut self, concat: ast::Concat) -> Result<ast::Concat> {
        assert!(self.char() == '(');
        let start = self.pos();
        let kind = if self.peek() == Some('?') {
            self.bump();
            if self.peek() != Some(':') {
                let end = Position::new(self.offset() + 1);
                return Err(self.error(Span::new(start, end), ast::ErrorKind::GroupKindInvalid));
            }
            self.bump();
            ast::GroupKind::NonCapturing
        } else {
            let index = self.capture_index.get() + 1;
            self.capture_index.set(index);
            ast::GroupKind::CaptureIndex(index)
        };
        self.bump();
        self.stack.push(GroupState::Group {
            concat,
            group: ast::Group {
                span: Span::new(start, self.pos()),
                kind,
                ast: Box::new(Ast::Empty(ast::Empty { span: self.span() })),
            },
        });
        Ok(ast::Concat::new(self.span()))
    }

    fn pop_group(&mut self, mut group_concat: ast::Concat) -> Result<ast::Concat> {
        use self::GroupState::*;

        assert!(self.char() == ')');
        let err = Err(self.error(self.span_char(), ast::ErrorKind::GroupUnopened));
        let (mut before_concat, mut group, alt) = match self.stack.pop() {
            None => return err,
            Some(Group { concat, group }) => (concat, group, None),
            Some(Alternation { alt }) => match self.stack.pop() {
                Some(Group { concat, group }) => (concat, group, Some(alt)),
                Some(Alternation { .. }) | None => return err,
            },
        };
        group_concat.span.end = self.pos();
        self.bump();
        group.span.end = self.pos();

        match alt {
            Some(mut alt) => {
                alt.span.end = group_concat.span.end;
                alt.asts.push(group_concat.into_ast());
                group.ast = Box::new(alt.into_ast());
            }
            None => {
                group.ast = Box::new(group_concat.into_ast());
            }
        }

        before_concat.asts.push(Ast::Group(group));
        Ok(before_concat)
    }

    fn push_alternate(&mut self, mut concat: ast::Concat) -> Result<ast::Concat> {
        assert_eq!(self.char(), '|');
        concat.span.end = self.pos();
        match self.stack.last_mut() {
            Some(GroupState::Alternation { ref mut alt }) => {
                alt.asts.push(concat.into_ast());
            }
            _ => {
                let alt = ast::Alternation {
                    span: Span::new(concat.span.start, self.pos()),
                    asts: vec![concat.into_ast()],
                };
                self.stack.push(GroupState::Alternation { alt })
            }
        };

        self.bump();
        Ok(ast::Concat {
            span: self.span(),
            asts: vec![],
        })
    }

    fn pop_end(&mut self, mut concat: ast::Concat) -> Result<Ast> {
        concat.span.end = self.pos();
        let ast = match self.stack.pop() {
            Some(GroupState::Alternation { mut alt }) => {
                alt.span.end = self.pos();
                alt.asts.push(concat.into_ast());
                Ok(Ast::Alternation(alt))
            }
            Some(GroupState::Group { group, .. }) => {
                return Err(self.error(group.span, ast::ErrorKind::GroupUnclosed))
            }
            None => Ok(concat.into_ast()),
        };
        match self.stack.pop() {
            Some(GroupState::Alternation { .. }) => unreachable!(),
            Some(GroupState::Group { group, .. }) => {
                Err(self.error(group.span, ast::ErrorKind::GroupUnclosed))
            }
            None => ast,
        }
    }
}

fn special(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        _ => None,
    }
}

fn perl_class(span: Span, c: char) -> ast::Class {
    use ast::ClassRange as R;
    let ranges = match c.to_ascii_lowercase() {
        'd' => vec![R::new('0', '9')],
        's' => vec![R::new('\t', '\r'), R::new(' ', ' ')],
        _ => vec![
            R::new('0', '9'),
            R::new('A', 'Z'),
            R::new('_', '_'),
            R::new('a', 'z'),
        ],
    };
    ast::Class {
        span,
        negated: c.is_ascii_uppercase(),
        ranges,
    }
}
