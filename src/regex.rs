use std::ops::Range;

use tracing::debug;

use crate::ast::parser::Parser;
use crate::automata::compiler::{tag_count, Compiler};
use crate::automata::dfa::{Config, Dfa};
use crate::errors::Error;
use crate::executor::{Executor, ExecutorType, Match};

/// A pattern compiled to a tagged DFA that searches for its leftmost
/// longest match and reports the position of every capturing group.
pub struct Regex {
    dfa: Dfa,
    captures_len: usize,
}

impl Regex {
    pub fn new(pat: &str) -> Result<Regex, Error> {
        Builder::new(pat).build()
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.exec(s.as_bytes(), ExecutorType::Dfa).is_success()
    }

    /// Byte ranges of the whole match and of each group, or `None` if the
    /// pattern does not occur in `s`.
    pub fn captures(&self, s: &str) -> Option<Vec<Option<Range<usize>>>> {
        let m = self.exec(s.as_bytes(), ExecutorType::Dfa);
        if !m.is_success() {
            return None;
        }
        Some((0..self.captures_len).map(|i| m.group(i)).collect())
    }

    pub fn exec(&self, input: &[u8], typ: ExecutorType) -> Match {
        Executor::new(typ).exec(&self.dfa, input)
    }

    /// Number of groups, counting the whole match as group 0.
    pub fn captures_len(&self) -> usize {
        self.captures_len
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    pub fn emit_c(&self) -> String {
        self.dfa.emit_c()
    }
}

pub struct Builder {
    pattern: String,
    anchored: bool,
    fail: String,
    success: String,
    config: Config,
}

impl Builder {
    pub fn new(pattern: &str) -> Builder {
        Builder {
            pattern: pattern.to_string(),
            anchored: false,
            fail: "return 0;".to_string(),
            success: "return 1;".to_string(),
            config: Config::new(),
        }
    }

    /// Only look for a match at the start of the input. A pattern that
    /// begins with `^` is always anchored.
    pub fn anchored(mut self, yes: bool) -> Builder {
        self.anchored = yes;
        self
    }

    /// The C statements the emitted matcher runs when it fails and when it
    /// succeeds.
    pub fn outcomes(mut self, fail: &str, success: &str) -> Builder {
        self.fail = fail.to_string();
        self.success = success.to_string();
        self
    }

    pub fn config(mut self, config: Config) -> Builder {
        self.config = config;
        self
    }

    pub fn build(&self) -> Result<Regex, Error> {
        let ast = Parser::new(self.pattern.clone()).parse()?;
        let anchored = self.anchored || ast.is_anchored();
        let ntags = tag_count(&ast);
        debug!(pattern = %self.pattern, anchored, ntags, "compiling");
        let program = Compiler::new().compile_matcher(&ast, anchored)?;
        let dfa = Dfa::new(
            program,
            ntags,
            vec![self.fail.clone(), self.success.clone()],
            &self.config,
        )?;
        Ok(Regex {
            dfa,
            captures_len: ntags / 2,
        })
    }
}
