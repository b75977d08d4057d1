//! C code generation for a finished tagged DFA.
//!
//! The generated block expects the host to define `YYCURSOR` (a pointer to
//! the next input byte), `YYLENGTH` (the number of bytes consumed so far),
//! `YYTAG(t, v)` (slot storage, at least `nmapitems` versions per tag) and
//! `YYFINAL(i)` (the output tags).

use crate::automata::action::{Action, TdfaInsn};
use crate::automata::dfa::{Dfa, Span, State, FAIL_OUTCOME, SUCCESS_OUTCOME};
use crate::automata::program::{escape, UNKNOWN_CHAR};

/// An indenting line buffer.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    level: usize,
}

impl CodeWriter {
    pub fn new() -> CodeWriter {
        CodeWriter::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.level {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

fn c_char(c: u8) -> String {
    format!("'{}'", escape(c))
}

impl Dfa {
    /// Emits the matcher as a single C block.
    pub fn emit(&self, w: &mut CodeWriter) {
        w.line("{");
        w.indent();
        if self.ntags > 0 {
            w.line("unsigned int i;");
            self.emit_reset(w);
        }
        self.emit_action(w, &self.initializer);

        let first = self.start();
        if first.accepts {
            self.emit_action(w, &first.finalizer);
            if self.ntags == 0 {
                self.emit_finish(w, Some(first.accept_outcome));
            }
        }

        for s in self.states.iter().filter(|s| !s.is_dead()) {
            self.emit_state(w, s);
        }
        w.line("yyfinish: ;");
        w.dedent();
        w.line("}");
    }

    pub fn emit_c(&self) -> String {
        let mut w = CodeWriter::new();
        self.emit(&mut w);
        w.finish()
    }

    /// Emits `name = ntags;`, telling the host how many output tags to
    /// read back.
    pub fn emit_tag_count(&self, w: &mut CodeWriter, name: &str) {
        w.line(format!("{} = {};", name, self.ntags));
    }

    fn emit_state(&self, w: &mut CodeWriter, s: &State) {
        w.line(format!("yystate{}:", s.label));
        w.line("switch (*YYCURSOR) {");
        w.indent();
        let mut default_span = None;
        for span in &s.spans {
            if span.lb == 0 {
                w.line(format!("case {}:", c_char(0)));
                w.indent();
                self.emit_terminator(w, span);
                w.dedent();
            }
            let mut labelled = false;
            for c in span.lb.max(1)..=span.ub {
                if c >= UNKNOWN_CHAR {
                    default_span = Some(span);
                    continue;
                }
                w.line(format!("case {}:", c_char(c)));
                labelled = true;
            }
            if labelled {
                w.indent();
                self.emit_jump(w, span);
                w.dedent();
            }
        }
        if let Some(span) = default_span {
            w.line("default:");
            w.indent();
            self.emit_jump(w, span);
            w.dedent();
        }
        w.dedent();
        w.line("}");
    }

    /// The terminator consumes nothing and always ends the match.
    fn emit_terminator(&self, w: &mut CodeWriter, span: &Span) {
        self.emit_action(w, &span.action);
        let to = self.state(span.to);
        if !to.accepts {
            self.emit_finish(w, None);
        } else if self.ntags == 0 || to.finalizer.is_empty() {
            self.emit_action(w, &to.finalizer);
            self.emit_finish(w, Some(to.accept_outcome));
        } else {
            self.emit_longest_match(w, to);
            self.emit_finish(w, None);
        }
    }

    fn emit_jump(&self, w: &mut CodeWriter, span: &Span) {
        w.line("YYCURSOR++;");
        self.emit_action(w, &span.action);
        let to = self.state(span.to);
        if to.is_dead() {
            self.emit_finish(w, None);
        } else if !to.accepts {
            w.line(format!("goto yystate{};", to.label));
        } else if self.ntags == 0 || to.finalizer.is_empty() {
            self.emit_action(w, &to.finalizer);
            self.emit_finish(w, Some(to.accept_outcome));
        } else {
            self.emit_longest_match(w, to);
            w.line(format!("goto yystate{};", to.label));
        }
    }

    /// Records `to`'s match unless an earlier match is at least as long.
    fn emit_longest_match(&self, w: &mut CodeWriter, to: &State) {
        match to.finalizer.tag_zero_source().filter(|_| self.ntags > 1) {
            Some(m) => {
                let tag = format!("YYTAG({},{})", m.tag, m.version);
                w.line(format!(
                    "if ( YYFINAL(0) < 0 || ({} == YYFINAL(0) &&",
                    tag
                ));
                w.line(format!(
                    "    (YYLENGTH - {}) > (YYFINAL(1) - YYFINAL(0)))) {{",
                    tag
                ));
            }
            None => w.line("if ( YYFINAL(0) < 0 ) {"),
        }
        w.indent();
        self.emit_reset(w);
        self.emit_action(w, &to.finalizer);
        w.dedent();
        w.line("}");
    }

    /// Runs the outcome for an accepting state, or picks success or
    /// failure from the recorded match, then leaves the block.
    fn emit_finish(&self, w: &mut CodeWriter, accepted: Option<usize>) {
        if self.ntags == 0 {
            if let Some(outcome) = accepted {
                w.line(&self.outcome_snippets[outcome]);
            }
        } else {
            w.line("if ( YYFINAL(0) >= 0 ) {");
            w.indent();
            w.line(&self.outcome_snippets[SUCCESS_OUTCOME]);
            w.dedent();
            w.line("} else {");
            w.indent();
            w.line(&self.outcome_snippets[FAIL_OUTCOME]);
            w.dedent();
            w.line("}");
        }
        w.line("goto yyfinish;");
    }

    fn emit_reset(&self, w: &mut CodeWriter) {
        w.line(format!("for (i = 0; i < {}; i++)", self.ntags));
        w.indent();
        w.line("YYFINAL(i) = -1;");
        w.dedent();
    }

    fn emit_action(&self, w: &mut CodeWriter, action: &Action) {
        for insn in action.iter() {
            match *insn {
                TdfaInsn::SavePos { to } => {
                    w.line(format!("YYTAG({},{}) = YYLENGTH;", to.tag, to.version))
                }
                TdfaInsn::Copy { to, from } => w.line(format!(
                    "YYTAG({},{}) = YYTAG({},{});",
                    to.tag, to.version, from.tag, from.version
                )),
                TdfaInsn::SaveTag { tag, from } => w.line(format!(
                    "YYFINAL({}) = YYTAG({},{});",
                    tag, from.tag, from.version
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::dfa::Config;
    use crate::automata::program::{CharRange, Inst, InstChar, InstTag, Program};
    use pretty_assertions::assert_eq;

    fn chr(lb: u8, ub: u8, goto: usize) -> Inst {
        Inst::Char(InstChar {
            ranges: vec![CharRange { lb, ub, goto }],
        })
    }

    fn dfa(insts: Vec<Inst>, ntags: usize, snippets: &[&str]) -> Dfa {
        Dfa::new(
            Program { insts, start: 0 },
            ntags,
            snippets.iter().map(|s| s.to_string()).collect(),
            &Config::new(),
        )
        .unwrap()
    }

    #[test]
    fn writer() {
        let mut w = CodeWriter::new();
        w.line("{");
        w.indent();
        w.line("x;");
        w.dedent();
        w.dedent();
        w.line("}");
        assert_eq!(w.finish(), "{\n  x;\n}\n");
    }

    #[test]
    fn untagged() {
        let d = dfa(vec![chr(b'a', b'a', 1), Inst::Accept(0)], 0, &["return 1;"]);
        let c = d.emit_c();
        assert!(c.starts_with(
            "{\n  yystate0:\n  switch (*YYCURSOR) {\n    case '\\0':\n      goto yyfinish;\n"
        ));
        assert!(c.contains("    case 'a':\n      YYCURSOR++;\n      return 1;\n      goto yyfinish;\n"));
        assert!(c.contains("    default:\n      YYCURSOR++;\n      goto yyfinish;\n"));
        assert!(c.ends_with("  }\n  yyfinish: ;\n}\n"));
        // The dead state never gets a block of its own.
        assert!(!c.contains("yystate1:"));
        assert!(!c.contains("YYFINAL"));
    }

    #[test]
    fn empty_pattern_accepts_up_front() {
        let d = dfa(vec![Inst::Accept(0)], 0, &["return 7;"]);
        let c = d.emit_c();
        assert!(c.starts_with("{\n  return 7;\n  goto yyfinish;\n"));
    }

    #[test]
    fn tagged() {
        // t0 a t1 ACCEPT1, with the terminator ending the match.
        let d = dfa(
            vec![
                Inst::Tag(InstTag { tag: 0, goto: 1 }),
                chr(b'a', b'a', 2),
                Inst::Tag(InstTag { tag: 1, goto: 3 }),
                chr(0, 0, 4),
                Inst::Accept(1),
            ],
            2,
            &["return 0;", "return 1;"],
        );
        let c = d.emit_c();
        assert!(c.starts_with(
            "{\n  unsigned int i;\n  for (i = 0; i < 2; i++)\n    YYFINAL(i) = -1;\n  YYTAG(0,1) = YYLENGTH;\n"
        ));
        assert!(c.contains(
            "    case 'a':\n      YYCURSOR++;\n      YYTAG(1,1) = YYLENGTH;\n      goto yystate2;\n"
        ));
        assert!(c.contains(
            "      if ( YYFINAL(0) < 0 || (YYTAG(0,1) == YYFINAL(0) &&\n          (YYLENGTH - YYTAG(0,1)) > (YYFINAL(1) - YYFINAL(0)))) {\n        for (i = 0; i < 2; i++)\n          YYFINAL(i) = -1;\n        YYFINAL(0) = YYTAG(0,1);\n        YYFINAL(1) = YYTAG(1,1);\n      }\n"
        ));
        assert!(c.contains(
            "      if ( YYFINAL(0) >= 0 ) {\n        return 1;\n      } else {\n        return 0;\n      }\n      goto yyfinish;\n"
        ));
        // The terminator never advances the cursor.
        assert!(!c.contains("case '\\0':\n      YYCURSOR++;"));
    }

    #[test]
    fn tag_count() {
        let d = dfa(vec![Inst::Accept(0)], 0, &["return 0;"]);
        let mut w = CodeWriter::new();
        d.emit_tag_count(&mut w, "num_final_tags");
        assert_eq!(w.finish(), "num_final_tags = 0;\n");
    }
}
