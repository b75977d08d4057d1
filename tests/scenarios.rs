//! End-to-end scenarios: pattern in, automaton and match positions out.

use pretty_assertions::assert_eq;
use tdfa::ast::parser::Parser;
use tdfa::automata::compiler::Compiler;
use tdfa::automata::program::{CharRange, Inst, InstChar, InstFork, Program};
use tdfa::{Builder, Config, Dfa, Error, ExecutorType, Match, Regex};

fn outcomes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("return {};", i)).collect()
}

fn both(re: &Regex, input: &str) -> Match {
    let dfa = re.exec(input.as_bytes(), ExecutorType::Dfa);
    let lazy = re.exec(input.as_bytes(), ExecutorType::Lazy);
    assert_eq!(dfa, lazy, "executors disagree on {:?}", input);
    dfa
}

#[test]
fn single_char() {
    let re = Regex::new("a").unwrap();
    let m = both(&re, "a");
    assert!(m.is_success());
    assert_eq!(vec![Some(0), Some(1)], m.tags);
}

#[test]
fn star_is_longest() {
    let re = Regex::new("a*").unwrap();
    assert_eq!(vec![Some(0), Some(3)], both(&re, "aaa").tags);
}

#[test]
fn optional_group_unmatched() {
    let re = Regex::new("(a)(b)?").unwrap();
    let m = both(&re, "a");
    assert_eq!(Some(0..1), m.group(0));
    assert_eq!(Some(0..1), m.group(1));
    assert_eq!(None, m.group(2));
    assert_eq!(Some(vec![Some(0..1), Some(0..1), None]), re.captures("a"));
}

#[test]
fn anchored_no_match() {
    let re = Builder::new("ab").anchored(true).build().unwrap();
    let m = both(&re, "cab");
    assert_eq!(Some(0), m.outcome);
    assert_eq!(vec![None, None], m.tags);
    assert_eq!(None, re.captures("cab"));
}

#[test]
fn leftmost_then_longest() {
    let re = Regex::new("b+|ab").unwrap();
    assert_eq!(Some(vec![Some(1..3)]), re.captures("xabbb"));
    let re = Regex::new("x(a|ab)(c|bcd)").unwrap();
    assert_eq!(
        Some(vec![Some(0..5), Some(1..2), Some(2..5)]),
        re.captures("xabcd")
    );
}

#[test]
fn non_ascii_input() {
    let re = Regex::new("a.b").unwrap();
    let m = re.exec(b"a\x80b", ExecutorType::Dfa);
    assert_eq!(Some(0..3), m.group(0));
    assert_eq!(m, re.exec(b"a\x80b", ExecutorType::Lazy));
    // U+0080 is two bytes, each its own symbol.
    assert_eq!(None, re.captures("a\u{80}b"));
}

#[test]
fn outcome_counts() {
    let program = |accept: usize| Program {
        insts: vec![
            Inst::Char(InstChar {
                ranges: vec![CharRange {
                    lb: b'a',
                    ub: b'a',
                    goto: 1,
                }],
            }),
            Inst::Accept(accept),
        ],
        start: 0,
    };
    assert!(Dfa::new(program(2), 0, outcomes(3), &Config::new()).is_ok());
    assert_eq!(
        Some(Error::NoOutcomes),
        Dfa::new(program(0), 0, outcomes(0), &Config::new()).err()
    );
    assert_eq!(
        Some(Error::OutcomeCount(3)),
        Dfa::new(program(0), 2, outcomes(3), &Config::new()).err()
    );
    assert_eq!(
        Some(Error::OutcomeCount(1)),
        Dfa::new(program(0), 2, outcomes(1), &Config::new()).err()
    );
}

#[test]
fn loops_terminate() {
    // A fork whose preferred branch jumps straight back to itself.
    let program = Program {
        insts: vec![
            Inst::Fork(InstFork {
                next: 2,
                link: 1,
                prefer_link: true,
            }),
            Inst::Goto(0),
            Inst::Accept(0),
        ],
        start: 0,
    };
    let dfa = Dfa::new(program, 0, outcomes(1), &Config::new()).unwrap();
    assert!(dfa.start().accepts);

    let re = Regex::new("(?:a*)*").unwrap();
    assert_eq!(vec![Some(0), Some(3)], both(&re, "aaa").tags);
    let re = Regex::new("(|a)+b").unwrap();
    assert_eq!(Some(0..2), both(&re, "ab").group(0));
}

#[test]
fn rules() {
    let asts: Vec<_> = ["a$", "b$", "[a-z]$"]
        .iter()
        .map(|r| Parser::new(r.to_string()).parse().unwrap())
        .collect();
    let program = Compiler::untagged().compile_rules(&asts).unwrap();
    let dfa = Dfa::new(program, 0, outcomes(3), &Config::new()).unwrap();
    let run = |input: &str| {
        tdfa::Executor::new(ExecutorType::Dfa)
            .exec(&dfa, input.as_bytes())
            .outcome
    };
    // The highest outcome wins among simultaneous accepts.
    assert_eq!(Some(2), run("a"));
    assert_eq!(Some(2), run("z"));
    assert_eq!(None, run("A"));
    assert_eq!(None, run("ab"));

    let c = dfa.emit_c();
    assert!(c.contains("return 2;"));
    assert!(!c.contains("YYFINAL"));
}

#[test]
fn emitted_matcher() {
    let re = Builder::new("(x+)")
        .outcomes("goto fail;", "goto done;")
        .build()
        .unwrap();
    let c = re.emit_c();
    assert!(c.starts_with("{\n  unsigned int i;\n  for (i = 0; i < 4; i++)\n"));
    assert!(c.contains("goto done;"));
    assert!(c.contains("goto fail;"));
    assert!(c.ends_with("  yyfinish: ;\n}\n"));
    // Every jump target has a block.
    for line in c.lines() {
        if let Some(label) = line.trim().strip_prefix("goto yystate") {
            let label = label.trim_end_matches(';');
            assert!(c.contains(&format!("yystate{}:", label)));
        }
    }
}

#[test]
fn dump_and_json() {
    let re = Regex::new("(a|b)c").unwrap();
    let dump = re.dfa().to_string();
    assert!(dump.starts_with("initializer {"));
    assert!(dump.contains("state 0"));
    assert_eq!(dump, Regex::new("(a|b)c").unwrap().dfa().to_string());

    let json = serde_json::to_value(re.dfa()).unwrap();
    assert_eq!(4, json["ntags"]);
    assert_eq!(re.dfa().states.len(), json["states"].as_array().unwrap().len());
}
