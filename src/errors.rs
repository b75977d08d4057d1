use crate::ast;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    Syntax(#[from] ast::Error),
    #[error("entry instruction {0} is out of bounds")]
    BadEntry(usize),
    #[error("instruction {ip} jumps to {target}, which is out of bounds")]
    DanglingTarget { ip: usize, target: usize },
    #[error("instruction {ip} uses tag {tag}, but only {ntags} tags exist")]
    TagOutOfRange { ip: usize, tag: usize, ntags: usize },
    #[error("instruction {ip} has an invalid character range {lb}-{ub}")]
    BadCharRange { ip: usize, lb: u8, ub: u8 },
    #[error("at least one outcome is required")]
    NoOutcomes,
    #[error("a capturing automaton needs exactly two outcomes, got {0}")]
    OutcomeCount(usize),
    #[error("instruction {ip} accepts with outcome {outcome}, but only {count} outcomes exist")]
    OutcomeOutOfRange {
        ip: usize,
        outcome: usize,
        count: usize,
    },
    #[error("automaton construction exceeded {0} states")]
    StateLimit(usize),
}
