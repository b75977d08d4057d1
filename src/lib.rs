//! Regular expressions compiled to tagged DFAs (Laurikari's TDFA), which
//! track the positions of capturing groups while matching in a single
//! pass, and emitted as self-contained C matching code.

pub mod ast;
pub mod automata;
pub mod errors;
pub mod executor;
pub mod regex;

pub use crate::automata::dfa::{AcceptPolicy, Config, Dfa};
pub use crate::errors::Error;
pub use crate::executor::{Executor, ExecutorType, Match};
pub use crate::regex::{Builder, Regex};
