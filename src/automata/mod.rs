pub mod action;
pub mod compiler;
pub mod dfa;
pub mod emit;
pub mod kernel;
pub mod priority;
pub mod program;
