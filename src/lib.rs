//! Line-oriented translator from a restricted C subset to three-address
//! code.
//!
//! The crate is a fail-fast, single-pass front end: [`frontend::syntax`]
//! turns one line at a time into tokens and [`frontend::Compiler`] folds
//! those lines into symbols and linear IR, tracking the open control-flow
//! constructs across lines.

pub mod frontend;

pub use frontend::{Compiler, Error, Symbol};
