mod compiler;
mod error;
pub mod ir;
pub mod syntax;

pub use compiler::{Compiler, Symbol};
pub use error::Error;
