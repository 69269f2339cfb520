mod lexer;

pub use lexer::{tokenize, Token, TokenKind};
