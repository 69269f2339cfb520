use logos::Logos;

use crate::frontend::Error;

/// Lexical classes of the source language.
///
/// Disambiguation mirrors the fixed pattern priority of the language: a
/// preprocessor line swallows everything to the end of the line, keywords
/// beat identifiers at equal length, operators lex as maximal runs.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    #[regex(r"#.*")]
    Preprocessor,

    #[regex(r#""[^"]*""#)]
    Str,

    #[regex(r"%[dfcs]")]
    Format,

    #[token("int")]
    #[token("float")]
    #[token("char")]
    #[token("void")]
    #[token("return")]
    #[token("if")]
    #[token("else")]
    #[token("while")]
    #[token("for")]
    #[token("print")]
    Keyword,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Ident,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r"[+\-*/=<>!&|%]+")]
    Operator,

    #[regex(r"[(){},;]")]
    Delimiter,

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Error,
}

/// A single lexeme: its class plus the exact source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    #[inline]
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

/// Tokenizes one line of source text, discarding whitespace.
///
/// Fails on the first character no pattern matches. Pure: the same line
/// always yields the same sequence.
pub fn tokenize(line: &str) -> Result<Vec<Token>, Error> {
    let mut lexer = TokenKind::lexer(line);
    let mut tokens = Vec::new();

    while let Some(kind) = lexer.next() {
        if kind == TokenKind::Error {
            return Err(Error::Lex(lexer.slice().to_string()));
        }

        tokens.push(Token {
            kind,
            text: lexer.slice().to_string(),
        });
    }

    Ok(tokens)
}
