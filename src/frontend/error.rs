/// Everything that can go wrong in a translation session. All variants are
/// terminal: the session cannot be resumed after one is raised.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unexpected character '{0}'")]
    Lex(String),
    #[error("syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },
    #[error("program must define a 'main' function")]
    MissingMain,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
        }
    }

    /// Attaches a line number to a lexical failure surfaced through
    /// `parse_line`.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            Self::Lex(_) => {
                let message = self.to_string();
                Self::syntax(line, message)
            }
            other => other,
        }
    }
}
