use derive_more::Display;

/// Reader-syntax errors (spec §7 "Reader syntax"). Every variant is
/// recovered the same way by the caller: print a diagnostic, yield
/// `Word::unspecified()` as the read result.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[display(fmt = "unexpected end of input inside a {_0}")]
    UnexpectedEof(&'static str),
    #[display(fmt = "unbalanced closing delimiter '{_0}'")]
    UnbalancedDelimiter(char),
    #[display(fmt = "integer literal '{_0}' is out of small-integer range")]
    IntegerOutOfRange(String),
    #[display(fmt = "unrecognised '#' token '#{_0}'")]
    UnknownSharpToken(String),
    #[display(fmt = "unrecognised character name '#\\{_0}'")]
    UnknownCharName(String),
    #[display(fmt = "unterminated string literal")]
    UnterminatedString,
    #[display(fmt = "invalid escape sequence '\\{_0}' in string literal")]
    InvalidEscape(char),
    /// The heap itself failed underneath the reader (spec's Allocation
    /// failure kind, not a reader-syntax kind — fatal, not recovered here).
    #[display(fmt = "{_0}")]
    Heap(suo_runtime::RuntimeError),
}

impl std::error::Error for ReaderError {}

impl From<suo_runtime::RuntimeError> for ReaderError {
    fn from(e: suo_runtime::RuntimeError) -> Self {
        ReaderError::Heap(e)
    }
}
