use derive_more::Display;

/// Top-level error type, aggregating every library crate's error plus the
/// handful of faults that belong only to the surface shim and the wire
/// protocol (spec §7). Follows the same shape as the library crates'
/// own error enums; `suo` is the one crate allowed to also reach for
/// `anyhow` at the binary boundary (CLI/IO faults that aren't part of the
/// compiler or runtime's own error surface).
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SuoError {
    #[display(fmt = "{_0}")]
    Reader(suo_reader::ReaderError),
    #[display(fmt = "{_0}")]
    Eval(suo_eval::EvalError),
    #[display(fmt = "{_0}")]
    Runtime(suo_runtime::RuntimeError),
    #[display(fmt = "{_0}")]
    Cps(suo_cps::CpsError),
    #[display(fmt = "{_0}")]
    Value(suo_types::ValueError),
    /// A surface form's operator is neither a recognised opcode word nor
    /// `quote`, or a shape the shim otherwise doesn't know how to compile
    /// (malformed parameter list, wrong operand count for an opcode).
    #[display(fmt = "not a valid bootstrap surface form")]
    UnrecognisedSurfaceForm,
    /// A symbol used in value position, or as a `set` target, that no
    /// enclosing `lambda` parameter list binds. The bootstrap surface has
    /// no global environment to fall back to.
    #[display(fmt = "unbound symbol: {_0}")]
    UnboundSurfaceSymbol(String),
    /// An opcode form was given the wrong number of operands for its
    /// fixed arity (`quote`, `set`, `lambda` each expect exactly two
    /// slots after the opcode itself).
    #[display(fmt = "'{op}' expects {expected} operand(s), got {got}")]
    WrongSurfaceArity { op: &'static str, expected: usize, got: usize },
    /// Stdio failed while serving the wire protocol or the REPL.
    #[display(fmt = "io error: {_0}")]
    Io(String),
}

impl std::error::Error for SuoError {}

impl SuoError {
    /// True if this error bottoms out in heap exhaustion, at any nesting
    /// depth (reader, evaluator, and this crate's own shim each wrap
    /// [`suo_runtime::RuntimeError`] differently). Per spec §6, this is the
    /// one error kind the caller must treat as fatal rather than reported
    /// and recovered from.
    pub fn is_heap_exhausted(&self) -> bool {
        use suo_eval::EvalError;
        use suo_reader::ReaderError;
        use suo_runtime::RuntimeError;
        matches!(
            self,
            SuoError::Runtime(RuntimeError::HeapExhausted { .. })
                | SuoError::Reader(ReaderError::Heap(RuntimeError::HeapExhausted { .. }))
                | SuoError::Eval(EvalError::Heap(RuntimeError::HeapExhausted { .. }))
        )
    }
}

impl From<suo_reader::ReaderError> for SuoError {
    fn from(e: suo_reader::ReaderError) -> Self {
        SuoError::Reader(e)
    }
}

impl From<suo_eval::EvalError> for SuoError {
    fn from(e: suo_eval::EvalError) -> Self {
        SuoError::Eval(e)
    }
}

impl From<suo_runtime::RuntimeError> for SuoError {
    fn from(e: suo_runtime::RuntimeError) -> Self {
        SuoError::Runtime(e)
    }
}

impl From<suo_cps::CpsError> for SuoError {
    fn from(e: suo_cps::CpsError) -> Self {
        SuoError::Cps(e)
    }
}

impl From<suo_types::ValueError> for SuoError {
    fn from(e: suo_types::ValueError) -> Self {
        SuoError::Value(e)
    }
}
