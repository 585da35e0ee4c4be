use derive_more::Display;

/// Errors the bootstrap evaluator can raise (spec §4.5, §7).
///
/// These are bugs in the post-macroexpansion program being evaluated, not
/// in the evaluator itself — a well-formed compiler output never produces
/// them, but the bootstrap evaluator is also the thing that runs
/// hand-written test forms, so it checks rather than assumes.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[display(fmt = "env-ref climbs {up} frames past the top of the chain")]
    EnvChainExhausted { up: usize },
    #[display(fmt = "form is neither an env-ref pair nor an operation vector")]
    MalformedForm,
    #[display(fmt = "operation vector has an unrecognised opcode")]
    UnknownOpcode,
    #[display(fmt = "'{op}' expects at least {expected} operand(s), got {got}")]
    WrongArity { op: &'static str, expected: usize, got: usize },
    #[display(fmt = "applied a non-closure value")]
    NotAClosure,
    #[display(fmt = "called a closure with {got} argument(s), expected {expected}")]
    ArityMismatch { expected: usize, got: usize },
    #[display(fmt = "'apply's final argument is not a proper list")]
    ImproperApplyList,
    #[display(fmt = "'sum'/'mul' operand is not a small integer")]
    NotANumber,
    #[display(fmt = "{_0}")]
    Heap(suo_runtime::RuntimeError),
}

impl std::error::Error for EvalError {}

impl From<suo_runtime::RuntimeError> for EvalError {
    fn from(e: suo_runtime::RuntimeError) -> Self {
        EvalError::Heap(e)
    }
}
