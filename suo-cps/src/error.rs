use derive_more::Display;

/// Compile-time errors (spec §7's "Compilation" row: fatal, user-visible).
/// Conversion itself is a total function over well-formed mini-source;
/// these are the shape checks that must hold before a program is trusted
/// to reach it.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum CpsError {
    /// Spec §4.7 "Top level": the whole program must be a `:lambda`.
    #[display(fmt = "top-level form is not a lambda")]
    TopFormNotLambda,
    /// `:set` against a binding that isn't boxed and isn't a top-level
    /// reference — spec §7's "immutable var assigned". No construct in the
    /// current mini-source surface produces such a binding (every bound
    /// name is either a boxed lambda parameter or resolves to `TopLevel`),
    /// so this is currently unreachable; it stays here for the day a
    /// `:fix`-style immutable named binding is added to `source::Expr`.
    #[display(fmt = "'set' target is not a mutable binding")]
    ImmutableVarAssigned { name: String },
}

impl std::error::Error for CpsError {}
