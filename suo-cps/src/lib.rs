//! CPS intermediate representation, conversion, free-variable analysis,
//! closure conversion, register allocation, and the code-generation driver
//! (spec §4.6–§4.11).
//!
//! The pipeline, in order: [`source::Expr`] (already macro-expanded
//! mini-source) → [`convert::compile`] → [`analysis::Analysis`] →
//! [`closure::convert_closures`] → [`regalloc::allocate_registers`] →
//! [`codegen::generate`].

pub mod analysis;
pub mod closure;
pub mod codegen;
pub mod convert;
pub mod env;
pub mod error;
pub mod ir;
pub mod regalloc;
pub mod source;
pub mod var;

pub use analysis::Analysis;
pub use convert::{compile, Converter, MetaCont};
pub use error::CpsError;
pub use ir::{Literal, Node, NodeRef, PrimOpKind};
pub use source::{Expr, MacroExpander, NoMacros};
pub use var::{Var, VarGen, VarId};

use std::rc::Rc;

/// Run the whole pipeline over one top-level `:lambda` program, producing
/// code through `C`. Fails only at the spec §7 "Compilation" boundary
/// ([`CpsError::TopFormNotLambda`]); every later pass is total over its
/// predecessor's output.
pub fn compile_to_code<C: codegen::AsmContext>(expr: &Expr, macros: Rc<dyn MacroExpander>) -> Result<C::CodeBlock, CpsError> {
    let converted = compile(expr, macros)?;
    let analysis = Analysis::new();
    let vars = VarGen::new();
    let closure_converted = closure::convert_closures(&converted, &analysis, &vars);
    let allocated = regalloc::allocate_registers(&closure_converted);
    Ok(codegen::generate::<C>(&allocated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{AsmContext, CpsValue};
    use crate::ir::PrimOpKind as PK;

    struct NullCtxt;
    impl AsmContext for NullCtxt {
        type Label = usize;
        type CodeBlock = Vec<String>;
        fn make_context() -> Self {
            NullCtxt
        }
        fn finish(self) -> Vec<String> {
            Vec::new()
        }
        fn make_label(&mut self) -> usize {
            0
        }
        fn def_label(&mut self, _label: &usize) {}
        fn prologue(&mut self, _signature: i32) {}
        fn shuffle(&mut self, _sources: &[CpsValue<usize, Vec<String>>], _destinations: &[usize]) {}
        fn go(&mut self, _reg: usize) {}
        fn primop(&mut self, _kind: PK, _results: &[usize], _args: &[CpsValue<usize, Vec<String>>], _extra_cont_labels: &[usize]) {}
    }

    #[test]
    fn a_non_lambda_top_form_is_rejected() {
        let err = compile_to_code::<NullCtxt>(&Expr::Quote(Literal::Int(1)), Rc::new(NoMacros)).unwrap_err();
        assert_eq!(err, CpsError::TopFormNotLambda);
    }

    #[test]
    fn the_identity_lambda_compiles_end_to_end() {
        let lambda = Expr::Lambda { params: vec!["x".into()], rest: None, body: vec![Expr::Symbol("x".into())] };
        let code = compile_to_code::<NullCtxt>(&lambda, Rc::new(NoMacros)).expect("well-formed program compiles");
        assert!(code.is_empty(), "NullCtxt records nothing, just exercising the pipeline runs to completion");
    }
}
