//! The mini-source language CPS conversion accepts (spec §4.7). Everything
//! above this layer — `let`, `cond`, `and`/`or`, pattern matching — is
//! assumed already desugared by an external macro layer; [`Expr::Call`]'s
//! head is looked up through [`MacroExpander`] precisely so that layer can
//! still introduce forms this crate has never heard of.

use std::rc::Rc;

use crate::ir::Literal;

#[derive(Debug, Clone)]
pub enum Expr {
    Symbol(Rc<str>),
    Quote(Literal),
    Set { name: Rc<str>, value: Box<Expr> },
    Lambda { params: Vec<Rc<str>>, rest: Option<Rc<str>>, body: Vec<Expr> },
    Begin(Vec<Expr>),
    Primitive { name: Rc<str>, args: Vec<Expr> },
    CallCc { receiver: Box<Expr> },
    CallV { producer: Box<Expr>, consumer: Box<Expr> },
    Apply { func: Box<Expr>, args: Vec<Expr> },
    Bootinfo(Rc<str>),
    Call { func: Box<Expr>, args: Vec<Expr> },
}

/// Hook for expanding a call whose head is not one of the forms conversion
/// recognises natively — "unknown operators in the head of a call are
/// macro-expanded via a lookup hook" (spec §4.7).
pub trait MacroExpander {
    fn expand(&self, head: &str, args: &[Expr]) -> Option<Expr>;
}

/// A macro expander with nothing registered; every unknown head is left as
/// an ordinary call.
pub struct NoMacros;

impl MacroExpander for NoMacros {
    fn expand(&self, _head: &str, _args: &[Expr]) -> Option<Expr> {
        None
    }
}
