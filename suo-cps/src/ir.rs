//! The CPS intermediate representation (spec §4.6).
//!
//! Every node is immutable once built and is always held behind an `Rc`, so
//! a node's address doubles as its identity for the memoised analyses in
//! [`crate::analysis`] — two structurally identical `quote 5` nodes built
//! separately are *not* the same node.

use std::rc::Rc;

use crate::var::Var;

pub type NodeRef = Rc<Node>;

/// A self-quoting literal, as produced by the reader (spec §4.3) and
/// embedded directly into a `quote` node rather than re-read from the heap
/// at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Char(char),
    Bool(bool),
    Nil,
    Unspecified,
    Symbol(Rc<str>),
    /// A quoted list/vector of further literals, for `:quote` forms whose
    /// payload is itself structured data rather than an atom.
    List(Vec<Literal>),
}

/// One of the fixed primitive operations a `primop` node can name. Not
/// exhaustive of every primitive the runtime offers — only the ones CPS
/// conversion and closure conversion are specified (§4.7, §4.9) to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimOpKind {
    /// Read through a boxed (`set!`-able) binding's one-field record.
    BoxRef,
    /// Write through a boxed binding's one-field record.
    BoxSet,
    /// Read a top-level binding.
    VarRef,
    /// Write a top-level binding.
    VarSet,
    /// Allocate a fresh vector of a given length.
    VectorMake,
    VectorRef,
    VectorSet,
    /// Allocate a record of a given type with given field values.
    RecordMake,
    RecordRef,
    /// Allocate the one-field record a boxed (`set!`-able) binding lives in,
    /// initialised to the given value (spec §4.7: "each parameter is
    /// immediately boxed").
    BoxMake,
    /// Test whether a value is a record of a given type — two
    /// continuations: true (index 0), false (index 1). Used by closure
    /// conversion's `if-record?` guard (spec §4.9).
    IsRecordType,
    /// Traps; used as the fallback when `error:not-a-closure` is not itself
    /// bound to a closure (spec §4.9).
    Syscall,
    /// Terminates the program; the continuation every top-level `fun` must
    /// eventually reach (spec §4.7, "Top level").
    Bottom,
    Add,
    Mul,
}

impl PrimOpKind {
    /// Number of continuations a primop of this kind takes — every kind but
    /// `IsRecordType` falls straight through to a single continuation.
    pub fn continuation_arity(self) -> usize {
        match self {
            PrimOpKind::IsRecordType => 2,
            _ => 1,
        }
    }
}

#[derive(Debug)]
pub enum Node {
    Var(Rc<Var>),
    Quote(Literal),
    /// Only appears once register allocation (§4.10) has run, replacing
    /// every `Var` reference with its assigned index.
    Reg(usize),
    App {
        func: NodeRef,
        args: Vec<NodeRef>,
        rest: bool,
    },
    Func {
        name: Rc<Var>,
        params: Vec<Rc<Var>>,
        rest: bool,
        body: NodeRef,
    },
    /// Retained for completeness (spec §4.6) even though conversion only
    /// ever introduces `Fun` — nothing in this crate currently builds a
    /// `Fix` node.
    Fix {
        funcs: Vec<NodeRef>,
        body: NodeRef,
    },
    Fun {
        func: NodeRef,
        cont: NodeRef,
    },
    Primop {
        kind: PrimOpKind,
        results: Vec<Rc<Var>>,
        args: Vec<NodeRef>,
        conts: Vec<NodeRef>,
    },
}

pub fn node_id(node: &NodeRef) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

pub fn var_node(v: Rc<Var>) -> NodeRef {
    Rc::new(Node::Var(v))
}
pub fn quote_node(lit: Literal) -> NodeRef {
    Rc::new(Node::Quote(lit))
}
pub fn app_node(func: NodeRef, args: Vec<NodeRef>, rest: bool) -> NodeRef {
    Rc::new(Node::App { func, args, rest })
}
pub fn func_node(name: Rc<Var>, params: Vec<Rc<Var>>, rest: bool, body: NodeRef) -> NodeRef {
    Rc::new(Node::Func { name, params, rest, body })
}
pub fn fun_node(func: NodeRef, cont: NodeRef) -> NodeRef {
    Rc::new(Node::Fun { func, cont })
}
pub fn primop_node(kind: PrimOpKind, results: Vec<Rc<Var>>, args: Vec<NodeRef>, conts: Vec<NodeRef>) -> NodeRef {
    Rc::new(Node::Primop { kind, results, args, conts })
}
