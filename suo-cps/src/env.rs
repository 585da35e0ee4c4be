//! Conversion-time lexical environment: maps a mini-source symbol to
//! whichever of the three binding kinds CPS conversion's symbol case
//! distinguishes (spec §4.7).

use std::rc::Rc;

use crate::var::Var;

#[derive(Clone)]
pub enum Binding {
    /// An ordinary (non-`set!`-able) bound var.
    Plain(Rc<Var>),
    /// A `:lambda` parameter, boxed at binding time.
    Boxed(Rc<Var>),
    /// Not found in any enclosing scope — a top-level reference.
    TopLevel,
}

pub enum Env {
    Empty,
    Frame { name: Rc<str>, binding: Binding, parent: Rc<Env> },
}

impl Env {
    pub fn empty() -> Rc<Env> {
        Rc::new(Env::Empty)
    }

    pub fn extend(self: &Rc<Self>, name: Rc<str>, binding: Binding) -> Rc<Env> {
        Rc::new(Env::Frame { name, binding, parent: self.clone() })
    }

    pub fn lookup(self: &Rc<Self>, name: &str) -> Binding {
        match self.as_ref() {
            Env::Empty => Binding::TopLevel,
            Env::Frame { name: n, binding, parent } => {
                if n.as_ref() == name {
                    binding.clone()
                } else {
                    parent.lookup(name)
                }
            }
        }
    }
}
