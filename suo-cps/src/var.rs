//! CPS variables (spec §4.6): each one is introduced in exactly one place
//! and compared by identity, not by name — two vars named `x` in different
//! scopes are unrelated. [`VarGen`] is the single source of fresh ids.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug)]
pub struct Var {
    pub id: VarId,
    pub name: Rc<str>,
    /// Set at construction for a `:lambda` parameter (spec §4.7: "each
    /// parameter is immediately boxed so later `:set` works uniformly"),
    /// cleared for everything else. Closure conversion reads it to decide
    /// whether a reference needs a box-ref primop around it.
    pub boxed: bool,
    /// Set once by `regalloc::RegEnv::bind` at this var's one binding site.
    /// Every occurrence of a var shares the same `Rc<Var>`, so reading this
    /// back from a `results` entry after allocation always sees the
    /// register that binding was actually given, regardless of whether or
    /// where the var is referenced again.
    pub reg: Cell<Option<usize>>,
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Var {}
impl std::hash::Hash for Var {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Fresh-variable source. One per compilation unit; conversion, closure
/// conversion, and register allocation all mint new vars through it so no
/// two ever collide.
#[derive(Default)]
pub struct VarGen {
    next: AtomicUsize,
}

impl VarGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self, name: impl Into<Rc<str>>) -> Rc<Var> {
        self.fresh_with_box(name, false)
    }

    pub fn fresh_boxed(&self, name: impl Into<Rc<str>>) -> Rc<Var> {
        self.fresh_with_box(name, true)
    }

    fn fresh_with_box(&self, name: impl Into<Rc<str>>, boxed: bool) -> Rc<Var> {
        let id = VarId(self.next.fetch_add(1, Ordering::Relaxed));
        Rc::new(Var { id, name: name.into(), boxed, reg: Cell::new(None) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest::proptest! {
        #[test]
        fn fresh_vars_from_one_generator_never_collide(count in 0usize..500) {
            let gen = VarGen::new();
            let ids: HashSet<_> = (0..count).map(|i| gen.fresh(format!("v{i}")).id).collect();
            proptest::prop_assert_eq!(ids.len(), count);
        }
    }
}
