//! Free / used / bound variable analysis (spec §4.8), memoised per node
//! identity since the IR is immutable once built — a node's `used` set
//! never changes no matter how many times a later pass asks for it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ir::{node_id, Node, NodeRef};
use crate::var::{Var, VarId};

pub type VarSet = Rc<HashSet<VarId>>;

#[derive(Default)]
pub struct Analysis {
    used: RefCell<HashMap<usize, VarSet>>,
    bound: RefCell<HashMap<usize, VarSet>>,
    free: RefCell<HashMap<usize, VarSet>>,
    /// Every `Var` the analysis has ever looked at, keyed by id — lets
    /// [`Analysis::free_vars`] turn a `free` id set back into the `Rc<Var>`
    /// handles closure conversion needs to actually build a capture vector.
    seen: RefCell<HashMap<VarId, Rc<Var>>>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`Analysis::free`], resolved back to `Rc<Var>` handles. Order is
    /// stable within one `Analysis` instance (insertion order into the
    /// backing set) but is not meaningful across separate trees.
    pub fn free_vars(&self, node: &NodeRef) -> Vec<Rc<Var>> {
        let ids = self.free(node);
        let seen = self.seen.borrow();
        ids.iter().map(|id| seen.get(id).cloned().expect("free var was observed during traversal")).collect()
    }

    pub fn used(&self, node: &NodeRef) -> VarSet {
        if let Some(cached) = self.used.borrow().get(&node_id(node)) {
            return cached.clone();
        }
        let result = Rc::new(self.compute_used(node));
        self.used.borrow_mut().insert(node_id(node), result.clone());
        result
    }

    pub fn bound(&self, node: &NodeRef) -> VarSet {
        if let Some(cached) = self.bound.borrow().get(&node_id(node)) {
            return cached.clone();
        }
        let result = Rc::new(self.compute_bound(node));
        self.bound.borrow_mut().insert(node_id(node), result.clone());
        result
    }

    /// `used(node) \ bound(node)` is only a correct free-variable set when
    /// the subtraction is threaded through every nested scope, not just the
    /// outermost one — a var bound by a func three levels down must not
    /// leak into an ancestor's free set. So `free` recurses structurally
    /// (using the *free* set of each child, not its raw `used` set) rather
    /// than computing `used(node) \ bound(node)` from the memoised
    /// top-level `used`/`bound` alone; those two remain available
    /// separately since closure conversion only needs `free`.
    pub fn free(&self, node: &NodeRef) -> VarSet {
        if let Some(cached) = self.free.borrow().get(&node_id(node)) {
            return cached.clone();
        }
        let result = Rc::new(self.compute_free(node));
        self.free.borrow_mut().insert(node_id(node), result.clone());
        result
    }

    fn compute_free(&self, node: &NodeRef) -> HashSet<VarId> {
        match node.as_ref() {
            Node::Var(v) => {
                self.remember(v);
                HashSet::from([v.id])
            }
            Node::Quote(_) | Node::Reg(_) => HashSet::new(),
            Node::App { func, args, .. } => {
                let mut s = (*self.free(func)).clone();
                for a in args {
                    s.extend(self.free(a).iter().copied());
                }
                s
            }
            Node::Func { params, body, .. } => {
                let mut s = (*self.free(body)).clone();
                for p in params {
                    self.remember(p);
                    s.remove(&p.id);
                }
                s
            }
            Node::Fix { funcs, body } => {
                let labels: HashSet<VarId> = funcs
                    .iter()
                    .filter_map(|f| match f.as_ref() {
                        Node::Func { name, .. } => {
                            self.remember(name);
                            Some(name.id)
                        }
                        _ => None,
                    })
                    .collect();
                let mut s = (*self.free(body)).clone();
                for f in funcs {
                    s.extend(self.free(f).iter().copied());
                }
                for l in &labels {
                    s.remove(l);
                }
                s
            }
            Node::Fun { func, cont } => {
                let mut s = (*self.free(func)).clone();
                let mut cont_free = (*self.free(cont)).clone();
                if let Node::Func { name, .. } = func.as_ref() {
                    self.remember(name);
                    cont_free.remove(&name.id);
                }
                s.extend(cont_free);
                s
            }
            Node::Primop { args, conts, results, .. } => {
                let mut s = HashSet::new();
                for a in args {
                    s.extend(self.free(a).iter().copied());
                }
                let mut cont_free = HashSet::new();
                for c in conts {
                    cont_free.extend(self.free(c).iter().copied());
                }
                for r in results {
                    self.remember(r);
                    cont_free.remove(&r.id);
                }
                s.extend(cont_free);
                s
            }
        }
    }

    fn remember(&self, v: &Rc<Var>) {
        self.seen.borrow_mut().entry(v.id).or_insert_with(|| v.clone());
    }

    fn compute_used(&self, node: &NodeRef) -> HashSet<VarId> {
        match node.as_ref() {
            Node::Var(v) => {
                self.remember(v);
                HashSet::from([v.id])
            }
            Node::Quote(_) | Node::Reg(_) => HashSet::new(),
            Node::App { func, args, .. } => {
                let mut s = (*self.used(func)).clone();
                for a in args {
                    s.extend(self.used(a).iter().copied());
                }
                s
            }
            Node::Func { body, .. } => (*self.used(body)).clone(),
            Node::Fix { funcs, body } => {
                let mut s = (*self.used(body)).clone();
                for f in funcs {
                    s.extend(self.used(f).iter().copied());
                }
                s
            }
            Node::Fun { func, cont } => {
                let mut s = (*self.used(func)).clone();
                s.extend(self.used(cont).iter().copied());
                s
            }
            Node::Primop { args, conts, .. } => {
                let mut s = HashSet::new();
                for a in args {
                    s.extend(self.used(a).iter().copied());
                }
                for c in conts {
                    s.extend(self.used(c).iter().copied());
                }
                s
            }
        }
    }

    fn compute_bound(&self, node: &NodeRef) -> HashSet<VarId> {
        match node.as_ref() {
            Node::Var(_) | Node::Quote(_) | Node::Reg(_) | Node::App { .. } => HashSet::new(),
            Node::Func { params, .. } => params.iter().map(|p| { self.remember(p); p.id }).collect(),
            Node::Fix { funcs, .. } => funcs
                .iter()
                .filter_map(|f| match f.as_ref() {
                    Node::Func { name, .. } => {
                        self.remember(name);
                        Some(name.id)
                    }
                    _ => None,
                })
                .collect(),
            Node::Fun { func, .. } => match func.as_ref() {
                Node::Func { name, .. } => {
                    self.remember(name);
                    HashSet::from([name.id])
                }
                _ => HashSet::new(),
            },
            Node::Primop { results, .. } => results.iter().map(|r| { self.remember(r); r.id }).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{app_node, func_node, fun_node, var_node};
    use crate::var::VarGen;

    #[test]
    fn free_vars_exclude_params_but_include_outer_refs() {
        let gen = VarGen::new();
        let outer = gen.fresh("outer");
        let param = gen.fresh_boxed("x");
        let name = gen.fresh("f");

        // (func f (x) (app outer (x)))
        let body = app_node(var_node(outer.clone()), vec![var_node(param.clone())], false);
        let func = func_node(name.clone(), vec![param.clone()], false, body);

        let a = Analysis::new();
        let free = a.free(&func);
        assert!(free.contains(&outer.id));
        assert!(!free.contains(&param.id));
    }

    #[test]
    fn fun_hides_nested_bindings_from_an_outer_scope() {
        let gen = VarGen::new();
        let inner_param = gen.fresh_boxed("y");
        let inner_name = gen.fresh("g");
        let outer_param = gen.fresh_boxed("z");
        let outer_name = gen.fresh("h");

        // inner: (func g (y) (app z (y)))   -- free = {z}
        let inner_body = app_node(var_node(outer_param.clone()), vec![var_node(inner_param.clone())], false);
        let inner_func = func_node(inner_name.clone(), vec![inner_param.clone()], false, inner_body);

        // outer: (func h (z) (fun <inner> (app g ())))
        let cont = app_node(var_node(inner_name.clone()), vec![], false);
        let fun = fun_node(inner_func, cont);
        let outer_func = func_node(outer_name, vec![outer_param.clone()], false, fun);

        let a = Analysis::new();
        let free = a.free(&outer_func);
        // z is outer's own param, must not appear free in outer's own set;
        // g is bound by `fun` inside outer's body and must not leak either.
        assert!(!free.contains(&outer_param.id));
        assert!(!free.contains(&inner_name.id));
    }
}
