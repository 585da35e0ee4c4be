//! Register allocation (spec §4.10): after closure conversion, every var in
//! the tree is either a func parameter or a primop result (the closure-
//! conversion invariant). Each gets a fresh, never-reused register index,
//! contiguous and counted from 1 within its enclosing func — register 0 is
//! reserved, not assigned to any var (spec §4.11 uses it directly, as the
//! signature slot at a call site).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::ir::{app_node, fun_node, func_node, primop_node, Node, NodeRef};
use crate::var::{Var, VarId};

#[derive(Clone)]
struct RegEnv {
    map: Rc<RefCell<HashMap<VarId, usize>>>,
    next: Rc<Cell<usize>>,
}

impl RegEnv {
    fn new_func_scope() -> Self {
        RegEnv { map: Rc::new(RefCell::new(HashMap::new())), next: Rc::new(Cell::new(1)) }
    }

    fn bind(&self, v: &Rc<Var>) -> usize {
        let idx = self.next.get();
        self.next.set(idx + 1);
        self.map.borrow_mut().insert(v.id, idx);
        v.reg.set(Some(idx));
        idx
    }

    fn lookup(&self, id: VarId) -> Option<usize> {
        self.map.borrow().get(&id).copied()
    }
}

pub fn allocate_registers(node: &NodeRef) -> NodeRef {
    alloc(node, &RegEnv::new_func_scope())
}

fn alloc(node: &NodeRef, env: &RegEnv) -> NodeRef {
    match node.as_ref() {
        Node::Var(v) => match env.lookup(v.id) {
            Some(idx) => Rc::new(Node::Reg(idx)),
            // A top-level quoted reference (spec §4.9's closing invariant)
            // or a var this pass has not yet seen bound — left as-is.
            None => node.clone(),
        },
        Node::Quote(_) | Node::Reg(_) => node.clone(),
        Node::App { func, args, rest } => {
            let func = alloc(func, env);
            let args = args.iter().map(|a| alloc(a, env)).collect();
            app_node(func, args, *rest)
        }
        Node::Func { name, params, rest, body } => {
            let inner = RegEnv::new_func_scope();
            for p in params {
                inner.bind(p);
            }
            let body = alloc(body, &inner);
            func_node(name.clone(), params.clone(), *rest, body)
        }
        Node::Fix { funcs, body } => {
            let funcs = funcs.iter().map(|f| alloc(f, env)).collect();
            let body = alloc(body, env);
            Rc::new(Node::Fix { funcs, body })
        }
        Node::Fun { func, cont } => fun_node(alloc(func, env), alloc(cont, env)),
        Node::Primop { kind, results, args, conts } => {
            let args = args.iter().map(|a| alloc(a, env)).collect();
            for r in results {
                env.bind(r);
            }
            let conts = conts.iter().map(|c| alloc(c, env)).collect();
            primop_node(*kind, results.clone(), args, conts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{app_node, func_node, primop_node as mk_primop, var_node, PrimOpKind};
    use crate::var::VarGen;

    #[test]
    fn params_get_contiguous_registers_starting_at_one() {
        let vars = VarGen::new();
        let name = vars.fresh("f");
        let p0 = vars.fresh("a");
        let p1 = vars.fresh("b");
        let body = app_node(var_node(p0.clone()), vec![var_node(p1.clone())], false);
        let func = func_node(name, vec![p0, p1], false, body);

        let allocated = allocate_registers(&func);
        if let Node::Func { body, .. } = allocated.as_ref() {
            if let Node::App { func, args, .. } = body.as_ref() {
                assert!(matches!(func.as_ref(), Node::Reg(1)));
                assert!(matches!(args[0].as_ref(), Node::Reg(2)));
            } else {
                panic!("expected an App body");
            }
        } else {
            panic!("expected a Func");
        }
    }

    #[test]
    fn nested_func_gets_its_own_register_numbering() {
        let vars = VarGen::new();
        let outer_name = vars.fresh("outer");
        let outer_param = vars.fresh("x");
        let inner_name = vars.fresh("inner");
        let inner_param = vars.fresh("y");

        let inner_body = var_node(inner_param.clone());
        let inner_func = func_node(inner_name, vec![inner_param], false, inner_body);
        let outer_cont = mk_primop(PrimOpKind::Bottom, vec![], vec![var_node(outer_param.clone())], vec![]);
        let fun = crate::ir::fun_node(inner_func, outer_cont);
        let outer_func = func_node(outer_name, vec![outer_param], false, fun);

        let allocated = allocate_registers(&outer_func);
        if let Node::Func { body: outer_fun, .. } = allocated.as_ref() {
            if let Node::Fun { func: inner, cont } = outer_fun.as_ref() {
                if let Node::Func { body: inner_body, .. } = inner.as_ref() {
                    assert!(matches!(inner_body.as_ref(), Node::Reg(1)), "inner func starts its own numbering at 1");
                }
                if let Node::Primop { args, .. } = cont.as_ref() {
                    assert!(matches!(args[0].as_ref(), Node::Reg(1)), "outer's own param is also register 1");
                }
            } else {
                panic!("expected a Fun");
            }
        } else {
            panic!("expected a Func");
        }
    }
}
