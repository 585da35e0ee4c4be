//! Closure conversion (spec §4.9): rewrite every `fun` so its function body
//! takes an explicit leading closure argument, opens its free variables out
//! of a captured vector, and is only ever reachable through a
//! `closure-type` record `(code-block, captured-vector)`; rewrite every
//! `app` to go through that same record.

use std::collections::HashMap;
use std::rc::Rc;

use crate::analysis::Analysis;
use crate::ir::{app_node, func_node, fun_node, primop_node, quote_node, var_node, Literal, Node, NodeRef, PrimOpKind};
use crate::var::{Var, VarId, VarGen};

const CLOSURE_TYPE_NAME: &str = "closure-type";

/// Scoped "replacement" environment: a var that closure conversion has
/// rewritten (a captured free var now reached through a vector-ref, or a
/// func name now reached through its closure record) maps to the
/// replacement expression that stands in for every further reference.
type Subst = HashMap<VarId, NodeRef>;

fn resolve(subst: &Subst, v: &Rc<Var>) -> NodeRef {
    subst.get(&v.id).cloned().unwrap_or_else(|| var_node(v.clone()))
}

pub fn convert_closures(node: &NodeRef, analysis: &Analysis, vars: &VarGen) -> NodeRef {
    rewrite(node, analysis, vars, &Subst::new())
}

fn rewrite(node: &NodeRef, analysis: &Analysis, vars: &VarGen, subst: &Subst) -> NodeRef {
    match node.as_ref() {
        Node::Var(v) => resolve(subst, v),
        Node::Quote(_) | Node::Reg(_) => node.clone(),
        Node::App { func, args, rest } => {
            let callee = rewrite(func, analysis, vars, subst);
            let args: Vec<NodeRef> = args.iter().map(|a| rewrite(a, analysis, vars, subst)).collect();
            call_through_closure(callee, args, *rest, vars)
        }
        Node::Func { .. } => {
            // A bare `Func` only ever appears wrapped in `Fun` (or `Fix`,
            // which this crate never constructs) — reaching one here would
            // mean a func escaped without going through closure conversion.
            unreachable!("Func nodes are only ever rewritten via their enclosing Fun")
        }
        Node::Fix { funcs, body } => {
            // Retained for IR completeness (spec §4.6); nothing in this
            // crate ever builds one, so there is no exercised conversion
            // strategy for mutual recursion here.
            let funcs = funcs.iter().map(|f| rewrite(f, analysis, vars, subst)).collect();
            let body = rewrite(body, analysis, vars, subst);
            Rc::new(Node::Fix { funcs, body })
        }
        Node::Fun { func, cont } => rewrite_fun(func, cont, analysis, vars, subst),
        Node::Primop { kind, results, args, conts } => {
            let args = args.iter().map(|a| rewrite(a, analysis, vars, subst)).collect();
            let conts = conts.iter().map(|c| rewrite(c, analysis, vars, subst)).collect();
            primop_node(*kind, results.clone(), args, conts)
        }
    }
}

fn rewrite_fun(func: &NodeRef, cont: &NodeRef, analysis: &Analysis, vars: &VarGen, subst: &Subst) -> NodeRef {
    let (name, params, rest, body) = match func.as_ref() {
        Node::Func { name, params, rest, body } => (name.clone(), params.clone(), *rest, body.clone()),
        _ => unreachable!("Fun always wraps a Func"),
    };

    let free = analysis.free_vars(func);

    // Step 2: open the closure inside the rewritten body.
    let closure_arg = vars.fresh("closure");
    let captured_vec = vars.fresh("captured");
    let mut body_subst = subst.clone();
    let opened_refs: Vec<Rc<Var>> = free.iter().map(|f| vars.fresh(f.name.clone())).collect();
    for (free_var, replacement) in free.iter().zip(&opened_refs) {
        body_subst.insert(free_var.id, var_node(replacement.clone()));
    }
    let rewritten_body = rewrite(&body, analysis, vars, &body_subst);
    let opened_body = open_captures(&captured_vec, &opened_refs, rewritten_body);
    let with_captured_vec = primop_node(
        PrimOpKind::RecordRef,
        vec![captured_vec],
        vec![var_node(closure_arg.clone()), quote_node(Literal::Int(1))],
        vec![opened_body],
    );

    let mut new_params = vec![closure_arg];
    new_params.extend(params);
    let new_func = func_node(name.clone(), new_params, rest, with_captured_vec);

    // Step 3: in `cont`, build the closure record and rebind `name` to it.
    let closure_var = vars.fresh(format!("{}-closure", name.name));
    let mut cont_subst = subst.clone();
    cont_subst.insert(name.id, var_node(closure_var.clone()));
    let rewritten_cont = rewrite(cont, analysis, vars, &cont_subst);

    let free_values: Vec<NodeRef> = free.iter().map(|f| resolve(subst, f)).collect();
    let captured_var = vars.fresh("capture-vec");
    let record_primop = primop_node(
        PrimOpKind::RecordMake,
        vec![closure_var],
        vec![quote_node(Literal::Symbol(CLOSURE_TYPE_NAME.into())), var_node(name), var_node(captured_var.clone())],
        vec![rewritten_cont],
    );
    let vector_primop = primop_node(PrimOpKind::VectorMake, vec![captured_var], free_values, vec![record_primop]);

    fun_node(new_func, vector_primop)
}

/// Nest a `vector-ref` per free var around `body`, each reading one slot of
/// `captured_vec` into the replacement var that now stands for it.
fn open_captures(captured_vec: &Rc<Var>, opened: &[Rc<Var>], mut body: NodeRef) -> NodeRef {
    for (i, replacement) in opened.iter().enumerate().rev() {
        body = primop_node(
            PrimOpKind::VectorRef,
            vec![replacement.clone()],
            vec![var_node(captured_vec.clone()), quote_node(Literal::Int(i as i32))],
            vec![body],
        );
    }
    body
}

/// `call` is rewritten to fetch the code field out of `callee`'s closure
/// record (guarded by an `if-record?` check on `closure-type`) and prepend
/// the closure itself to the argument list (spec §4.9).
fn call_through_closure(callee: NodeRef, args: Vec<NodeRef>, rest: bool, vars: &VarGen) -> NodeRef {
    let handler_lookup = {
        let handler = vars.fresh("error-handler");
        primop_node(
            PrimOpKind::VarRef,
            vec![handler.clone()],
            vec![quote_node(Literal::Symbol("error:not-a-closure".into()))],
            vec![guarded_call(var_node(handler), vec![callee.clone()], false, vars, trap())],
        )
    };
    guarded_call(callee, args, rest, vars, handler_lookup)
}

fn trap() -> NodeRef {
    primop_node(PrimOpKind::Syscall, vec![], vec![], vec![])
}

/// The `if-record?` guard itself: on success, pull the code field (slot 0)
/// out of `callee` and jump there with `callee` prepended to `args`; on
/// failure, run `on_failure`.
fn guarded_call(callee: NodeRef, args: Vec<NodeRef>, rest: bool, vars: &VarGen, on_failure: NodeRef) -> NodeRef {
    let code = vars.fresh("code");
    let mut full_args = vec![callee.clone()];
    full_args.extend(args);
    let success = primop_node(
        PrimOpKind::RecordRef,
        vec![code.clone()],
        vec![callee.clone(), quote_node(Literal::Int(0))],
        vec![app_node(var_node(code), full_args, rest)],
    );
    primop_node(
        PrimOpKind::IsRecordType,
        vec![],
        vec![callee, quote_node(Literal::Symbol(CLOSURE_TYPE_NAME.into()))],
        vec![success, on_failure],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{app_node, func_node, fun_node, primop_node as mk_primop, quote_node, var_node};

    #[test]
    fn closure_converted_func_gains_a_leading_closure_param() {
        let vars = VarGen::new();
        let outer = vars.fresh("outer");
        let param = vars.fresh_boxed("x");
        let name = vars.fresh("f");

        let body = app_node(var_node(outer.clone()), vec![var_node(param.clone())], false);
        let func = func_node(name.clone(), vec![param], false, body);
        let cont = mk_primop(PrimOpKind::Bottom, vec![], vec![var_node(name.clone())], vec![]);
        let fun = fun_node(func, cont);

        let analysis = Analysis::new();
        let converted = convert_closures(&fun, &analysis, &vars);

        match converted.as_ref() {
            Node::Fun { func, .. } => match func.as_ref() {
                Node::Func { params, .. } => assert_eq!(params.len(), 2, "closure-arg plus the original param"),
                other => panic!("expected a Func, got {other:?}"),
            },
            other => panic!("expected a Fun, got {other:?}"),
        }
    }

    #[test]
    fn calls_are_rewritten_to_go_through_a_record_type_check() {
        let vars = VarGen::new();
        let f = vars.fresh("f");
        let app = app_node(var_node(f), vec![quote_node(Literal::Int(1))], false);

        let analysis = Analysis::new();
        let converted = convert_closures(&app, &analysis, &vars);
        assert!(matches!(converted.as_ref(), Node::Primop { kind: PrimOpKind::IsRecordType, .. }));
    }
}
