//! Code-generation driver (spec §4.11): walks the closure-converted,
//! register-allocated CPS tree and drives an external assembler context.
//! `AsmContext` is an interface only — no implementation lives in this
//! crate; tests exercise the driver against a small recording test double.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ir::{Literal, Node, NodeRef, PrimOpKind};
use crate::var::VarId;

/// A value the driver can hand an `AsmContext` operation: a register, an
/// embedded literal, a forward-reference label, or — once a `Fun`'s inner
/// func has been generated — the finished code block standing in for its
/// name (spec §4.11: "returns its replacement, a `cps-quote code`
/// introduced for func labels").
pub enum CpsValue<L, B> {
    Reg(usize),
    Literal(Literal),
    Label(L),
    Code(Rc<B>),
}

impl<L: Clone, B> Clone for CpsValue<L, B> {
    fn clone(&self) -> Self {
        match self {
            CpsValue::Reg(r) => CpsValue::Reg(*r),
            CpsValue::Literal(l) => CpsValue::Literal(l.clone()),
            CpsValue::Label(l) => CpsValue::Label(l.clone()),
            CpsValue::Code(b) => CpsValue::Code(b.clone()),
        }
    }
}

/// Pack a lambda's formal-parameter count and rest-flag the same way the
/// bootstrap evaluator does (`suo_eval::forms::encode_signature`) — kept as
/// a small local copy rather than a dependency so this crate and the
/// runtime crate don't need to agree on anything but the encoding itself.
pub fn encode_signature(argc: usize, rest: bool) -> i32 {
    2 * argc as i32 - i32::from(rest)
}

pub trait AsmContext: Sized {
    type Label: Clone;
    type CodeBlock;

    fn make_context() -> Self;
    fn finish(self) -> Self::CodeBlock;
    fn make_label(&mut self) -> Self::Label;
    fn def_label(&mut self, label: &Self::Label);
    fn prologue(&mut self, signature: i32);
    fn shuffle(&mut self, sources: &[CpsValue<Self::Label, Self::CodeBlock>], destinations: &[usize]);
    fn go(&mut self, reg: usize);
    fn primop(&mut self, kind: PrimOpKind, results: &[usize], args: &[CpsValue<Self::Label, Self::CodeBlock>], extra_cont_labels: &[Self::Label]);
}

type Subst<C> = HashMap<VarId, CpsValue<<C as AsmContext>::Label, <C as AsmContext>::CodeBlock>>;

/// Generate code for the whole (closure-converted, register-allocated)
/// program, which must be a `Fun` wrapping the outer function (spec §4.7's
/// "top level" rule). Returns the outer function's code block; wrapping it
/// in a `closure-type` record with an empty captured vector happens when
/// the result is loaded into the runtime heap, outside this crate's scope.
pub fn generate<C: AsmContext>(node: &NodeRef) -> C::CodeBlock {
    let subst = Subst::<C>::new();
    match node.as_ref() {
        Node::Fun { func, .. } => {
            let mut subst = subst;
            gen_fun(func, &mut subst);
            // `gen_fun` threads the generated code through `subst`, keyed
            // by the func's name var; recover it for the top-level result.
            let name_id = match func.as_ref() {
                Node::Func { name, .. } => name.id,
                _ => unreachable!("Fun always wraps a Func"),
            };
            match subst.remove(&name_id) {
                Some(CpsValue::Code(code)) => Rc::try_unwrap(code).unwrap_or_else(|_| panic!("top-level code block has no other owners")),
                _ => unreachable!("gen_fun always binds the func name to its generated code"),
            }
        }
        _ => panic!("a compiled program's top level must be a single Fun wrapping the outer lambda"),
    }
}

fn gen_value<C: AsmContext>(node: &NodeRef, subst: &Subst<C>) -> CpsValue<C::Label, C::CodeBlock> {
    match node.as_ref() {
        Node::Reg(i) => CpsValue::Reg(*i),
        Node::Quote(lit) => CpsValue::Literal(lit.clone()),
        Node::Var(v) => subst.get(&v.id).cloned().unwrap_or_else(|| panic!("var {:?} has no register or code replacement at codegen time", v.id)),
        other => panic!("{other:?} is not a leaf cps-value"),
    }
}

/// Build a fresh context, emit the prologue, recurse on the body, finish —
/// the `Func` case of the driver.
fn gen_func<C: AsmContext>(func: &NodeRef, subst: &Subst<C>) -> C::CodeBlock {
    let (params, rest, body) = match func.as_ref() {
        Node::Func { params, rest, body, .. } => (params, *rest, body),
        _ => panic!("gen_func expects a Func node"),
    };
    let mut ctxt = C::make_context();
    // The first param (register 1) is always present after closure
    // conversion; the signature counts parameters excluding that implicit
    // slot is not how §4.11 defines it — it counts every formal parameter.
    ctxt.prologue(encode_signature(params.len(), rest));
    gen_instr(body, &mut ctxt, subst);
    ctxt.finish()
}

fn gen_instr<C: AsmContext>(node: &NodeRef, ctxt: &mut C, subst: &Subst<C>) {
    match node.as_ref() {
        Node::App { func, args, rest } => {
            let fixed = if *rest { args.len() - 1 } else { args.len() };
            let signature = encode_signature(fixed, *rest);
            let mut sources = vec![CpsValue::Literal(Literal::Int(signature))];
            sources.extend(args.iter().map(|a| gen_value::<C>(a, subst)));
            sources.push(gen_value::<C>(func, subst));
            let n = args.len();
            let destinations: Vec<usize> = (0..=n + 1).collect();
            ctxt.shuffle(&sources, &destinations);
            ctxt.go(n + 1);
        }
        Node::Fun { func, cont } => {
            let mut subst = subst.clone_shallow();
            gen_fun(func, &mut subst);
            gen_instr(cont, ctxt, &subst);
        }
        Node::Primop { kind, results, args, conts } => {
            let arg_vals: Vec<_> = args.iter().map(|a| gen_value::<C>(a, subst)).collect();
            let result_regs = result_registers(results);
            let labels: Vec<C::Label> = (1..conts.len()).map(|_| ctxt.make_label()).collect();
            ctxt.primop(*kind, &result_regs, &arg_vals, &labels);
            if let Some((first, rest)) = conts.split_first() {
                gen_instr(first, ctxt, subst);
                for (cont, label) in rest.iter().zip(&labels) {
                    ctxt.def_label(label);
                    gen_instr(cont, ctxt, subst);
                }
            }
        }
        Node::Func { .. } | Node::Fix { .. } | Node::Var(_) | Node::Quote(_) | Node::Reg(_) => {
            panic!("{node:?} cannot appear as a standalone instruction")
        }
    }
}

/// `fun(func, cont)`'s func half: generate the func's own code and bind its
/// name to `(cps-quote code)`; the caller generates `cont` against that
/// binding afterwards.
fn gen_fun<C: AsmContext>(func: &NodeRef, subst: &mut Subst<C>) {
    let name = match func.as_ref() {
        Node::Func { name, .. } => name.clone(),
        _ => panic!("Fun always wraps a Func"),
    };
    let code = gen_func::<C>(func, subst);
    subst.insert(name.id, CpsValue::Code(Rc::new(code)));
}

/// Registers for a primop's results, read directly off each result `Var`.
/// `regalloc::RegEnv::bind` stamps a var's assigned register onto the var
/// itself at its one binding site, so this is exact regardless of how (or
/// whether) the continuation ends up referencing each result — no need to
/// reconstruct anything from `Reg` nodes downstream.
fn result_registers(results: &[Rc<crate::var::Var>]) -> Vec<usize> {
    results
        .iter()
        .map(|v| v.reg.get().expect("register allocation runs before codegen"))
        .collect()
}

trait CloneShallow {
    fn clone_shallow(&self) -> Self;
}

impl<L: Clone, B> CloneShallow for HashMap<VarId, CpsValue<L, B>> {
    fn clone_shallow(&self) -> Self {
        self.iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{app_node, func_node, fun_node, primop_node as mk_primop};
    use crate::var::VarGen;

    struct RecordingCtxt {
        log: Vec<String>,
        next_label: usize,
    }

    impl AsmContext for RecordingCtxt {
        type Label = usize;
        type CodeBlock = Vec<String>;

        fn make_context() -> Self {
            RecordingCtxt { log: Vec::new(), next_label: 0 }
        }
        fn finish(self) -> Vec<String> {
            self.log
        }
        fn make_label(&mut self) -> usize {
            let l = self.next_label;
            self.next_label += 1;
            l
        }
        fn def_label(&mut self, label: &usize) {
            self.log.push(format!("label{label}:"));
        }
        fn prologue(&mut self, signature: i32) {
            self.log.push(format!("prologue {signature}"));
        }
        fn shuffle(&mut self, sources: &[CpsValue<usize, Vec<String>>], destinations: &[usize]) {
            self.log.push(format!("shuffle {} -> {:?}", sources.len(), destinations));
        }
        fn go(&mut self, reg: usize) {
            self.log.push(format!("go {reg}"));
        }
        fn primop(&mut self, kind: PrimOpKind, results: &[usize], args: &[CpsValue<usize, Vec<String>>], extra_cont_labels: &[usize]) {
            self.log.push(format!("primop {kind:?} results={:?} args={} extra={}", results, args.len(), extra_cont_labels.len()));
        }
    }

    #[test]
    fn a_bare_call_emits_a_prologue_then_a_shuffle_and_go() {
        let vars = VarGen::new();
        let name = vars.fresh("top");
        let body = app_node(Rc::new(Node::Reg(1)), vec![], false);
        let func = func_node(name.clone(), vec![], false, body);
        let cont = mk_primop(PrimOpKind::Bottom, vec![], vec![], vec![]);
        let program = fun_node(func, cont);

        let code = generate::<RecordingCtxt>(&program);
        assert_eq!(code[0], "prologue 0");
        assert!(code[1].starts_with("shuffle"));
        assert_eq!(code[2], "go 1");
    }

    #[test]
    fn a_primop_falls_through_to_its_single_continuation() {
        let vars = VarGen::new();
        let name = vars.fresh("top");
        let result = vars.fresh("r");
        result.reg.set(Some(3));
        let call = app_node(Rc::new(Node::Reg(3)), vec![], false);
        let body = mk_primop(PrimOpKind::Add, vec![result], vec![Rc::new(Node::Reg(1)), Rc::new(Node::Reg(2))], vec![call]);
        let func = func_node(name.clone(), vec![], false, body);
        let cont = mk_primop(PrimOpKind::Bottom, vec![], vec![], vec![]);
        let program = fun_node(func, cont);

        let code = generate::<RecordingCtxt>(&program);
        assert!(code.iter().any(|line| line.starts_with("primop Add")));
        assert!(code.iter().any(|line| line == "go 3"));
    }
}
