//! CPS conversion (spec §4.7): `conv(exp, env, k)` turns a mini-source
//! expression into a CPS instruction, given the lexical environment and a
//! meta-continuation describing what happens with the expression's value.
//!
//! [`Converter`] is always held behind an `Rc` — continuations synthesised
//! during conversion (`MetaCont::Code`) close over it to keep recursing,
//! and a boxed `dyn Fn` needs an owned, `'static` capture rather than a
//! borrowed `&Converter`.

use std::rc::Rc;

use crate::env::{Binding, Env};
use crate::error::CpsError;
use crate::ir::{app_node, func_node, fun_node, primop_node, quote_node, var_node, Literal, Node, NodeRef, PrimOpKind};
use crate::source::{Expr, MacroExpander};
use crate::var::{Var, VarGen};

/// Entry point: convert a whole program. Spec §4.7 "Top level" requires the
/// source to be a single `:lambda`, converted against a continuation that
/// traps into `(primop 'bottom)` — anything else is a fatal compile error.
pub fn compile(expr: &Expr, macros: Rc<dyn MacroExpander>) -> Result<NodeRef, CpsError> {
    if !matches!(expr, Expr::Lambda { .. }) {
        return Err(CpsError::TopFormNotLambda);
    }
    let conv = Converter::new(macros);
    let bottom = MetaCont::code(|v| primop_node(PrimOpKind::Bottom, vec![], vec![v], vec![]));
    Ok(conv.conv(expr, &Env::empty(), bottom))
}

/// A continuation reified just enough to be called multiple times (a
/// `:primitive`'s several branches all convert against "the current k") but
/// still recognisable when it is exactly "apply this cps value" — the shape
/// the tail-call optimisation below looks for.
#[derive(Clone)]
pub enum MetaCont {
    /// Already a cps value that can be applied directly: `k(v) = app known (v)`.
    Known(NodeRef),
    /// An arbitrary host-level transformation of the produced value.
    Code(Rc<dyn Fn(NodeRef) -> NodeRef>),
}

impl MetaCont {
    pub fn code(f: impl Fn(NodeRef) -> NodeRef + 'static) -> Self {
        MetaCont::Code(Rc::new(f))
    }
}

pub struct Converter {
    vars: VarGen,
    macros: Rc<dyn MacroExpander>,
}

impl Converter {
    pub fn new(macros: Rc<dyn MacroExpander>) -> Rc<Self> {
        Rc::new(Converter { vars: VarGen::new(), macros })
    }

    pub fn var_gen(&self) -> &VarGen {
        &self.vars
    }

    fn apply_cont(&self, k: &MetaCont, value: NodeRef) -> NodeRef {
        match k {
            MetaCont::Known(known) => app_node(known.clone(), vec![value], false),
            MetaCont::Code(f) => f(value),
        }
    }

    /// Turn a meta-continuation into an actual cps value usable as an
    /// `app`'s continuation argument. If calling it on a fresh result var
    /// produces exactly `(app K (result-var))`, `K` is passed straight
    /// through instead of wrapping — the tail-call elimination spec §4.7
    /// calls out explicitly.
    fn reify(&self, k: &MetaCont) -> NodeRef {
        match k {
            MetaCont::Known(known) => known.clone(),
            MetaCont::Code(f) => {
                let result = self.vars.fresh("r");
                let body = f(var_node(result.clone()));
                if let Node::App { func, args, rest: false } = body.as_ref() {
                    if args.len() == 1 {
                        if let Node::Var(v) = args[0].as_ref() {
                            if Rc::ptr_eq(v, &result) {
                                return func.clone();
                            }
                        }
                    }
                }
                let name = self.vars.fresh("k");
                func_node(name, vec![result], false, body)
            }
        }
    }

    pub fn conv(self: &Rc<Self>, exp: &Expr, env: &Rc<Env>, k: MetaCont) -> NodeRef {
        match exp {
            Expr::Symbol(name) => self.conv_symbol(name, env, k),
            Expr::Quote(lit) => self.apply_cont(&k, quote_node(lit.clone())),
            Expr::Set { name, value } => self.conv_set(name, value, env, k),
            Expr::Lambda { params, rest, body } => self.conv_lambda(params, rest.as_deref(), body, env, k),
            Expr::Begin(exprs) => self.conv_begin(exprs, env, k),
            Expr::Primitive { name, args } => self.conv_primitive(name, args, env, k),
            Expr::Call { func, args } => self.conv_call(func, args, env, k, None),
            Expr::Apply { func, args } => self.conv_apply(func, args, env, k),
            Expr::CallCc { receiver } => self.conv_call_cc(receiver, env, k),
            Expr::CallV { producer, consumer } => self.conv_call_v(producer, consumer, env, k),
            Expr::Bootinfo(name) => {
                let result = self.vars.fresh("bootinfo");
                primop_node(
                    PrimOpKind::VarRef,
                    vec![result.clone()],
                    vec![quote_node(Literal::Symbol(name.clone()))],
                    vec![self.apply_cont(&k, var_node(result))],
                )
            }
        }
    }

    fn conv_symbol(self: &Rc<Self>, name: &Rc<str>, env: &Rc<Env>, k: MetaCont) -> NodeRef {
        match env.lookup(name) {
            Binding::Plain(v) => self.apply_cont(&k, var_node(v)),
            Binding::Boxed(v) => {
                let temp = self.vars.fresh(name.clone());
                primop_node(
                    PrimOpKind::BoxRef,
                    vec![temp.clone()],
                    vec![var_node(v)],
                    vec![self.apply_cont(&k, var_node(temp))],
                )
            }
            Binding::TopLevel => {
                let temp = self.vars.fresh(name.clone());
                primop_node(
                    PrimOpKind::VarRef,
                    vec![temp.clone()],
                    vec![quote_node(Literal::Symbol(name.clone()))],
                    vec![self.apply_cont(&k, var_node(temp))],
                )
            }
        }
    }

    fn conv_set(self: &Rc<Self>, name: &Rc<str>, value: &Expr, env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let binding = env.lookup(name);
        let name = name.clone();
        let this = self.clone();
        self.conv(
            value,
            env,
            MetaCont::code(move |val| match &binding {
                Binding::Boxed(v) => primop_node(
                    PrimOpKind::BoxSet,
                    vec![],
                    vec![var_node(v.clone()), val.clone()],
                    vec![this.apply_cont(&k, quote_node(Literal::Unspecified))],
                ),
                Binding::Plain(_) | Binding::TopLevel => primop_node(
                    PrimOpKind::VarSet,
                    vec![],
                    vec![quote_node(Literal::Symbol(name.clone())), val.clone()],
                    vec![this.apply_cont(&k, quote_node(Literal::Unspecified))],
                ),
            }),
        )
    }

    /// `(lambda (p...) . body)`: build a `func` whose parameters are a
    /// fresh continuation var followed by one fresh raw var per parameter;
    /// each raw var is immediately boxed (spec §4.7) before the body runs,
    /// with `pᵢ` bound in the body's environment to the *box*, not the raw
    /// physical parameter — so every reference and every `:set` goes
    /// through `box-ref`/`box-set` uniformly. The body's own continuation is
    /// just "apply the func's continuation parameter" — `MetaCont::Known` of it.
    fn conv_lambda(self: &Rc<Self>, params: &[Rc<str>], rest: Option<&str>, body: &[Expr], env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let cont_param = self.vars.fresh("cont-arg");
        let raw_params: Vec<Rc<Var>> = params.iter().map(|p| self.vars.fresh(p.clone())).collect();
        let rest_raw = rest.map(|r| self.vars.fresh(r));
        let boxed_params: Vec<Rc<Var>> = raw_params.iter().map(|p| self.vars.fresh_boxed(p.name.clone())).collect();
        let rest_boxed = rest_raw.as_ref().map(|r| self.vars.fresh_boxed(r.name.clone()));

        let mut body_env = env.clone();
        for (name, boxed) in params.iter().zip(&boxed_params) {
            body_env = body_env.extend(name.clone(), Binding::Boxed(boxed.clone()));
        }
        if let (Some(r), Some(boxed)) = (rest, &rest_boxed) {
            body_env = body_env.extend(r.into(), Binding::Boxed(boxed.clone()));
        }

        let body_k = MetaCont::Known(var_node(cont_param.clone()));
        let converted_body = self.conv_begin(body, &body_env, body_k);
        let boxed_body = self.box_params(&raw_params, &boxed_params, rest_raw.as_ref().zip(rest_boxed.as_ref()), converted_body);

        let mut physical_params = vec![cont_param];
        physical_params.extend(raw_params);
        if let Some(r) = rest_raw {
            physical_params.push(r);
        }

        let name = self.vars.fresh("lambda");
        let func = func_node(name.clone(), physical_params, rest.is_some(), boxed_body);
        let cont = self.apply_cont(&k, var_node(name));
        fun_node(func, cont)
    }

    /// Wrap `body` in one `box-make` per parameter, each initialised from
    /// the raw physical parameter and bound to the matching pre-minted
    /// boxed var that `body`'s own conversion already refers to.
    fn box_params(&self, raw: &[Rc<Var>], boxed: &[Rc<Var>], rest: Option<(&Rc<Var>, &Rc<Var>)>, mut body: NodeRef) -> NodeRef {
        let mut pairs: Vec<(&Rc<Var>, &Rc<Var>)> = raw.iter().zip(boxed).collect();
        if let Some(r) = rest {
            pairs.push(r);
        }
        for (raw_var, box_var) in pairs.into_iter().rev() {
            body = primop_node(PrimOpKind::BoxMake, vec![box_var.clone()], vec![var_node(raw_var.clone())], vec![body]);
        }
        body
    }

    fn conv_begin(self: &Rc<Self>, exprs: &[Expr], env: &Rc<Env>, k: MetaCont) -> NodeRef {
        match exprs {
            [] => self.apply_cont(&k, quote_node(Literal::Unspecified)),
            [last] => self.conv(last, env, k),
            [first, rest @ ..] => {
                let this = self.clone();
                let env = env.clone();
                let rest = rest.to_vec();
                self.conv(first, &env, MetaCont::code(move |_discarded| this.conv_begin(&rest, &env, k.clone())))
            }
        }
    }

    /// Ordinary call: evaluate args left-to-right, then the function
    /// position, synthesise a continuation from `k`, and emit `app`.
    /// `extra_tail` is `Some` final pre-built argument list for `:apply`.
    fn conv_call(self: &Rc<Self>, func: &Expr, args: &[Expr], env: &Rc<Env>, k: MetaCont, extra_tail: Option<NodeRef>) -> NodeRef {
        if let Expr::Symbol(head) = func {
            if matches!(env.lookup(head), Binding::TopLevel) {
                if let Some(expanded) = self.macros.expand(head, args) {
                    return self.conv(&expanded, env, k);
                }
            }
        }
        let this = self.clone();
        let func = func.clone();
        let env2 = env.clone();
        let done: Rc<dyn Fn(Vec<NodeRef>) -> NodeRef> = Rc::new(move |arg_vals| {
            let this2 = this.clone();
            let k2 = k.clone();
            let extra_tail2 = extra_tail.clone();
            this.conv(
                &func,
                &env2,
                MetaCont::code(move |fn_val| {
                    let cont_val = this2.reify(&k2);
                    let mut all_args = vec![cont_val];
                    all_args.extend(arg_vals.clone());
                    if let Some(tail) = &extra_tail2 {
                        all_args.push(tail.clone());
                    }
                    app_node(fn_val, all_args, extra_tail2.is_some())
                }),
            )
        });
        self.conv_args(args, env, Vec::new(), done)
    }

    /// Thread conversion through `args` left-to-right, collecting their cps
    /// values before invoking `done` with the completed list. `done` is a
    /// shared, re-invokable callback rather than a bare `impl Fn` because
    /// each recursive step would otherwise need to name the type of "a
    /// reference to the previous step's closure", which never bottoms out.
    fn conv_args(self: &Rc<Self>, args: &[Expr], env: &Rc<Env>, acc: Vec<NodeRef>, done: Rc<dyn Fn(Vec<NodeRef>) -> NodeRef>) -> NodeRef {
        match args {
            [] => done(acc),
            [first, rest @ ..] => {
                let this = self.clone();
                let env = env.clone();
                let rest = rest.to_vec();
                self.conv(first, &env, MetaCont::code(move |val| {
                    let mut acc = acc.clone();
                    acc.push(val);
                    this.conv_args(&rest, &env, acc, done.clone())
                }))
            }
        }
    }

    fn conv_apply(self: &Rc<Self>, func: &Expr, args: &[Expr], env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let (fixed, last) = args.split_at(args.len().saturating_sub(1));
        let last_expr = last.first().cloned().unwrap_or(Expr::Quote(Literal::Nil));
        let fixed = fixed.to_vec();
        let this = self.clone();
        let func = func.clone();
        let env2 = env.clone();
        self.conv(&last_expr, env, MetaCont::code(move |list_val| this.conv_call(&func, &fixed, &env2, k.clone(), Some(list_val))))
    }

    /// `:call/cc`: synthesise the current continuation as an ordinary cps
    /// function value (one that ignores what its own continuation-argument
    /// would have been and applies `k` to its result instead) and pass it
    /// as `receiver`'s sole argument.
    fn conv_call_cc(self: &Rc<Self>, receiver: &Expr, env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let this = self.clone();
        self.conv(
            receiver,
            env,
            MetaCont::code(move |fn_val| {
                let cc_cont = this.vars.fresh("cont-arg");
                let cc_result = this.vars.fresh("cc-result");
                let cc_name = this.vars.fresh("call-cc-k");
                let applied = this.apply_cont(&k, var_node(cc_result.clone()));
                let cc_func = func_node(cc_name.clone(), vec![cc_cont, cc_result], false, applied);
                fun_node(cc_func, app_node(fn_val, vec![this.reify(&k), var_node(cc_name)], false))
            }),
        )
    }

    /// `:call/v`: run `producer`, then invoke `consumer` with whatever
    /// value it hands to its own continuation — modelled here as exactly
    /// one value, since the bootstrap language has no multiple-value
    /// return.
    fn conv_call_v(self: &Rc<Self>, producer: &Expr, consumer: &Expr, env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let this = self.clone();
        let consumer = consumer.clone();
        let env2 = env.clone();
        self.conv(
            producer,
            env,
            MetaCont::code(move |produced| {
                let this2 = this.clone();
                let k2 = k.clone();
                let produced2 = produced.clone();
                this.conv(
                    &consumer,
                    &env2,
                    MetaCont::code(move |consumer_fn| {
                        let cont_val = this2.reify(&k2);
                        app_node(consumer_fn.clone(), vec![cont_val, produced2.clone()], false)
                    }),
                )
            }),
        )
    }

    /// `:primitive`: evaluate args, then emit a `primop` whose continuations
    /// are each a fresh sub-conversion of the corresponding branch using the
    /// *same* `k` (spec §4.7 — "each is a sub-conversion using the current
    /// k"), so every branch independently decides what becomes of the
    /// primitive's result.
    fn conv_primitive(self: &Rc<Self>, name: &Rc<str>, args: &[Expr], env: &Rc<Env>, k: MetaCont) -> NodeRef {
        let (kind, branches) = primop_kind(name);
        let this = self.clone();
        let name = name.clone();
        let done: Rc<dyn Fn(Vec<NodeRef>) -> NodeRef> = Rc::new(move |arg_vals| {
            let results: Vec<Rc<Var>> = (0..kind.result_count()).map(|i| this.vars.fresh(format!("{name}-r{i}"))).collect();
            let result_values: Vec<NodeRef> = results.iter().map(|r| var_node(r.clone())).collect();
            let conts: Vec<NodeRef> = (0..branches)
                .map(|_| match result_values.as_slice() {
                    [one] => this.apply_cont(&k, one.clone()),
                    _ => this.apply_cont(&k, quote_node(Literal::Unspecified)),
                })
                .collect();
            primop_node(kind, results, arg_vals, conts)
        });
        self.conv_args(args, env, Vec::new(), done)
    }
}

impl PrimOpKind {
    fn result_count(self) -> usize {
        match self {
            PrimOpKind::VarSet | PrimOpKind::BoxSet | PrimOpKind::VectorSet | PrimOpKind::Syscall | PrimOpKind::Bottom | PrimOpKind::IsRecordType => 0,
            _ => 1,
        }
    }
}

fn primop_kind(name: &str) -> (PrimOpKind, usize) {
    let kind = match name {
        "vector-make" => PrimOpKind::VectorMake,
        "vector-ref" => PrimOpKind::VectorRef,
        "vector-set!" => PrimOpKind::VectorSet,
        "record-make" => PrimOpKind::RecordMake,
        "record-ref" => PrimOpKind::RecordRef,
        "record-type?" => PrimOpKind::IsRecordType,
        "syscall" => PrimOpKind::Syscall,
        "bottom" => PrimOpKind::Bottom,
        "add" => PrimOpKind::Add,
        "mul" => PrimOpKind::Mul,
        _ => PrimOpKind::Syscall,
    };
    (kind, kind.continuation_arity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::ir::node_id;
    use crate::source::NoMacros;

    fn top_k() -> MetaCont {
        MetaCont::code(|v| crate::ir::primop_node(PrimOpKind::Bottom, vec![], vec![v], vec![]))
    }

    #[rstest::rstest]
    #[case(Literal::Int(42))]
    #[case(Literal::Bool(true))]
    #[case(Literal::Nil)]
    #[case(Literal::Unspecified)]
    fn quote_passes_the_literal_straight_to_k(#[case] lit: Literal) {
        let conv = Converter::new(Rc::new(NoMacros));
        let node = conv.conv(&Expr::Quote(lit.clone()), &Env::empty(), top_k());
        match node.as_ref() {
            Node::Primop { kind: PrimOpKind::Bottom, args, .. } => {
                assert!(matches!(args[0].as_ref(), Node::Quote(l) if *l == lit));
            }
            other => panic!("expected a bottom primop, got {other:?}"),
        }
    }

    #[test]
    fn lambda_produces_a_fun_wrapping_a_func() {
        let conv = Converter::new(Rc::new(NoMacros));
        let lambda = Expr::Lambda { params: vec!["x".into()], rest: None, body: vec![Expr::Symbol("x".into())] };
        let node = conv.conv(&lambda, &Env::empty(), top_k());
        assert!(matches!(node.as_ref(), Node::Fun { .. }));
        if let Node::Fun { func, .. } = node.as_ref() {
            assert!(matches!(func.as_ref(), Node::Func { .. }));
        }
    }

    #[test]
    fn begin_of_two_exprs_discards_the_first_value() {
        let conv = Converter::new(Rc::new(NoMacros));
        let begin = Expr::Begin(vec![Expr::Quote(Literal::Int(1)), Expr::Quote(Literal::Int(2))]);
        let node = conv.conv(&begin, &Env::empty(), top_k());
        // the second literal reaches k; the first is evaluated only for effect.
        match node.as_ref() {
            Node::Primop { kind: PrimOpKind::Bottom, args, .. } => {
                assert!(matches!(args[0].as_ref(), Node::Quote(Literal::Int(2))));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn node_identity_distinguishes_separately_built_equal_literals() {
        let a = quote_node(Literal::Int(1));
        let b = quote_node(Literal::Int(1));
        assert_ne!(node_id(&a), node_id(&b));
    }
}
