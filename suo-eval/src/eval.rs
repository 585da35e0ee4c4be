//! The non-recursive bootstrap evaluator (spec §4.5).
//!
//! `eval` drives a labelled `eval_form` / `do_op_step` / `use_value`
//! dispatch entirely through [`crate::control`]'s heap-resident stack and
//! three registered roots (`env`, `payload`, `stack`) — the host call stack
//! never grows with the program's nesting depth.
//!
//! As in [`suo_reader`], every `Word` that must survive a call that can
//! allocate (`alloc_pair`/`alloc_vector`/`alloc_record`/`env::new_frame`) is
//! re-read from its root immediately before use, never carried across such
//! a call as a bare local.

use suo_runtime::{Heap, RootHandle, RuntimeError};
use suo_types::{Opcode, PtrTag, Word};

use crate::{
    control::{self, result_at, results_len},
    env,
    error::EvalError,
    forms::{as_env_ref, as_op, decode_signature, operand, operand_count},
};

enum Mode {
    /// `payload` holds a form to evaluate.
    Eval,
    /// `payload` holds a value to fold into the top control frame.
    Use,
}

/// Evaluate `form` in `env` to a value.
pub fn eval(heap: &mut Heap, form: Word, env: Word) -> Result<Word, EvalError> {
    let env_root = heap.push_root(env);
    let payload_root = heap.push_root(form);
    let stack_root = heap.push_root(Word::nil());
    let mut mode = Mode::Eval;

    let result = loop {
        match mode {
            Mode::Eval => match eval_form(heap, &mut mode, env_root, payload_root, stack_root) {
                Ok(()) => {}
                Err(e) => break Err(e),
            },
            Mode::Use => match use_value(heap, &mut mode, env_root, payload_root, stack_root) {
                Ok(Some(value)) => break Ok(value),
                Ok(None) => {}
                Err(e) => break Err(e),
            },
        }
    };

    heap.pop_root(stack_root);
    heap.pop_root(payload_root);
    heap.pop_root(env_root);
    result
}

#[tracing::instrument(name = "eval_form", skip_all)]
fn eval_form(
    heap: &mut Heap,
    mode: &mut Mode,
    env_root: RootHandle,
    payload_root: RootHandle,
    stack_root: RootHandle,
) -> Result<(), EvalError> {
    let form = heap.root(payload_root);

    if let Some((up, n)) = as_env_ref(heap, form) {
        let value = env::lookup(heap, heap.root(env_root), up, n)?;
        heap.set_root(payload_root, value);
        *mode = Mode::Use;
        return Ok(());
    }

    if !form.is_ptr(PtrTag::Vector) {
        return Err(EvalError::MalformedForm);
    }
    let addr = form.ptr_address().expect("checked above");
    let len = heap.read(addr, 0).header_length().expect("vector header carries its length");
    if len == 0 {
        return Err(EvalError::MalformedForm);
    }
    let op = Opcode::from_word(heap.read(addr, 1)).ok_or(EvalError::UnknownOpcode)?;
    let n_operands = operand_count(len);
    tracing::trace!("opcode: {:?}", op);

    match op {
        Opcode::Quote => {
            require_arity("quote", n_operands, 1)?;
            heap.set_root(payload_root, operand(heap, addr, 0));
            *mode = Mode::Use;
        }
        Opcode::Lambda => {
            require_arity("lambda", n_operands, 2)?;
            let signature = operand(heap, addr, 0);
            let body = operand(heap, addr, 1);
            let closure = make_closure(heap, signature, body, heap.root(env_root))?;
            heap.set_root(payload_root, closure);
            *mode = Mode::Use;
        }
        Opcode::If => {
            require_arity("if", n_operands, 3)?;
            let new_stack = control::push(heap, heap.root(stack_root), form, 1, heap.root(env_root))?;
            heap.set_root(stack_root, new_stack);
            heap.set_root(payload_root, operand(heap, addr, 0));
        }
        Opcode::Set => {
            require_arity("set", n_operands, 2)?;
            let new_stack = control::push(heap, heap.root(stack_root), form, 1, heap.root(env_root))?;
            heap.set_root(stack_root, new_stack);
            heap.set_root(payload_root, operand(heap, addr, 1));
        }
        Opcode::Call => {
            if n_operands < 1 {
                return Err(EvalError::WrongArity { op: "call", expected: 1, got: n_operands });
            }
            let new_stack = control::push(heap, heap.root(stack_root), form, n_operands, heap.root(env_root))?;
            heap.set_root(stack_root, new_stack);
            heap.set_root(payload_root, operand(heap, addr, 0));
        }
        Opcode::Apply => {
            if n_operands < 2 {
                return Err(EvalError::WrongArity { op: "apply", expected: 2, got: n_operands });
            }
            let new_stack = control::push(heap, heap.root(stack_root), form, n_operands, heap.root(env_root))?;
            heap.set_root(stack_root, new_stack);
            heap.set_root(payload_root, operand(heap, addr, 0));
        }
        Opcode::Sum | Opcode::Mul => {
            if n_operands == 0 {
                let identity = if op == Opcode::Sum { 0 } else { 1 };
                heap.set_root(payload_root, Word::small_int(identity).expect("identity fits"));
                *mode = Mode::Use;
                return Ok(());
            }
            let new_stack = control::push(heap, heap.root(stack_root), form, n_operands, heap.root(env_root))?;
            heap.set_root(stack_root, new_stack);
            heap.set_root(payload_root, operand(heap, addr, 0));
        }
    }
    Ok(())
}

/// Returns `Ok(Some(value))` once the control stack is empty (the whole
/// evaluation is done), `Ok(None)` to keep looping.
fn use_value(
    heap: &mut Heap,
    mode: &mut Mode,
    env_root: RootHandle,
    payload_root: RootHandle,
    stack_root: RootHandle,
) -> Result<Option<Word>, EvalError> {
    if heap.root(stack_root).is_nil() {
        return Ok(Some(heap.root(payload_root)));
    }

    let value = heap.root(payload_root);
    let new_pc = control::record_result_and_advance(heap, heap.root(stack_root), value);

    let top = control::pop(heap, heap.root(stack_root));
    // `pop` only reads the top frame and the rest of the stack; it does not
    // mutate anything, so re-fetching it here (after recording the result)
    // is just a cheap re-read, not a second pop.
    let (op, addr, len) = as_op(heap, top.form).expect("control frames only ever hold operation forms");
    let n_operands = operand_count(len);

    let needed = match op {
        Opcode::If | Opcode::Set => 1,
        Opcode::Call | Opcode::Apply | Opcode::Sum | Opcode::Mul => n_operands,
        Opcode::Quote | Opcode::Lambda => unreachable!("never pushed as a control frame"),
    };

    if new_pc < needed {
        heap.set_root(env_root, top.env);
        heap.set_root(payload_root, operand(heap, addr, new_pc));
        *mode = Mode::Eval;
        return Ok(None);
    }

    heap.set_root(stack_root, top.rest);
    heap.set_root(env_root, top.env);

    match op {
        Opcode::If => {
            let cond = result_at(heap, top.results, 0);
            let branch = if cond.is_truthy() { 1 } else { 2 };
            heap.set_root(payload_root, operand(heap, addr, branch));
            *mode = Mode::Eval;
        }
        Opcode::Set => {
            let value = result_at(heap, top.results, 0);
            let (up, n) = as_env_ref(heap, operand(heap, addr, 0)).ok_or(EvalError::MalformedForm)?;
            env::set(heap, top.env, up, n, value)?;
            heap.set_root(payload_root, Word::unspecified());
            *mode = Mode::Use;
        }
        Opcode::Call => {
            let results_root = heap.push_root(top.results);
            let n_args = results_len(heap, heap.root(results_root)) - 1;
            let args_list = build_args_list(heap, results_root, 1, n_args, Word::nil())?;
            let args_list_root = heap.push_root(args_list);
            let fn_value = result_at(heap, heap.root(results_root), 0);
            let (new_env, body) = bind_args_to_closure(heap, fn_value, heap.root(args_list_root), n_args)?;
            heap.pop_root(args_list_root);
            heap.pop_root(results_root);
            heap.set_root(env_root, new_env);
            heap.set_root(payload_root, body);
            *mode = Mode::Eval;
        }
        Opcode::Apply => {
            let results_root = heap.push_root(top.results);
            let k_fixed = n_operands - 2;
            let final_index = 1 + k_fixed;
            let final_list = result_at(heap, heap.root(results_root), final_index);
            let total_args = k_fixed + list_length(heap, final_list)?;
            let args_list = build_args_list(heap, results_root, 1, k_fixed, final_list)?;
            let args_list_root = heap.push_root(args_list);
            let fn_value = result_at(heap, heap.root(results_root), 0);
            let (new_env, body) = bind_args_to_closure(heap, fn_value, heap.root(args_list_root), total_args)?;
            heap.pop_root(args_list_root);
            heap.pop_root(results_root);
            heap.set_root(env_root, new_env);
            heap.set_root(payload_root, body);
            *mode = Mode::Eval;
        }
        Opcode::Sum => {
            let total = fold_arith(heap, top.results, 0, i32::wrapping_add)?;
            heap.set_root(payload_root, total);
            *mode = Mode::Use;
        }
        Opcode::Mul => {
            let total = fold_arith(heap, top.results, 1, i32::wrapping_mul)?;
            heap.set_root(payload_root, total);
            *mode = Mode::Use;
        }
        Opcode::Quote | Opcode::Lambda => unreachable!("never pushed as a control frame"),
    }
    Ok(None)
}

fn require_arity(op: &'static str, got: usize, expected: usize) -> Result<(), EvalError> {
    if got != expected {
        return Err(EvalError::WrongArity { op, expected, got });
    }
    Ok(())
}

fn make_closure(heap: &mut Heap, signature: Word, body: Word, env: Word) -> Result<Word, RuntimeError> {
    let body_root = heap.push_root(body);
    let env_root = heap.push_root(env);
    let code = heap.alloc_pair(signature, heap.root(body_root))?;
    let code_root = heap.push_root(code);
    let closure_type = heap.well_known().closure_type;
    let closure = heap.alloc_record(closure_type, &[heap.root(code_root), heap.root(env_root)]);
    heap.pop_root(code_root);
    heap.pop_root(env_root);
    heap.pop_root(body_root);
    closure
}

/// Cons `results[start..start + count]` (read fresh each iteration from the
/// still-registered `results_root`, so no collection triggered by the
/// `alloc_pair` calls can leave a stale element behind) onto `tail`, right
/// to left. `tail` is nil for `call`'s plain argument list, or `apply`'s
/// already-evaluated final list value for the fixed arguments ahead of it.
fn build_args_list(
    heap: &mut Heap,
    results_root: RootHandle,
    start: usize,
    count: usize,
    tail: Word,
) -> Result<Word, RuntimeError> {
    let acc_root = heap.push_root(tail);
    for i in (0..count).rev() {
        let value = result_at(heap, heap.root(results_root), start + i);
        let new_acc = heap.alloc_pair(value, heap.root(acc_root))?;
        heap.set_root(acc_root, new_acc);
    }
    let result = heap.root(acc_root);
    heap.pop_root(acc_root);
    Ok(result)
}

/// Length of `apply`'s final argument, which must be a proper list.
fn list_length(heap: &Heap, mut list: Word) -> Result<usize, EvalError> {
    let mut n = 0;
    while !list.is_nil() {
        if !list.is_ptr(PtrTag::Pair) {
            return Err(EvalError::ImproperApplyList);
        }
        let addr = list.ptr_address().expect("checked above");
        n += 1;
        list = heap.read(addr, 1);
    }
    Ok(n)
}

/// Bind `args_list` (a proper list of `n_args` values) as `closure`'s
/// parameters, returning the new environment frame and the closure's body
/// form. The only allocating step is the final `env::new_frame` call — the
/// closure/arity checks and the list walk that builds `bindings` are pure
/// reads, so nothing here needs its own rooting beyond what the caller
/// already holds.
fn bind_args_to_closure(heap: &mut Heap, closure: Word, args_list: Word, n_args: usize) -> Result<(Word, Word), EvalError> {
    if !closure.is_ptr(PtrTag::Record) {
        return Err(EvalError::NotAClosure);
    }
    let addr = closure.ptr_address().expect("checked above");
    let descriptor = heap.read(addr, 0).ptr_address();
    if descriptor != Some(heap.well_known().closure_type) {
        return Err(EvalError::NotAClosure);
    }
    let code = heap.read(addr, 1);
    let code_addr = code.ptr_address().ok_or(EvalError::MalformedForm)?;
    let signature = heap.read(code_addr, 0).as_small_int().ok_or(EvalError::MalformedForm)?;
    let body = heap.read(code_addr, 1);
    let captured_env = heap.read(addr, 2);
    let (argc, rest) = decode_signature(signature);

    let mut bindings = Vec::with_capacity(argc + usize::from(rest));
    let mut cursor = args_list;
    for _ in 0..argc.min(n_args) {
        let cursor_addr = cursor.ptr_address().ok_or(EvalError::ArityMismatch { expected: argc, got: n_args })?;
        bindings.push(heap.read(cursor_addr, 0));
        cursor = heap.read(cursor_addr, 1);
    }
    if rest {
        if n_args < argc {
            return Err(EvalError::ArityMismatch { expected: argc, got: n_args });
        }
        bindings.push(cursor);
    } else if n_args != argc {
        return Err(EvalError::ArityMismatch { expected: argc, got: n_args });
    }

    let new_env = env::new_frame(heap, captured_env, &bindings)?;
    Ok((new_env, body))
}

fn fold_arith(heap: &Heap, results: Word, identity: i32, f: fn(i32, i32) -> i32) -> Result<Word, EvalError> {
    let len = results_len(heap, results);
    let mut acc = identity;
    for i in 0..len {
        let n = result_at(heap, results, i).as_small_int().ok_or(EvalError::NotANumber)?;
        acc = f(acc, n);
    }
    Word::small_int(acc).map_err(|_| EvalError::NotANumber)
}

#[cfg(test)]
mod tests {
    use suo_runtime::Config;

    use super::*;
    use crate::forms::{encode_signature, make_env_ref, make_op};

    fn heap() -> Heap {
        Heap::new(Config::default())
    }

    #[test]
    fn quote_returns_its_operand() {
        let mut heap = heap();
        let lit = Word::small_int(42).unwrap();
        let form = make_op(&mut heap, Opcode::Quote, &[lit]).unwrap();
        assert_eq!(eval(&mut heap, form, Word::nil()).unwrap(), lit);
    }

    #[test]
    fn sum_folds_its_evaluated_operands() {
        let mut heap = heap();
        let a = make_op(&mut heap, Opcode::Quote, &[Word::small_int(1).unwrap()]).unwrap();
        let b = make_op(&mut heap, Opcode::Quote, &[Word::small_int(2).unwrap()]).unwrap();
        let c = make_op(&mut heap, Opcode::Quote, &[Word::small_int(3).unwrap()]).unwrap();
        let form = make_op(&mut heap, Opcode::Sum, &[a, b, c]).unwrap();
        let result = eval(&mut heap, form, Word::nil()).unwrap();
        assert_eq!(result.as_small_int(), Some(6));
    }

    #[test]
    fn empty_sum_is_zero_and_empty_mul_is_one() {
        let mut heap = heap();
        let sum_form = make_op(&mut heap, Opcode::Sum, &[]).unwrap();
        assert_eq!(eval(&mut heap, sum_form, Word::nil()).unwrap().as_small_int(), Some(0));
        let mul_form = make_op(&mut heap, Opcode::Mul, &[]).unwrap();
        assert_eq!(eval(&mut heap, mul_form, Word::nil()).unwrap().as_small_int(), Some(1));
    }

    #[test]
    fn if_picks_the_matching_branch() {
        let mut heap = heap();
        let cond = make_op(&mut heap, Opcode::Quote, &[Word::bool_(false)]).unwrap();
        let then_branch = make_op(&mut heap, Opcode::Quote, &[Word::small_int(1).unwrap()]).unwrap();
        let else_branch = make_op(&mut heap, Opcode::Quote, &[Word::small_int(2).unwrap()]).unwrap();
        let form = make_op(&mut heap, Opcode::If, &[cond, then_branch, else_branch]).unwrap();
        let result = eval(&mut heap, form, Word::nil()).unwrap();
        assert_eq!(result.as_small_int(), Some(2));
    }

    #[test]
    fn env_ref_reads_an_outer_binding() {
        let mut heap = heap();
        let outer = env::new_frame(&mut heap, Word::nil(), &[Word::small_int(7).unwrap()]).unwrap();
        let form = make_env_ref(&mut heap, 0, 0).unwrap();
        assert_eq!(eval(&mut heap, form, outer).unwrap().as_small_int(), Some(7));
    }

    #[test]
    fn set_writes_into_the_env_chain_and_returns_unspecified() {
        let mut heap = heap();
        let outer = env::new_frame(&mut heap, Word::nil(), &[Word::small_int(7).unwrap()]).unwrap();
        let envref = make_env_ref(&mut heap, 0, 0).unwrap();
        let new_value = make_op(&mut heap, Opcode::Quote, &[Word::small_int(99).unwrap()]).unwrap();
        let form = make_op(&mut heap, Opcode::Set, &[envref, new_value]).unwrap();
        let result = eval(&mut heap, form, outer).unwrap();
        assert!(result.is_unspecified());
        // `set` mutates `outer`'s binding slot in place — both a direct
        // lookup and a fresh env-ref evaluated against `outer` now see 99.
        assert_eq!(env::lookup(&heap, outer, 0, 0).unwrap().as_small_int(), Some(99));
        let readback = make_env_ref(&mut heap, 0, 0).unwrap();
        assert_eq!(eval(&mut heap, readback, outer).unwrap().as_small_int(), Some(99));
    }

    #[test]
    fn lambda_and_call_apply_the_identity_function() {
        let mut heap = heap();
        // (lambda (x) x) compiled to: signature = 2*1-0 = 2; body = (up=0 . n=0)
        let signature = Word::small_int(encode_signature(1, false)).unwrap();
        let body = make_env_ref(&mut heap, 0, 0).unwrap();
        let lambda_form = make_op(&mut heap, Opcode::Lambda, &[signature, body]).unwrap();
        let arg = make_op(&mut heap, Opcode::Quote, &[Word::small_int(5).unwrap()]).unwrap();
        let call_form = make_op(&mut heap, Opcode::Call, &[lambda_form, arg]).unwrap();
        let result = eval(&mut heap, call_form, Word::nil()).unwrap();
        assert_eq!(result.as_small_int(), Some(5));
    }

    #[test]
    fn apply_spreads_its_final_list_argument() {
        let mut heap = heap();
        // (lambda (x y) (sum x y)) — body sums the two bound params.
        let signature = Word::small_int(encode_signature(2, false)).unwrap();
        let x = make_env_ref(&mut heap, 0, 0).unwrap();
        let y = make_env_ref(&mut heap, 0, 1).unwrap();
        let body = make_op(&mut heap, Opcode::Sum, &[x, y]).unwrap();
        let lambda_form = make_op(&mut heap, Opcode::Lambda, &[signature, body]).unwrap();

        let one = Word::small_int(1).unwrap();
        let two = Word::small_int(2).unwrap();
        let list = heap.alloc_pair(two, Word::nil()).unwrap();
        let list = heap.alloc_pair(one, list).unwrap();
        let list_form = make_op(&mut heap, Opcode::Quote, &[list]).unwrap();

        let apply_form = make_op(&mut heap, Opcode::Apply, &[lambda_form, list_form]).unwrap();
        let result = eval(&mut heap, apply_form, Word::nil()).unwrap();
        assert_eq!(result.as_small_int(), Some(3));
    }

    #[test]
    fn calling_a_non_closure_is_an_error() {
        let mut heap = heap();
        let not_a_fn = make_op(&mut heap, Opcode::Quote, &[Word::small_int(1).unwrap()]).unwrap();
        let call_form = make_op(&mut heap, Opcode::Call, &[not_a_fn]).unwrap();
        assert!(matches!(eval(&mut heap, call_form, Word::nil()), Err(EvalError::NotAClosure)));
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut heap = heap();
        let signature = Word::small_int(encode_signature(2, false)).unwrap();
        let body = make_env_ref(&mut heap, 0, 0).unwrap();
        let lambda_form = make_op(&mut heap, Opcode::Lambda, &[signature, body]).unwrap();
        let arg = make_op(&mut heap, Opcode::Quote, &[Word::small_int(5).unwrap()]).unwrap();
        let call_form = make_op(&mut heap, Opcode::Call, &[lambda_form, arg]).unwrap();
        assert!(matches!(
            eval(&mut heap, call_form, Word::nil()),
            Err(EvalError::ArityMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn applying_an_improper_final_list_is_an_error() {
        let mut heap = heap();
        let signature = Word::small_int(encode_signature(1, false)).unwrap();
        let body = make_env_ref(&mut heap, 0, 0).unwrap();
        let lambda_form = make_op(&mut heap, Opcode::Lambda, &[signature, body]).unwrap();

        let dotted = heap.alloc_pair(Word::small_int(1).unwrap(), Word::small_int(2).unwrap()).unwrap();
        let dotted_form = make_op(&mut heap, Opcode::Quote, &[dotted]).unwrap();

        let apply_form = make_op(&mut heap, Opcode::Apply, &[lambda_form, dotted_form]).unwrap();
        assert!(matches!(eval(&mut heap, apply_form, Word::nil()), Err(EvalError::ImproperApplyList)));
    }

    #[test]
    fn nested_calls_stay_off_the_host_stack() {
        // A deeply right-nested `(sum 1 (sum 1 (sum 1 (... 0))))`-shaped
        // chain built as nested `call`s, deep enough that a recursive
        // evaluator would overflow a typical host stack.
        let mut heap = heap();
        let signature = Word::small_int(encode_signature(1, false)).unwrap();
        let param = make_env_ref(&mut heap, 0, 0).unwrap();
        let one = make_op(&mut heap, Opcode::Quote, &[Word::small_int(1).unwrap()]).unwrap();
        let body = make_op(&mut heap, Opcode::Sum, &[one, param]).unwrap();
        let incr = make_op(&mut heap, Opcode::Lambda, &[signature, body]).unwrap();

        let mut form = make_op(&mut heap, Opcode::Quote, &[Word::small_int(0).unwrap()]).unwrap();
        for _ in 0..5000 {
            form = make_op(&mut heap, Opcode::Call, &[incr, form]).unwrap();
        }
        let result = eval(&mut heap, form, Word::nil()).unwrap();
        assert_eq!(result.as_small_int(), Some(5000));
    }
}
