//! The evaluator's explicit control stack (spec §4.5).
//!
//! Spec names three slots per frame — saved form, saved result vector,
//! saved program counter — but a form's remaining operands must resume in
//! whatever environment it was being evaluated in, which can differ from
//! the environment the *next* pushed frame evaluates in (e.g. a closure
//! body runs in its captured environment while the call form that invoked
//! it keeps evaluating later siblings, if any, in the caller's). A fourth
//! slot, the saved environment, is the minimal addition that makes "pop and
//! resume" well-defined; `DESIGN.md` records this as a deliberate extension.
//!
//! Frames are heap vectors, and the stack threading them is a heap list —
//! the same heap-resident-stack-with-one-root discipline [`suo_reader`]'s
//! bootstrap reader uses, for the same reason: everything the evaluator is
//! part-way through computing must stay reachable from a GC root no matter
//! how deep the (non-recursive) nesting goes.

use suo_runtime::Heap;
use suo_types::Word;

const SLOT_FORM: usize = 0;
const SLOT_RESULTS: usize = 1;
const SLOT_PC: usize = 2;
const SLOT_ENV: usize = 3;
const FRAME_LEN: usize = 4;

/// Push a new control frame: `form` is the operation being evaluated, sized
/// for `n_operands` results, starting at program counter 0, in `env`.
pub fn push(
    heap: &mut Heap,
    stack: Word,
    form: Word,
    n_operands: usize,
    env: Word,
) -> Result<Word, suo_runtime::RuntimeError> {
    let stack_root = heap.push_root(stack);
    let form_root = heap.push_root(form);
    let env_root = heap.push_root(env);

    let results = heap.alloc_vector(n_operands, Word::unspecified())?;
    let results_root = heap.push_root(results);

    let frame = heap.alloc_vector(FRAME_LEN, Word::nil())?;
    let frame_addr = frame.ptr_address().expect("alloc_vector returns a vector pointer");
    heap.write(frame_addr, 1 + SLOT_FORM, heap.root(form_root));
    heap.write(frame_addr, 1 + SLOT_RESULTS, heap.root(results_root));
    heap.write(frame_addr, 1 + SLOT_PC, Word::small_int(0).expect("0 is a small int"));
    heap.write(frame_addr, 1 + SLOT_ENV, heap.root(env_root));

    let new_stack = heap.alloc_pair(frame, heap.root(stack_root))?;

    heap.pop_root(results_root);
    heap.pop_root(env_root);
    heap.pop_root(form_root);
    heap.pop_root(stack_root);
    Ok(new_stack)
}

/// A snapshot of the top frame's fields, plus the stack with it popped.
pub struct PoppedFrame {
    pub form: Word,
    pub results: Word,
    pub pc: usize,
    pub env: Word,
    pub rest: Word,
}

pub fn pop(heap: &Heap, stack: Word) -> PoppedFrame {
    let stack_addr = stack.ptr_address().expect("control stack is non-empty, checked by caller");
    let frame = heap.read(stack_addr, 0);
    let rest = heap.read(stack_addr, 1);
    let frame_addr = frame.ptr_address().expect("control frame is always a vector");
    PoppedFrame {
        form: heap.read(frame_addr, 1 + SLOT_FORM),
        results: heap.read(frame_addr, 1 + SLOT_RESULTS),
        pc: heap
            .read(frame_addr, 1 + SLOT_PC)
            .as_small_int()
            .expect("pc slot is always a small int") as usize,
        env: heap.read(frame_addr, 1 + SLOT_ENV),
        rest,
    }
}

/// Write `value` into `results[pc]`, advance `pc` by one, and return the new
/// `pc` — callers compare it against `results`' length to decide whether
/// every operand has now been evaluated.
pub fn record_result_and_advance(heap: &mut Heap, stack: Word, value: Word) -> usize {
    let stack_addr = stack.ptr_address().expect("non-empty stack");
    let frame = heap.read(stack_addr, 0);
    let frame_addr = frame.ptr_address().expect("control frame is always a vector");

    let results = heap.read(frame_addr, 1 + SLOT_RESULTS);
    let results_addr = results.ptr_address().expect("results slot is always a vector");
    let pc = heap
        .read(frame_addr, 1 + SLOT_PC)
        .as_small_int()
        .expect("pc slot is always a small int") as usize;
    heap.write(results_addr, 1 + pc, value);

    let new_pc = pc + 1;
    heap.write(frame_addr, 1 + SLOT_PC, Word::small_int(new_pc as i32).expect("pc stays small"));
    new_pc
}

pub fn results_len(heap: &Heap, results: Word) -> usize {
    let addr = results.ptr_address().expect("results is always a vector");
    heap.read(addr, 0).header_length().expect("vector header carries its length")
}

pub fn result_at(heap: &Heap, results: Word, i: usize) -> Word {
    let addr = results.ptr_address().expect("results is always a vector");
    heap.read(addr, 1 + i)
}
