//! Concrete encoding of the two post-macroexpansion form shapes spec §4.5
//! names only abstractly: the env-reference pair `(up . n)` and the
//! operation vector `[op arg1 arg2 …]`.
//!
//! Spec §4.11 fixes one concrete encoding already — a lambda's arity and
//! rest-flag packed into a single integer `signature = 2·argc − (1 if rest
//! else 0)` passed to `prologue`. [`encode_signature`]/[`decode_signature`]
//! reuse that same encoding for a `Lambda` operation's parameter-count
//! operand, so the bootstrap evaluator and the code-generation driver agree
//! on what a closure's arity field means.

use suo_runtime::{Heap, RuntimeError};
use suo_types::{Opcode, Word};

/// Build the env-reference pair `(up . n)`.
pub fn make_env_ref(heap: &mut Heap, up: usize, n: usize) -> Result<Word, RuntimeError> {
    let up_word = Word::small_int(up as i32)?;
    let n_word = Word::small_int(n as i32)?;
    heap.alloc_pair(up_word, n_word)
}

/// Decode `form` as an env-reference pair, if it is one — any pair whose
/// car and cdr are both small integers.
pub fn as_env_ref(heap: &Heap, form: Word) -> Option<(usize, usize)> {
    if !form.is_ptr(suo_types::PtrTag::Pair) {
        return None;
    }
    let addr = form.ptr_address()?;
    let up = heap.read(addr, 0).as_small_int()?;
    let n = heap.read(addr, 1).as_small_int()?;
    (up >= 0 && n >= 0).then_some((up as usize, n as usize))
}

/// Build an operation vector `[op operand0 operand1 …]`.
///
/// `operands` may be arbitrary pre-existing heap pointers, not just
/// immediates: each is rooted for the duration of the call, the same way
/// [`suo_runtime::Heap::alloc_pair`] roots `car`/`cdr`, since `alloc_vector`
/// below can itself trigger a collection that would relocate them out from
/// under an unrooted local copy.
pub fn make_op(heap: &mut Heap, op: Opcode, operands: &[Word]) -> Result<Word, RuntimeError> {
    let operand_roots: Vec<_> = operands.iter().map(|&o| heap.push_root(o)).collect();
    let vec = heap.alloc_vector(1 + operands.len(), Word::nil())?;
    let addr = vec.ptr_address().expect("alloc_vector returns a vector pointer");
    heap.write(addr, 1, op.to_word());
    for (i, &handle) in operand_roots.iter().enumerate() {
        heap.write(addr, 2 + i, heap.root(handle));
    }
    for &handle in operand_roots.iter().rev() {
        heap.pop_root(handle);
    }
    Ok(vec)
}

/// Decode `form` as an operation vector, returning its opcode and the
/// address/length needed to read its operands (slots `1..len`, since slot 0
/// is the vector header).
pub fn as_op(heap: &Heap, form: Word) -> Option<(Opcode, usize, usize)> {
    if !form.is_ptr(suo_types::PtrTag::Vector) {
        return None;
    }
    let addr = form.ptr_address()?;
    let len = heap.read(addr, 0).header_length()?;
    if len == 0 {
        return None;
    }
    let op = Opcode::from_word(heap.read(addr, 1))?;
    Some((op, addr, len))
}

/// Read operand `i` (0-based, after the opcode slot) of an operation vector
/// at `addr` with `len` total slots.
pub fn operand(heap: &Heap, addr: usize, i: usize) -> Word {
    heap.read(addr, 2 + i)
}

/// Number of operands (excluding the opcode itself) in an operation vector
/// of total length `len`.
pub fn operand_count(len: usize) -> usize {
    len - 1
}

/// Pack a lambda's formal-parameter count and rest-flag into the signature
/// integer spec §4.11 also uses for `prologue`.
pub fn encode_signature(argc: usize, rest: bool) -> i32 {
    2 * argc as i32 - i32::from(rest)
}

/// Unpack a signature integer back into `(argc, rest)`.
pub fn decode_signature(signature: i32) -> (usize, bool) {
    let rest = signature % 2 != 0;
    let argc = (signature + i32::from(rest)) / 2;
    (argc as usize, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn signature_round_trips(
        #[values(0, 1, 3, 5)] argc: usize,
        #[values(false, true)] rest: bool,
    ) {
        let sig = encode_signature(argc, rest);
        assert_eq!(decode_signature(sig), (argc, rest));
    }

    proptest::proptest! {
        #[test]
        fn signature_round_trips_over_any_argc(argc in 0usize..10_000, rest: bool) {
            let sig = encode_signature(argc, rest);
            proptest::prop_assert_eq!(decode_signature(sig), (argc, rest));
        }
    }
}
