//! Environment frames: vectors laid out `[parent, reserved, binding0, …]`,
//! so an env-reference `(up . n)` (spec §4.5) climbs `up` parent links and
//! reads slot `n + 2` of the frame it lands on. Slot 1 is reserved rather
//! than assigned a use yet — `DESIGN.md` records why the layout keeps it.

use suo_runtime::Heap;
use suo_types::Word;

use crate::error::EvalError;

/// Build a fresh environment frame: `parent` is the enclosing environment
/// (nil at the top level or a closure's captured environment), `bindings`
/// are the values that fill slots `2..`.
pub fn new_frame(heap: &mut Heap, parent: Word, bindings: &[Word]) -> Result<Word, suo_runtime::RuntimeError> {
    let parent_root = heap.push_root(parent);
    let binding_roots: Vec<_> = bindings.iter().map(|&b| heap.push_root(b)).collect();
    let frame = heap.alloc_vector(2 + bindings.len(), Word::unspecified())?;
    let addr = frame.ptr_address().expect("alloc_vector returns a vector pointer");
    heap.write(addr, 1, heap.root(parent_root));
    for (i, &handle) in binding_roots.iter().enumerate() {
        heap.write(addr, 3 + i, heap.root(handle));
    }
    for &handle in binding_roots.iter().rev() {
        heap.pop_root(handle);
    }
    heap.pop_root(parent_root);
    Ok(frame)
}

fn climb(heap: &Heap, mut env: Word, up: usize) -> Result<usize, EvalError> {
    for _ in 0..up {
        if !env.is_ptr(suo_types::PtrTag::Vector) {
            return Err(EvalError::EnvChainExhausted { up });
        }
        let addr = env.ptr_address().expect("checked above");
        env = heap.read(addr, 1);
    }
    if !env.is_ptr(suo_types::PtrTag::Vector) {
        return Err(EvalError::EnvChainExhausted { up });
    }
    Ok(env.ptr_address().expect("checked above"))
}

/// Resolve `(up . n)` against `env`: climb `up` parent links, then read
/// slot `n + 2` of the frame reached (physical offset `n + 3`, since offset
/// 0 is the vector header and offset 1 is the parent link).
pub fn lookup(heap: &Heap, env: Word, up: usize, n: usize) -> Result<Word, EvalError> {
    let addr = climb(heap, env, up)?;
    Ok(heap.read(addr, 3 + n))
}

/// Write `value` into slot `n + 2` of the frame `up` parent links up from
/// `env` (the effect of a `set` operation).
pub fn set(heap: &mut Heap, env: Word, up: usize, n: usize, value: Word) -> Result<(), EvalError> {
    let addr = climb(heap, env, up)?;
    heap.write(addr, 3 + n, value);
    Ok(())
}
