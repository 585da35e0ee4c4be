//! Frame-stack representation for the non-recursive reader (spec §4.3, §9
//! "Control-flow without recursion").
//!
//! Each frame is itself a two-field heap pair `(kind . state)`; the stack of
//! frames is a heap list of such pairs. Keeping the whole thing in the heap
//! (rather than a native `Vec`) means a single root — the list head — covers
//! every value the reader is part-way through building, no matter how
//! deeply nested the construct is.

use suo_runtime::Heap;
use suo_types::Word;

/// The kind of construct a frame is accumulating. Encoded as a small
/// integer in the frame pair's car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The top-level frame: reading stops as soon as one value lands here.
    Outer,
    List,
    Vector,
    /// `'x` — wraps whatever comes next in `(quote x)`.
    Abbrev,
    /// `#(…)` — wraps the accumulated elements in `(fn () (…))`.
    SharpList,
    /// `#[…]` — wraps the accumulated elements in `(fn (…))`.
    SharpVector,
    /// A list frame that has consumed the dot token and is waiting for
    /// exactly one more value, the improper tail.
    DottedTail,
    /// The tail value has been read and folded into the final list value,
    /// held in `state`; only the closing delimiter remains.
    AwaitingCloseAfterDot,
}

const ORDER: [FrameKind; 8] = [
    FrameKind::Outer,
    FrameKind::List,
    FrameKind::Vector,
    FrameKind::Abbrev,
    FrameKind::SharpList,
    FrameKind::SharpVector,
    FrameKind::DottedTail,
    FrameKind::AwaitingCloseAfterDot,
];

impl FrameKind {
    pub fn to_word(self) -> Word {
        let code = ORDER.iter().position(|&k| k == self).expect("self is in ORDER");
        Word::small_int(code as i32).expect("8 kinds fit trivially in a small int")
    }

    pub fn from_word(word: Word) -> FrameKind {
        let code = word.as_small_int().expect("frame kind word is always a small int") as usize;
        ORDER[code]
    }
}

/// Push a new frame `(kind . state)` onto `stack`, returning the new stack
/// head. `state` is typically `Word::nil()` for a freshly-opened construct.
///
/// `stack` is rooted across both allocations: the first (building the
/// frame pair) can itself trigger a collection, which would otherwise
/// invalidate the `stack` argument before the second allocation uses it.
pub fn push(heap: &mut Heap, stack: Word, kind: FrameKind, state: Word) -> Result<Word, suo_runtime::RuntimeError> {
    let stack_root = heap.push_root(stack);
    let frame = heap.alloc_pair(kind.to_word(), state)?;
    let result = heap.alloc_pair(frame, heap.root(stack_root));
    heap.pop_root(stack_root);
    result
}

/// Split `stack` into its top frame `(kind, state)` and the rest of the
/// stack. Panics on an empty stack — reader logic must check emptiness
/// itself since an empty stack after popping Outer is a logic error, not a
/// recoverable syntax error.
pub fn pop(heap: &Heap, stack: Word) -> (FrameKind, Word, Word) {
    let frame_addr = heap.read(
        stack.ptr_address().expect("stack is always a pair or nil, checked by caller"),
        0,
    );
    let rest = heap.read(stack.ptr_address().unwrap(), 1);
    let frame_addr = frame_addr.ptr_address().expect("frame is always a pair");
    let kind = FrameKind::from_word(heap.read(frame_addr, 0));
    let state = heap.read(frame_addr, 1);
    (kind, state, rest)
}

/// Peek the top frame's kind and state without popping.
pub fn peek(heap: &Heap, stack: Word) -> (FrameKind, Word) {
    let frame_addr = heap
        .read(stack.ptr_address().expect("non-empty stack"), 0)
        .ptr_address()
        .expect("frame is always a pair");
    (FrameKind::from_word(heap.read(frame_addr, 0)), heap.read(frame_addr, 1))
}

/// Rewrite the top frame's state in place, keeping its kind and the rest of
/// the stack unchanged.
pub fn with_state(heap: &mut Heap, stack: Word, new_state: Word) -> Word {
    let stack_addr = stack.ptr_address().expect("non-empty stack");
    let frame = heap.read(stack_addr, 0);
    let frame_addr = frame.ptr_address().expect("frame is always a pair");
    heap.write(frame_addr, 1, new_state);
    stack
}

/// Change the top frame's kind in place, keeping its state and the rest of
/// the stack unchanged (used for the dot-token transition).
pub fn with_kind(heap: &mut Heap, stack: Word, new_kind: FrameKind) -> Word {
    let stack_addr = stack.ptr_address().expect("non-empty stack");
    let frame = heap.read(stack_addr, 0);
    let frame_addr = frame.ptr_address().expect("frame is always a pair");
    heap.write(frame_addr, 0, new_kind.to_word());
    stack
}
