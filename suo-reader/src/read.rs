//! The non-recursive bootstrap reader (spec §4.3).
//!
//! `read_one` drives [`crate::lexer::Lexer`] tokens through an explicit,
//! heap-resident frame stack instead of recursing per nested construct —
//! see [`crate::frame`] for why the stack itself lives in the heap.
//!
//! Throughout this module the frame stack is addressed only via its
//! [`RootHandle`], never through a bare local `Word` carried across a call
//! that might allocate: a collection can run inside any `alloc_*`/`intern`
//! call, and only the registered root is guaranteed to be rewritten when
//! that happens (spec §3.3).

use suo_runtime::{Heap, RootHandle};
use suo_types::{Opcode, Word};

use crate::{
    charnames,
    error::ReaderError,
    frame::{self, FrameKind},
    lexer::{Lexer, SharpBody, Token},
};

/// Read exactly one top-level form from `lexer`.
///
/// Returns `Ok(None)` if only whitespace/comments remained (a clean end of
/// input, not an error). A syntax error inside a construct is still
/// reported as `Err` — per spec §7, callers recover by printing the
/// diagnostic and treating the read as having produced `Word::unspecified()`.
pub fn read_one(heap: &mut Heap, lexer: &mut Lexer<'_>) -> Result<Option<Word>, ReaderError> {
    let outer = heap.alloc_pair(FrameKind::Outer.to_word(), Word::nil())?;
    let stack = heap.alloc_pair(outer, Word::nil())?;
    let root = heap.push_root(stack);

    let result = run(heap, lexer, root);
    heap.pop_root(root);
    result
}

fn run(heap: &mut Heap, lexer: &mut Lexer<'_>, root: RootHandle) -> Result<Option<Word>, ReaderError> {
    loop {
        let token = lexer.next_token()?;
        match token {
            Token::Eof => {
                let (kind, _) = frame::peek(heap, heap.root(root));
                return if matches!(kind, FrameKind::Outer) {
                    Ok(None)
                } else {
                    Err(ReaderError::UnexpectedEof("construct"))
                };
            }
            Token::Open(delim) => {
                let new_kind = match delim {
                    '(' => FrameKind::List,
                    '[' => FrameKind::Vector,
                    '{' => return Err(ReaderError::UnknownSharpToken("{".into())),
                    _ => unreachable!("lexer only opens on ( [ {{"),
                };
                let new_stack = frame::push(heap, heap.root(root), new_kind, Word::nil())?;
                heap.set_root(root, new_stack);
            }
            Token::Close(delim) => {
                if let Some(done) = close_frame(heap, delim, root)? {
                    return Ok(Some(done));
                }
            }
            Token::Quote => {
                let new_stack = frame::push(heap, heap.root(root), FrameKind::Abbrev, Word::nil())?;
                heap.set_root(root, new_stack);
            }
            Token::Dot => {
                let (kind, _) = frame::peek(heap, heap.root(root));
                if !matches!(kind, FrameKind::List) {
                    return Err(ReaderError::UnexpectedEof("list (dot outside a list)"));
                }
                let new_stack = frame::with_kind(heap, heap.root(root), FrameKind::DottedTail);
                heap.set_root(root, new_stack);
            }
            Token::Str(text) => {
                let value = make_string(heap, &text)?;
                if let Some(done) = accumulate(heap, value, root)? {
                    return Ok(Some(done));
                }
            }
            Token::Int(digits) => {
                let n: i64 = digits.parse().expect("lexer already validated the digit run");
                let value = Word::small_int(n as i32)
                    .ok()
                    .filter(|w| i64::from(w.as_small_int().unwrap()) == n)
                    .ok_or_else(|| ReaderError::IntegerOutOfRange(digits.clone()))?;
                if let Some(done) = accumulate(heap, value, root)? {
                    return Ok(Some(done));
                }
            }
            Token::Symbol(name) => {
                let value = heap.intern(&name)?;
                if let Some(done) = accumulate(heap, value, root)? {
                    return Ok(Some(done));
                }
            }
            Token::Sharp(body) => match body {
                SharpBody::OpenParen => {
                    let new_stack = frame::push(heap, heap.root(root), FrameKind::SharpList, Word::nil())?;
                    heap.set_root(root, new_stack);
                }
                SharpBody::OpenBracket => {
                    let new_stack = frame::push(heap, heap.root(root), FrameKind::SharpVector, Word::nil())?;
                    heap.set_root(root, new_stack);
                }
                SharpBody::Char(name) => {
                    let c = charnames::resolve(&name).ok_or_else(|| ReaderError::UnknownCharName(name.clone()))?;
                    let value = Word::char_(c).expect("charnames::resolve only yields valid chars");
                    if let Some(done) = accumulate(heap, value, root)? {
                        return Ok(Some(done));
                    }
                }
                SharpBody::Ident(ident) => {
                    let value =
                        classify_sharp_ident(&ident).ok_or_else(|| ReaderError::UnknownSharpToken(ident.clone()))?;
                    if let Some(done) = accumulate(heap, value, root)? {
                        return Ok(Some(done));
                    }
                }
            },
        }
    }
}

fn classify_sharp_ident(ident: &str) -> Option<Word> {
    match ident {
        "t" => Some(Word::bool_(true)),
        "f" => Some(Word::bool_(false)),
        "unspec" => Some(Word::unspecified()),
        _ => ident.strip_prefix('@').and_then(Opcode::from_name).map(Opcode::to_word),
    }
}

fn make_string(heap: &mut Heap, text: &str) -> Result<Word, ReaderError> {
    let bytes = heap.alloc_bytes(text.as_bytes())?;
    let string_type = heap.well_known().string_type;
    Ok(heap.alloc_record(string_type, &[bytes])?)
}

/// Fold a value into the current top frame. If that frame is `Outer`, the
/// read is complete and the value is returned directly (`Outer` has no
/// closing delimiter to wait for). Otherwise the value is consed onto the
/// frame's accumulated (reversed) element list, or — for `DottedTail` —
/// folded in as the final improper tail.
fn accumulate(heap: &mut Heap, value: Word, root: RootHandle) -> Result<Option<Word>, ReaderError> {
    let value_root = heap.push_root(value);
    let (kind, state) = frame::peek(heap, heap.root(root));
    let outcome = match kind {
        FrameKind::Outer => {
            heap.pop_root(value_root);
            return Ok(Some(value));
        }
        FrameKind::List | FrameKind::Vector | FrameKind::SharpList | FrameKind::SharpVector => {
            let new_state = heap.alloc_pair(heap.root(value_root), state)?;
            Some(frame::with_state(heap, heap.root(root), new_state))
        }
        FrameKind::Abbrev => {
            let quote = heap.intern("quote")?;
            let quote_root = heap.push_root(quote);
            let wrapped = heap.alloc_pair(heap.root(value_root), Word::nil())?;
            let wrapped = heap.alloc_pair(heap.root(quote_root), wrapped)?;
            heap.pop_root(quote_root);
            return finish_abbrev(heap, wrapped, root);
        }
        FrameKind::DottedTail => {
            let folded = unreverse_onto(heap, state, heap.root(value_root))?;
            let new_stack = frame::with_state(heap, heap.root(root), folded);
            Some(frame::with_kind(heap, new_stack, FrameKind::AwaitingCloseAfterDot))
        }
        FrameKind::AwaitingCloseAfterDot => {
            return Err(ReaderError::UnexpectedEof("list (value after dotted tail)"));
        }
    };
    heap.pop_root(value_root);
    if let Some(new_stack) = outcome {
        heap.set_root(root, new_stack);
    }
    Ok(None)
}

/// An `Abbrev` frame finishes the instant its one child value arrives —
/// there is no closing delimiter to wait for, so it pops itself immediately
/// and folds `wrapped` into whatever frame now sits on top.
fn finish_abbrev(heap: &mut Heap, wrapped: Word, root: RootHandle) -> Result<Option<Word>, ReaderError> {
    let wrapped_root = heap.push_root(wrapped);
    let (_, _, rest) = frame::pop(heap, heap.root(root));
    heap.set_root(root, rest);
    let result = accumulate(heap, heap.root(wrapped_root), root);
    heap.pop_root(wrapped_root);
    result
}

/// Close the frame matching `delim`, build its value, and fold it into the
/// new top frame (or return it, if that frame is `Outer`).
fn close_frame(heap: &mut Heap, delim: char, root: RootHandle) -> Result<Option<Word>, ReaderError> {
    let (kind, state, rest) = frame::pop(heap, heap.root(root));
    let expected_open = match kind {
        FrameKind::List | FrameKind::DottedTail | FrameKind::AwaitingCloseAfterDot | FrameKind::SharpList => '(',
        FrameKind::Vector | FrameKind::SharpVector => '[',
        FrameKind::Outer | FrameKind::Abbrev => return Err(ReaderError::UnbalancedDelimiter(delim)),
    };
    if (expected_open == '(' && delim != ')') || (expected_open == '[' && delim != ']') {
        return Err(ReaderError::UnbalancedDelimiter(delim));
    }

    let state_root = heap.push_root(state);
    heap.set_root(root, rest);

    let built = match kind {
        FrameKind::List => unreverse_onto(heap, heap.root(state_root), Word::nil())?,
        FrameKind::AwaitingCloseAfterDot => heap.root(state_root),
        FrameKind::DottedTail => return Err(ReaderError::UnexpectedEof("list (dot with no tail value)")),
        FrameKind::Vector => build_vector(heap, heap.root(state_root))?,
        FrameKind::SharpList => {
            let body = unreverse_onto(heap, heap.root(state_root), Word::nil())?;
            let body_root = heap.push_root(body);
            let fn_sym = heap.intern("fn")?;
            let fn_root = heap.push_root(fn_sym);
            let body_list = heap.alloc_pair(heap.root(body_root), Word::nil())?;
            let form = heap.alloc_pair(Word::nil(), body_list)?;
            let form = heap.alloc_pair(heap.root(fn_root), form)?;
            heap.pop_root(fn_root);
            heap.pop_root(body_root);
            form
        }
        FrameKind::SharpVector => {
            let params = unreverse_onto(heap, heap.root(state_root), Word::nil())?;
            let params_root = heap.push_root(params);
            let fn_sym = heap.intern("fn")?;
            let fn_root = heap.push_root(fn_sym);
            let form = heap.alloc_pair(heap.root(params_root), Word::nil())?;
            let form = heap.alloc_pair(heap.root(fn_root), form)?;
            heap.pop_root(fn_root);
            heap.pop_root(params_root);
            form
        }
        FrameKind::Outer | FrameKind::Abbrev => unreachable!("rejected above"),
    };
    heap.pop_root(state_root);

    let built_root = heap.push_root(built);
    let (top_kind, _) = frame::peek(heap, heap.root(root));
    let result = if matches!(top_kind, FrameKind::Outer) {
        Ok(Some(heap.root(built_root)))
    } else {
        accumulate(heap, heap.root(built_root), root)
    };
    heap.pop_root(built_root);
    result
}

/// Walk a reversed (newest-first) element list, consing each element onto
/// `tail` in the stored order — this un-reverses it back to source order
/// while simultaneously attaching whatever tail (nil for a proper list, a
/// value for a dotted one) the caller supplies.
///
/// `cursor` and `acc` are kept as registered roots throughout and always
/// re-read from their root slot after a call that can allocate (and
/// therefore collect): a plain local copy of a heap pointer does not
/// survive a collection that happens after it was read (spec §3.3).
fn unreverse_onto(heap: &mut Heap, reversed: Word, tail: Word) -> Result<Word, ReaderError> {
    let cursor_root = heap.push_root(reversed);
    let acc_root = heap.push_root(tail);
    loop {
        let cursor = heap.root(cursor_root);
        if cursor.is_nil() {
            break;
        }
        let addr = cursor.ptr_address().expect("non-nil list cursor is always a pair pointer");
        let car = heap.read(addr, 0);
        let cdr = heap.read(addr, 1);
        let car_root = heap.push_root(car);
        let cdr_root = heap.push_root(cdr);
        let new_acc = heap.alloc_pair(heap.root(car_root), heap.root(acc_root))?;
        heap.set_root(acc_root, new_acc);
        heap.set_root(cursor_root, heap.root(cdr_root));
        heap.pop_root(cdr_root);
        heap.pop_root(car_root);
    }
    let result = heap.root(acc_root);
    heap.pop_root(acc_root);
    heap.pop_root(cursor_root);
    Ok(result)
}

fn list_length(heap: &Heap, mut list: Word) -> usize {
    let mut n = 0;
    while !list.is_nil() {
        let addr = list.ptr_address().expect("non-nil list cursor is always a pair pointer");
        n += 1;
        list = heap.read(addr, 1);
    }
    n
}

fn build_vector(heap: &mut Heap, reversed: Word) -> Result<Word, ReaderError> {
    let len = list_length(heap, reversed);
    let reversed_root = heap.push_root(reversed);
    let vec = heap.alloc_vector(len, Word::unspecified())?;
    let vec_addr = vec.ptr_address().expect("alloc_vector returns a vector pointer");
    let mut cursor = heap.root(reversed_root);
    let mut idx = len;
    while !cursor.is_nil() {
        let addr = cursor.ptr_address().expect("non-nil list cursor is always a pair pointer");
        idx -= 1;
        let car = heap.read(addr, 0);
        heap.write(vec_addr, 1 + idx, car);
        cursor = heap.read(addr, 1);
    }
    heap.pop_root(reversed_root);
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use suo_runtime::{Config, Heap};

    use super::*;

    fn read_all(source: &str) -> Vec<Result<Option<Word>, ReaderError>> {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let result = read_one(&mut heap, &mut lexer);
            let done = matches!(result, Ok(None));
            out.push(result);
            if done {
                break;
            }
        }
        out
    }

    fn read_single(source: &str) -> Word {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new(source);
        read_one(&mut heap, &mut lexer).unwrap().expect("source has a value")
    }

    #[test]
    fn reads_small_integer() {
        let w = read_single("42");
        assert_eq!(w.as_small_int(), Some(42));
    }

    #[test]
    fn reads_symbol_as_interned_pointer() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("hello");
        let a = read_one(&mut heap, &mut lexer).unwrap().unwrap();
        let mut lexer2 = Lexer::new("hello");
        let b = read_one(&mut heap, &mut lexer2).unwrap().unwrap();
        assert_eq!(a, b, "interning the same name twice returns the same pointer");
    }

    #[test]
    fn reads_proper_list() {
        let mut heap = Heap::new(Config::default());
        let w = read_single("(a b c)");
        let addr = w.ptr_address().unwrap();
        let car = heap.read(addr, 0);
        let _ = car;
        assert!(w.is_ptr(suo_types::PtrTag::Pair));
    }

    #[test]
    fn dotted_tail_reads_without_final_nil() {
        let w = read_single("(a . b)");
        assert!(w.is_ptr(suo_types::PtrTag::Pair));
    }

    #[test]
    fn empty_input_yields_none() {
        let results = read_all("   ; just a comment\n");
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Ok(None)));
    }

    #[test]
    fn eof_inside_list_is_an_error() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("(a b");
        let err = read_one(&mut heap, &mut lexer).unwrap_err();
        assert!(matches!(err, ReaderError::UnexpectedEof(_)));
    }

    #[test]
    fn unbalanced_close_delimiter_is_an_error() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new(")");
        let err = read_one(&mut heap, &mut lexer).unwrap_err();
        assert!(matches!(err, ReaderError::UnbalancedDelimiter(')')));
    }

    #[test]
    fn mismatched_close_delimiter_is_an_error() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("(a]");
        let err = read_one(&mut heap, &mut lexer).unwrap_err();
        assert!(matches!(err, ReaderError::UnbalancedDelimiter(']')));
    }

    #[test]
    fn overlarge_integer_literal_is_rejected() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("99999999999999");
        let err = read_one(&mut heap, &mut lexer).unwrap_err();
        assert!(matches!(err, ReaderError::IntegerOutOfRange(_)));
    }

    #[test]
    fn unknown_char_name_is_rejected() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("#\\nonexistent-name");
        let err = read_one(&mut heap, &mut lexer).unwrap_err();
        assert!(matches!(err, ReaderError::UnknownCharName(_)));
    }

    #[test]
    fn sharp_list_expands_to_thunk_form() {
        // `#(1 2)` reads as `(fn () (1 2))` (spec §6).
        let mut heap = Heap::new(Config::default());
        let w = read_single("#(1 2)");
        let addr = w.ptr_address().unwrap();
        let head = heap.read(addr, 0);
        assert_eq!(head, heap.intern("fn").unwrap());
    }

    #[test]
    fn opcode_sharp_ident_round_trips_through_opcode_table() {
        let mut heap = Heap::new(Config::default());
        let mut lexer = Lexer::new("#@if");
        let w = read_one(&mut heap, &mut lexer).unwrap().unwrap();
        assert_eq!(suo_types::Opcode::from_word(w), Some(suo_types::Opcode::If));
    }

    proptest::proptest! {
        #[test]
        fn any_small_integer_reads_back_to_itself(v in suo_types::SMALL_INT_MIN..=suo_types::SMALL_INT_MAX) {
            let w = read_single(&v.to_string());
            proptest::prop_assert_eq!(w.as_small_int(), Some(v));
        }
    }
}
