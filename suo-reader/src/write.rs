//! The non-recursive bootstrap writer (spec §4.4).
//!
//! The writer only ever reads already-rooted, already-built values; it
//! never allocates into the heap, so (unlike the reader) its explicit
//! frame stack is a plain native `Vec` — holding a `Word` here across
//! iterations carries none of the GC-root hazard reading does.

use std::fmt::Write as _;

use suo_runtime::Heap;
use suo_types::{PtrTag, Word};

/// Print `value` into `out`, driving an explicit work-item stack instead of
/// recursing once per nested pair/vector/record (spec §9 "Control-flow
/// without recursion").
pub fn write_one(heap: &Heap, value: Word, out: &mut String) {
    let mut stack: Vec<Job> = vec![Job::Value(value)];
    while let Some(job) = stack.pop() {
        match job {
            Job::Raw(s) => out.push_str(s),
            Job::Value(v) => push_value_jobs(heap, v, out, &mut stack),
            Job::ListRest(rest) => push_list_rest_jobs(heap, rest, &mut stack),
        }
    }
}

enum Job {
    Raw(&'static str),
    Value(Word),
    /// The remaining elements of a list whose opening `(` (and matching
    /// closing `)`) have already been queued by the pair that started it.
    ListRest(Word),
}

fn extend_in_order(stack: &mut Vec<Job>, seq: Vec<Job>) {
    stack.extend(seq.into_iter().rev());
}

fn push_value_jobs(heap: &Heap, v: Word, out: &mut String, stack: &mut Vec<Job>) {
    if let Some(n) = v.as_small_int() {
        write!(out, "{n}").unwrap();
        return;
    }
    if let Some(c) = v.as_char() {
        write!(out, "#x{:x}", c as u32).unwrap();
        return;
    }
    if v.is_nil() {
        out.push_str("()");
        return;
    }
    if v.is_unspecified() {
        out.push_str("#unspec");
        return;
    }
    if let Some(b) = v.as_bool() {
        out.push_str(if b { "#t" } else { "#f" });
        return;
    }
    if v.is_ptr(PtrTag::Pair) {
        write_pair(heap, v, stack);
        return;
    }
    if v.is_ptr(PtrTag::Vector) {
        write_vector(heap, v, stack);
        return;
    }
    if v.is_ptr(PtrTag::Record) {
        write_record(heap, v, out, stack);
        return;
    }
    if v.is_ptr(PtrTag::Bytes) {
        let addr = v.ptr_address().expect("bytes pointer always has an address");
        write!(out, "#<bytes {}>", heap.read_bytes(addr).len()).unwrap();
        return;
    }
    out.push_str("#<unprintable>");
}

/// `(a b c)` → `Raw("(")`, `Value(a)`, `ListRest(cdr)`, `Raw(")")`, in that
/// execution order. `ListRest` decides, one cons cell at a time, whether the
/// list continues, ends, or turns improper.
fn write_pair(heap: &Heap, pair: Word, stack: &mut Vec<Job>) {
    let addr = pair.ptr_address().expect("pair pointer always has an address");
    let car = heap.read(addr, 0);
    let cdr = heap.read(addr, 1);
    extend_in_order(stack, vec![Job::Raw("("), Job::Value(car), Job::ListRest(cdr), Job::Raw(")")]);
}

fn push_list_rest_jobs(heap: &Heap, rest: Word, stack: &mut Vec<Job>) {
    if rest.is_nil() {
        return;
    }
    if rest.is_ptr(PtrTag::Pair) {
        let addr = rest.ptr_address().expect("non-nil pair cursor always has an address");
        let car = heap.read(addr, 0);
        let cdr = heap.read(addr, 1);
        extend_in_order(stack, vec![Job::Raw(" "), Job::Value(car), Job::ListRest(cdr)]);
        return;
    }
    extend_in_order(stack, vec![Job::Raw(". "), Job::Value(rest)]);
}

fn write_vector(heap: &Heap, vector: Word, stack: &mut Vec<Job>) {
    let addr = vector.ptr_address().expect("vector pointer always has an address");
    let header = heap.read(addr, 0);
    let len = header.header_length().expect("vector header carries its length");
    let mut seq = Vec::with_capacity(len * 2 + 2);
    seq.push(Job::Raw("["));
    for i in 0..len {
        if i > 0 {
            seq.push(Job::Raw(" "));
        }
        seq.push(Job::Value(heap.read(addr, 1 + i)));
    }
    seq.push(Job::Raw("]"));
    extend_in_order(stack, seq);
}

fn write_record(heap: &Heap, record: Word, out: &mut String, stack: &mut Vec<Job>) {
    let addr = record.ptr_address().expect("record pointer always has an address");
    let descriptor = heap.read(addr, 0);
    let descriptor_addr = descriptor.ptr_address().expect("record header always carries a descriptor address");

    if descriptor_addr == heap.well_known().string_type {
        let bytes_word = heap.read(addr, 1);
        let bytes_addr = bytes_word.ptr_address().expect("string field 0 is a bytes pointer");
        let text = String::from_utf8_lossy(&heap.read_bytes(bytes_addr)).into_owned();
        write_quoted_string(&text, out);
        return;
    }
    if descriptor_addr == heap.well_known().symbol_type {
        let bytes_word = heap.read(addr, 1);
        let bytes_addr = bytes_word.ptr_address().expect("symbol field 0 is a bytes pointer");
        let text = String::from_utf8_lossy(&heap.read_bytes(bytes_addr)).into_owned();
        write_escaped_symbol(&text, out);
        return;
    }

    let fields = heap
        .read(descriptor_addr, 1)
        .as_small_int()
        .expect("descriptor field 0 is always a small integer");
    if fields >= 0 {
        let mut seq = Vec::with_capacity(fields as usize * 2 + 2);
        seq.push(Job::Raw("{"));
        for i in 0..fields as usize {
            if i > 0 {
                seq.push(Job::Raw(" "));
            }
            seq.push(Job::Value(heap.read(addr, 1 + i)));
        }
        seq.push(Job::Raw("}"));
        extend_in_order(stack, seq);
    } else {
        out.push('{');
        let bytes = heap.read_bytes(addr);
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write!(out, "{b:02x}").unwrap();
        }
        out.push('}');
    }
}

fn write_quoted_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c => write!(out, "\\x{:02x}", c as u32).unwrap(),
        }
    }
    out.push('"');
}

fn is_reader_significant(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '\'' | ';' | '"' | '#' | '\\') || c.is_whitespace()
}

fn write_escaped_symbol(text: &str, out: &mut String) {
    for c in text.chars() {
        if is_reader_significant(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use suo_runtime::{Config, Heap};

    use super::*;
    use crate::read::read_one;
    use crate::lexer::Lexer;

    fn read(heap: &mut Heap, source: &str) -> Word {
        let mut lexer = Lexer::new(source);
        read_one(heap, &mut lexer).unwrap().expect("non-empty source reads a value")
    }

    fn round_trip(source: &str) -> String {
        let mut heap = Heap::new(Config::default());
        let value = read(&mut heap, source);
        let mut out = String::new();
        write_one(&heap, value, &mut out);
        out
    }

    #[rstest::rstest]
    #[case("42", "42")]
    #[case("-7", "-7")]
    #[case("#t", "#t")]
    #[case("#f", "#f")]
    #[case("#unspec", "#unspec")]
    #[case("()", "()")]
    fn integers_and_atoms_print_plainly(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(round_trip(source), expected);
    }

    #[test]
    fn proper_list_round_trips() {
        assert_eq!(round_trip("(a b c)"), "(a b c)");
    }

    #[test]
    fn dotted_pair_prints_with_tail_notation() {
        assert_eq!(round_trip("(a b . c)"), "(a b . c)");
        assert_eq!(round_trip("(a . b)"), "(a . b)");
    }

    #[test]
    fn vector_round_trips_bracketed() {
        assert_eq!(round_trip("[1 2 3]"), "[1 2 3]");
    }

    #[test]
    fn string_round_trips_with_escapes() {
        assert_eq!(round_trip("\"ab\\nc\""), "\"ab\\x0ac\"");
        assert_eq!(round_trip("\"plain\""), "\"plain\"");
    }

    #[test]
    fn quote_abbreviation_expands_and_prints_as_a_list() {
        assert_eq!(round_trip("'a"), "(quote a)");
    }

    #[test]
    fn nested_structure_round_trips() {
        assert_eq!(round_trip("(a (b c) [d e])"), "(a (b c) [d e])");
    }

    #[test]
    fn character_prints_as_hex_escape() {
        let mut heap = Heap::new(Config::default());
        let value = read(&mut heap, "#\\a");
        let mut out = String::new();
        write_one(&heap, value, &mut out);
        assert_eq!(out, "#x61");
    }
}
