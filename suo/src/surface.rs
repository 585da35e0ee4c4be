//! Bridges the bootstrap reader's pair-list surface syntax (`#@if`,
//! `#@sum`, `'x`, …) into the evaluator's opcode-vector input (spec §6's
//! REPL surface, exercised by §8's end-to-end scenarios).
//!
//! This is not part of the CPS compiler. It is a small, purely lexical
//! translation that lets the eight hand-written opcodes be driven
//! interactively, the way the demo scenarios are phrased — a named
//! parameter list instead of raw `(up . n)` pairs, and reader-quote sugar
//! instead of an explicit `quote` opcode everywhere.

use suo_eval::{encode_signature, make_env_ref, make_op};
use suo_runtime::Heap;
use suo_types::{Opcode, PtrTag, Word};

use crate::error::SuoError;

/// A stack of named-parameter frames, innermost last. Resolves a name to
/// the same `(up, n)` coordinates [`suo_eval::env`] uses, so a name
/// resolved here and looked up at evaluation time always agree, as long
/// as every `Lambda` form pushes exactly one frame here for the one
/// environment frame its application allocates.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<Vec<String>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, name: &str) -> Option<(usize, usize)> {
        for (up, frame) in self.frames.iter().rev().enumerate() {
            if let Some(n) = frame.iter().position(|p| p == name) {
                return Some((up, n));
            }
        }
        None
    }

    fn push(&mut self, names: Vec<String>) {
        self.frames.push(names);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }
}

/// Compile one surface form, read by [`suo_reader::read_one`], into the
/// form [`suo_eval::eval`] consumes.
pub fn compile_form(heap: &mut Heap, value: Word, scope: &mut Scope) -> Result<Word, SuoError> {
    if let Some(name) = symbol_name(heap, value) {
        let (up, n) = scope.resolve(&name).ok_or_else(|| SuoError::UnboundSurfaceSymbol(name.clone()))?;
        return Ok(make_env_ref(heap, up, n)?);
    }
    if value.is_ptr(PtrTag::Pair) {
        return compile_pair(heap, value, scope);
    }
    // Self-evaluating: small int, char, bool, nil, unspecified, string
    // record, or vector literal data.
    Ok(make_op(heap, Opcode::Quote, &[value])?)
}

fn compile_pair(heap: &mut Heap, value: Word, scope: &mut Scope) -> Result<Word, SuoError> {
    let items = read_list(heap, value)?;
    let Some((head, operands)) = items.split_first() else {
        return Err(SuoError::UnrecognisedSurfaceForm);
    };
    if let Some(op) = Opcode::from_word(*head) {
        return compile_op(heap, op, operands, scope);
    }
    // Reader quote sugar `'x` reads as `(quote x)`, the symbol `quote`
    // headed pair — distinct from the `#@quote` opcode. Treated the same
    // way: the one operand is data, never evaluated.
    if symbol_name(heap, *head).as_deref() == Some("quote") {
        let [datum] = require_operands(operands, "quote")?;
        return Ok(make_op(heap, Opcode::Quote, &[datum])?);
    }
    Err(SuoError::UnrecognisedSurfaceForm)
}

fn compile_op(heap: &mut Heap, op: Opcode, operands: &[Word], scope: &mut Scope) -> Result<Word, SuoError> {
    match op {
        Opcode::Quote => {
            let [datum] = require_operands(operands, "quote")?;
            Ok(make_op(heap, Opcode::Quote, &[datum])?)
        }
        Opcode::Lambda => {
            let [params, body] = require_operands(operands, "lambda")?;
            let (names, rest) = parse_param_list(heap, params)?;
            let signature = Word::small_int(encode_signature(names.len(), rest.is_some()))?;
            let mut frame = names;
            if let Some(r) = rest {
                frame.push(r);
            }
            scope.push(frame);
            let compiled_body = compile_form(heap, body, scope);
            scope.pop();
            Ok(make_op(heap, Opcode::Lambda, &[signature, compiled_body?])?)
        }
        Opcode::Set => {
            let [target, value] = require_operands(operands, "set")?;
            let name = symbol_name(heap, target).ok_or(SuoError::UnrecognisedSurfaceForm)?;
            let (up, n) = scope.resolve(&name).ok_or_else(|| SuoError::UnboundSurfaceSymbol(name.clone()))?;
            let env_ref = make_env_ref(heap, up, n)?;
            let env_ref_root = heap.push_root(env_ref);
            let compiled_value = compile_form(heap, value, scope);
            let result = compiled_value.map(|v| (heap.root(env_ref_root), v));
            heap.pop_root(env_ref_root);
            let (env_ref, compiled_value) = result?;
            Ok(make_op(heap, Opcode::Set, &[env_ref, compiled_value])?)
        }
        Opcode::If | Opcode::Call | Opcode::Apply | Opcode::Sum | Opcode::Mul => {
            let compiled = compile_operands(heap, operands, scope)?;
            Ok(make_op(heap, op, &compiled)?)
        }
    }
}

/// Compile every operand left to right, rooting each compiled result as
/// it's produced — a later operand's own `make_op`/`make_env_ref` call can
/// allocate and move everything not registered as a root. Keeps the root
/// stack balanced on the error path too, since a surface compile error is
/// recoverable (the REPL reports it and reads the next form).
fn compile_operands(heap: &mut Heap, operands: &[Word], scope: &mut Scope) -> Result<Vec<Word>, SuoError> {
    let mut roots = Vec::with_capacity(operands.len());
    let mut failure = None;
    for &operand in operands {
        match compile_form(heap, operand, scope) {
            Ok(compiled) => roots.push(heap.push_root(compiled)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let values = failure.is_none().then(|| roots.iter().map(|&r| heap.root(r)).collect::<Vec<Word>>());
    for &r in roots.iter().rev() {
        heap.pop_root(r);
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(values.expect("no failure recorded, so every operand was rooted above")),
    }
}

fn require_operands<const N: usize>(operands: &[Word], op: &'static str) -> Result<[Word; N], SuoError> {
    let got = operands.len();
    operands.try_into().map_err(|_| SuoError::WrongSurfaceArity { op, expected: N, got })
}

/// `params` is `nil` (no fixed parameters, no rest), a bare symbol (an
/// all-rest parameter list), or a (possibly improper) list of symbols
/// whose tail, if a symbol rather than `nil`, is the rest parameter.
fn parse_param_list(heap: &Heap, params: Word) -> Result<(Vec<String>, Option<String>), SuoError> {
    if let Some(name) = symbol_name(heap, params) {
        return Ok((Vec::new(), Some(name)));
    }
    let mut names = Vec::new();
    let mut cursor = params;
    loop {
        if cursor.is_nil() {
            return Ok((names, None));
        }
        if let Some(name) = symbol_name(heap, cursor) {
            return Ok((names, Some(name)));
        }
        if !cursor.is_ptr(PtrTag::Pair) {
            return Err(SuoError::UnrecognisedSurfaceForm);
        }
        let addr = cursor.ptr_address().expect("checked above");
        let car = heap.read(addr, 0);
        let name = symbol_name(heap, car).ok_or(SuoError::UnrecognisedSurfaceForm)?;
        names.push(name);
        cursor = heap.read(addr, 1);
    }
}

/// Walk a proper list into its elements. Errors on an improper tail — no
/// surface form needs one (`'(1 2 . 3)`-style data never reaches here,
/// since data under `quote` is passed through unconverted).
fn read_list(heap: &Heap, mut value: Word) -> Result<Vec<Word>, SuoError> {
    let mut items = Vec::new();
    loop {
        if value.is_nil() {
            return Ok(items);
        }
        if !value.is_ptr(PtrTag::Pair) {
            return Err(SuoError::UnrecognisedSurfaceForm);
        }
        let addr = value.ptr_address().expect("checked above");
        items.push(heap.read(addr, 0));
        value = heap.read(addr, 1);
    }
}

fn symbol_name(heap: &Heap, value: Word) -> Option<String> {
    if !value.is_ptr(PtrTag::Record) {
        return None;
    }
    let addr = value.ptr_address()?;
    let descriptor = heap.read(addr, 0).ptr_address()?;
    if descriptor != heap.well_known().symbol_type {
        return None;
    }
    let name_addr = heap.read(addr, 1).ptr_address()?;
    String::from_utf8(heap.read_bytes(name_addr)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use suo_reader::{read_one, Lexer};
    use suo_runtime::Config;

    fn compile_source(heap: &mut Heap, source: &str) -> Result<Word, SuoError> {
        let mut lexer = Lexer::new(source);
        let value = read_one(heap, &mut lexer).unwrap().expect("one form");
        compile_form(heap, value, &mut Scope::new())
    }

    #[rstest::rstest]
    #[case("(#@sum 1 2 3)", Opcode::Sum)]
    #[case("(#@mul 1 2 3)", Opcode::Mul)]
    fn a_plain_arithmetic_form_compiles_to_the_matching_opcode_vector(#[case] source: &str, #[case] op: Opcode) {
        let mut heap = Heap::new(Config::default());
        let form = compile_source(&mut heap, source).expect("well-formed surface form");
        let (got_op, addr, len) = suo_eval::as_op(&heap, form).expect("an operation vector");
        assert_eq!(got_op, op);
        assert_eq!(len, 4);
        assert_eq!(heap.read(addr, 2).as_small_int(), Some(1));
    }

    #[test]
    fn an_identity_lambda_resolves_its_parameter_to_an_env_ref() {
        let mut heap = Heap::new(Config::default());
        let form = compile_source(&mut heap, "(#@lambda (x) x)").expect("well-formed surface form");
        let (op, addr, _) = suo_eval::as_op(&heap, form).expect("an operation vector");
        assert_eq!(op, Opcode::Lambda);
        let body = heap.read(addr, 3);
        assert_eq!(suo_eval::as_env_ref(&heap, body), Some((0, 0)));
    }

    #[test]
    fn an_unbound_symbol_is_reported_rather_than_panicking() {
        let mut heap = Heap::new(Config::default());
        let err = compile_source(&mut heap, "y").unwrap_err();
        assert_eq!(err, SuoError::UnboundSurfaceSymbol("y".into()));
    }

    #[test]
    fn quote_sugar_passes_its_datum_through_unevaluated() {
        let mut heap = Heap::new(Config::default());
        let form = compile_source(&mut heap, "'(a b c)").expect("well-formed surface form");
        let (op, addr, _) = suo_eval::as_op(&heap, form).expect("an operation vector");
        assert_eq!(op, Opcode::Quote);
        let datum = heap.read(addr, 2);
        assert!(datum.is_ptr(PtrTag::Pair));
    }
}
