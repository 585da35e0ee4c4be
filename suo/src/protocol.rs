//! The narrow shape of the Emacs-side wire protocol (spec §6, SPEC_FULL §3):
//! newline-delimited s-expressions, request/response pairs correlated by an
//! integer id, and asynchronous `(event <id> <tag> …)` notifications
//! dispatched to handlers registered per `(id, tag)`. The protocol itself —
//! and any real editor on the other end of it — is an external collaborator;
//! this module only implements the framing and dispatch table, the same way
//! `suo_cps::codegen::AsmContext` only implements an interface for its own
//! external collaborator.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use suo_reader::{read_one, write_one, Lexer};
use suo_runtime::Heap;
use suo_types::{PtrTag, Word};

use crate::error::SuoError;

/// Registry key for an event handler: the request id it's scoped to, plus
/// the event's tag symbol.
pub type HandlerKey = (i32, String);

/// One decoded request: `(<id> . <form>)`, the id a small integer and
/// `form` the surface s-expression to evaluate.
pub struct Request {
    pub id: i32,
    pub form: Word,
}

/// Parse one line of the wire protocol into a `(id . form)` request pair.
/// Per spec, a malformed request is fatal — this returns `Err` rather than
/// trying to recover, leaving the abort decision to the caller.
pub fn parse_request(heap: &mut Heap, line: &str) -> Result<Request, SuoError> {
    let mut lexer = Lexer::new(line);
    let value = read_one(heap, &mut lexer)?.ok_or(SuoError::UnrecognisedSurfaceForm)?;
    if !value.is_ptr(PtrTag::Pair) {
        return Err(SuoError::UnrecognisedSurfaceForm);
    }
    let addr = value.ptr_address().expect("checked above");
    let id = heap.read(addr, 0).as_small_int().ok_or(SuoError::UnrecognisedSurfaceForm)?;
    let form = heap.read(addr, 1);
    Ok(Request { id, form })
}

/// Write a `(<id> <result>)` response line.
pub fn write_response(heap: &Heap, id: i32, result: Word) -> Result<String, SuoError> {
    let pair = heap.alloc_pair(Word::small_int(id)?, result)?;
    let mut out = String::new();
    write_one(heap, pair, &mut out);
    Ok(out)
}

/// Dispatch table for `(event <id> <tag> …)` notifications, keyed by the
/// `(id, tag)` pair that registered interest in them.
#[derive(Default)]
pub struct EventHandlers {
    handlers: HashMap<HandlerKey, Box<dyn FnMut(&Heap, Word)>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: i32, tag: impl Into<String>, handler: impl FnMut(&Heap, Word) + 'static) {
        self.handlers.insert((id, tag.into()), Box::new(handler));
    }

    /// Feed one decoded `(event <id> <tag> …payload)` form to its registered
    /// handler, if any is registered; a form with no registered handler is
    /// silently dropped, matching an editor that queues events for tags it
    /// hasn't subscribed to yet.
    pub fn dispatch(&mut self, heap: &Heap, id: i32, tag: &str, payload: Word) {
        if let Some(handler) = self.handlers.get_mut(&(id, tag.to_string())) {
            handler(heap, payload);
        }
    }
}

/// Run the wire protocol over arbitrary reader/writer streams (stdio in
/// practice). Per spec, a request error is fatal: this returns on the
/// first one rather than trying to continue.
pub fn serve<R: BufRead, W: Write>(heap: &mut Heap, input: &mut R, output: &mut W) -> Result<(), SuoError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = input.read_line(&mut line).map_err(|e| SuoError::Io(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
        let request = parse_request(heap, &line)?;
        let mut scope = crate::surface::Scope::new();
        let compiled = crate::surface::compile_form(heap, request.form, &mut scope)?;
        let result = suo_eval::eval(heap, compiled, Word::nil())?;
        let response = write_response(heap, request.id, result)?;
        writeln!(output, "{response}").map_err(|e| SuoError::Io(e.to_string()))?;
        output.flush().map_err(|e| SuoError::Io(e.to_string()))?;
    }
}
