//! Binary crate wiring: the surface shim over the bootstrap evaluator, the
//! CLI-facing config, the Emacs wire protocol, and the top-level error
//! type aggregating every library crate below it.

pub mod config;
pub mod error;
pub mod protocol;
pub mod surface;

pub use config::Config;
pub use error::SuoError;

use std::io::Write as _;

use suo_runtime::Heap;
use suo_types::Word;

/// Read, compile through the surface shim, evaluate, and write one form —
/// the REPL's inner loop (spec §6 "Bootstrap I/O"), factored out so both
/// the interactive REPL and a one-shot file run share it.
pub fn eval_one(heap: &mut Heap, lexer: &mut suo_reader::Lexer<'_>) -> Result<Option<String>, SuoError> {
    let Some(value) = suo_reader::read_one(heap, lexer)? else {
        return Ok(None);
    };
    let mut scope = surface::Scope::new();
    let compiled = surface::compile_form(heap, value, &mut scope)?;
    let result = suo_eval::eval(heap, compiled, Word::nil())?;
    let mut out = String::new();
    suo_reader::write_one(heap, result, &mut out);
    Ok(Some(out))
}

/// Run every form in `source` in turn, writing each result on its own
/// line. Per spec §7, a reader-syntax fault is recovered — `read_one`'s own
/// contract is "caller prints the diagnostic and treats the read as having
/// produced `unspecified`" — so this prints the fault to stdout and keeps
/// reading; every other error category (compilation, evaluator type error,
/// allocation failure) is fatal and stops the run.
pub fn run_source(heap: &mut Heap, source: &str, out: &mut impl std::io::Write) -> Result<(), SuoError> {
    let mut lexer = suo_reader::Lexer::new(source);
    loop {
        match eval_one(heap, &mut lexer) {
            Ok(Some(line)) => writeln!(out, "{line}").map_err(|e| SuoError::Io(e.to_string()))?,
            Ok(None) => break,
            Err(SuoError::Reader(reader_err)) => {
                writeln!(out, "; {reader_err}").map_err(|e| SuoError::Io(e.to_string()))?;
                if matches!(reader_err, suo_reader::ReaderError::UnexpectedEof(_)) {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }
    out.flush().map_err(|e| SuoError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use suo_runtime::Config;

    fn run(source: &str) -> String {
        let mut heap = Heap::new(Config::default());
        let mut out = Vec::new();
        run_source(&mut heap, source, &mut out).expect("well-formed demo source runs");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn the_sum_scenario_evaluates_to_six() {
        assert_eq!(run("(#@sum 1 2 3)"), "6\n");
    }

    #[test]
    fn the_mul_scenario_evaluates_to_fourteen() {
        assert_eq!(run("(#@mul 2 (#@sum 3 4))"), "14\n");
    }

    #[test]
    fn the_if_scenario_takes_the_true_branch_on_true_and_false_branch_on_false() {
        assert_eq!(run("(#@if #t 1 2)"), "1\n");
        assert_eq!(run("(#@if #f 1 2)"), "2\n");
    }

    #[test]
    fn a_lambda_applied_via_call_returns_its_argument() {
        assert_eq!(run("(#@call (#@lambda (x) x) 5)"), "5\n");
    }

    #[test]
    fn a_quoted_list_is_echoed_back_unevaluated() {
        assert_eq!(run("'(a b c)"), "(a b c)\n");
    }

    #[test]
    fn a_string_literal_round_trips_through_read_and_write() {
        assert_eq!(run(r#""ab\nc""#), "\"ab\\x0ac\"\n");
    }
}
