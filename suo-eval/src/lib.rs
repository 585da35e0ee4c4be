//! The non-recursive bootstrap evaluator (spec §4.5): a labelled
//! `eval_form` / `do_op_step` / `use_value` dispatch over an explicit,
//! heap-resident control stack, mirroring [`suo_reader`]'s frame-stack
//! discipline for the same reason — the host call stack must stay flat
//! regardless of how deeply the evaluated program nests.

mod control;
mod env;
mod error;
mod eval;
mod forms;

pub use env::{lookup as env_lookup, new_frame as new_env_frame, set as env_set};
pub use error::EvalError;
pub use eval::eval;
pub use forms::{as_env_ref, as_op, decode_signature, encode_signature, make_env_ref, make_op};
