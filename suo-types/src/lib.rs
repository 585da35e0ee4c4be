//! Tagged 32-bit word representation for the Suo runtime.
//!
//! Every value in the Suo heap is a single [`Word`]: a 32-bit quantity whose
//! low bits classify it as a small integer, a heap pointer of one of a few
//! kinds, or an immediate (character, boolean, nil, unspecified, or a length
//! header for a vector/byte-vector/code-block).

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

mod error;
mod opcode;
mod tag;
mod word;

pub use error::ValueError;
pub use opcode::Opcode;
pub use tag::{ImmediateTag, PtrTag, Tag};
pub use word::Word;

/// Smallest representable small-integer value (`-2^29`).
pub const SMALL_INT_MIN: i32 = -(1 << 29);
/// Largest representable small-integer value (`2^29 - 1`).
pub const SMALL_INT_MAX: i32 = (1 << 29) - 1;

static_assertions::assert_eq_size!(Word, u32);
