//! Bump allocator, Cheney copying collector, and the process-global state
//! (root stack, symbol table, well-known type records) every Suo heap
//! carries (spec §4.1, §4.2, §5).
//!
//! Unlike `suo-types`, this crate owns a growable backing buffer and does
//! not attempt `no_std` support; see `DESIGN.md`.
#![deny(unsafe_code)]

mod config;
mod error;
mod gc;
mod heap;
mod object;
mod symtab;
mod wellknown;

pub use config::{Config, DEFAULT_HEAP_WORDS, DEFAULT_ROOT_STACK_CAPACITY};
pub use error::{HeapCheckError, RuntimeError};
pub use heap::{Heap, RootHandle};
pub use object::Shape;
pub use symtab::SymbolTable;
pub use wellknown::WellKnown;
