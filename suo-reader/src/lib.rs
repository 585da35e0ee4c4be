//! Non-recursive bootstrap S-expression reader and writer (spec §4.3, §4.4,
//! §6). Mirrors [`suo_runtime::gc`]'s explicit-frame-stack discipline: the
//! reader's frame stack lives in the heap it is building into, since
//! reading allocates and a native host stack of pending values would need
//! its own separate, error-prone root registration. The writer never
//! allocates, so its frame stack is a plain native `Vec`.

mod charnames;
mod error;
mod frame;
mod lexer;
mod read;
mod write;

pub use error::ReaderError;
pub use lexer::Lexer;
pub use read::read_one;
pub use write::write_one;
