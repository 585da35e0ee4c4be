use derive_more::Display;

/// Errors raised constructing or decoding a [`crate::Word`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ValueError {
    /// A value was outside `-2^29 ..= 2^29 - 1`. Per spec, this is a fatal
    /// error in the bootstrap path rather than a promotion to bignums.
    #[display(fmt = "integer {_0} is out of small-integer range")]
    IntegerOutOfRange(i64),
    /// A character's code point did not fit the 24 bits the format reserves.
    #[display(fmt = "code point {_0:#x} does not fit in 24 bits")]
    CharOutOfRange(u32),
    /// A length header's payload did not fit the available bits.
    #[display(fmt = "length {_0} does not fit in a header word")]
    LengthOutOfRange(usize),
    /// An address was not 8-byte (two-word) aligned, violating the heap
    /// layout invariant.
    #[display(fmt = "address {_0:#x} is not two-word aligned")]
    Misaligned(usize),
}

#[cfg(feature = "std")]
impl std::error::Error for ValueError {}
