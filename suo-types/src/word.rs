use core::fmt;

use crate::{
    error::ValueError,
    tag::{ImmediateTag, PtrTag, Special, Tag, MASK_3BIT},
    SMALL_INT_MAX, SMALL_INT_MIN,
};

/// A single tagged 32-bit heap word (spec §3.1).
///
/// `Word` is `Copy` and carries no lifetime: it is either a small integer, a
/// pointer into the active semi-space, or an immediate value. Decoding a
/// pointer's address requires knowing which semi-space is active, so
/// [`Word`] itself only exposes the raw (tagged) address via
/// [`Word::ptr_address`]; the heap owns the actual dereference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Word(u32);

impl Word {
    /// Build a `Word` from its exact bit pattern. Only used by the heap and
    /// the GC, which are responsible for maintaining the tagging invariants.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bit pattern.
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Classify this word's tag.
    pub fn tag(self) -> Tag {
        Tag::from_bits(self.0)
    }

    // -- small integers --------------------------------------------------

    /// Construct a small integer, or fail if it doesn't fit in 30 bits.
    pub fn small_int(value: i32) -> Result<Self, ValueError> {
        if !(SMALL_INT_MIN..=SMALL_INT_MAX).contains(&value) {
            return Err(ValueError::IntegerOutOfRange(value as i64));
        }
        Ok(Self((value as u32) << 2))
    }

    /// Whether this word is a small integer.
    pub fn is_small_int(self) -> bool {
        matches!(self.tag(), Tag::SmallInt)
    }

    /// Decode this word as a small integer, if it is one.
    pub fn as_small_int(self) -> Option<i32> {
        self.is_small_int()
            .then(|| (self.0 as i32) >> 2)
    }

    // -- pointers ----------------------------------------------------------

    fn ptr(tag: PtrTag, address: usize) -> Result<Self, ValueError> {
        if address & 0b111 != 0 {
            return Err(ValueError::Misaligned(address));
        }
        let bits = address as u32 | tag as u32;
        Ok(Self(bits))
    }

    /// Construct a pair pointer to the given (two-word-aligned) address.
    pub fn pair_ptr(address: usize) -> Result<Self, ValueError> {
        Self::ptr(PtrTag::Pair, address)
    }

    /// Construct a vector pointer.
    pub fn vector_ptr(address: usize) -> Result<Self, ValueError> {
        Self::ptr(PtrTag::Vector, address)
    }

    /// Construct a record pointer.
    pub fn record_ptr(address: usize) -> Result<Self, ValueError> {
        Self::ptr(PtrTag::Record, address)
    }

    /// Construct a byte-vector/code-block pointer.
    pub fn bytes_ptr(address: usize) -> Result<Self, ValueError> {
        Self::ptr(PtrTag::Bytes, address)
    }

    /// Construct a record-descriptor-header word: legal only as the first
    /// word of a record object, pointing at the record's descriptor.
    pub fn descriptor_header(address: usize) -> Result<Self, ValueError> {
        Self::ptr(PtrTag::Descriptor, address)
    }

    /// Whether this word's tag is the given pointer kind.
    pub fn is_ptr(self, kind: PtrTag) -> bool {
        matches!(self.tag(), Tag::Ptr(t) if t == kind)
    }

    /// Whether this word is one of the pointer kinds that addresses a heap
    /// object (pair, vector, record, or bytes) — excludes descriptor-header
    /// and immediate words, which are not independently-addressable objects.
    pub fn is_object_ptr(self) -> bool {
        matches!(
            self.tag(),
            Tag::Ptr(PtrTag::Pair | PtrTag::Vector | PtrTag::Record | PtrTag::Bytes)
        )
    }

    /// The base address of the object this word points to, with the 3-bit
    /// tag masked off. Valid for any pointer or descriptor-header tag.
    pub fn ptr_address(self) -> Option<usize> {
        match self.tag() {
            Tag::Ptr(_) => Some((self.0 & !MASK_3BIT) as usize),
            Tag::SmallInt => None,
        }
    }

    // -- headers -------------------------------------------------------------

    fn header(tag: ImmediateTag, length: usize) -> Result<Self, ValueError> {
        let shifted = (length as u64) << ImmediateTag::SHIFT;
        if shifted > u32::MAX as u64 {
            return Err(ValueError::LengthOutOfRange(length));
        }
        Ok(Self(shifted as u32 | tag as u32))
    }

    /// A vector header whose payload is the vector's length in words.
    pub fn vector_header(length_words: usize) -> Result<Self, ValueError> {
        Self::header(ImmediateTag::VectorHeader, length_words)
    }

    /// A byte-vector header whose payload is the length in bytes.
    pub fn bytes_header(length_bytes: usize) -> Result<Self, ValueError> {
        Self::header(ImmediateTag::BytesHeader, length_bytes)
    }

    /// A code-block header whose payload is the length in bytes (of the
    /// byte-code payload, excluding the trailing literal vector).
    pub fn code_header(length_bytes: usize) -> Result<Self, ValueError> {
        Self::header(ImmediateTag::CodeHeader, length_bytes)
    }

    fn immediate_tag(self) -> Option<ImmediateTag> {
        matches!(self.tag(), Tag::Ptr(PtrTag::Immediate))
            .then(|| ImmediateTag::from_bits(self.0))
            .flatten()
    }

    /// Whether this word is any kind of header word (vector, bytes, or
    /// code-block).
    pub fn is_header(self) -> bool {
        matches!(
            self.immediate_tag(),
            Some(ImmediateTag::VectorHeader | ImmediateTag::BytesHeader | ImmediateTag::CodeHeader)
        )
    }

    /// The decoded length payload of a header word, in whatever unit that
    /// header kind uses (words for vectors, bytes otherwise).
    pub fn header_length(self) -> Option<usize> {
        self.immediate_tag()
            .filter(|t| {
                matches!(
                    t,
                    ImmediateTag::VectorHeader | ImmediateTag::BytesHeader | ImmediateTag::CodeHeader
                )
            })
            .map(|_| (self.0 >> ImmediateTag::SHIFT) as usize)
    }

    /// Whether this is specifically a vector header.
    pub fn is_vector_header(self) -> bool {
        self.immediate_tag() == Some(ImmediateTag::VectorHeader)
    }

    /// Whether this is specifically a byte-vector header.
    pub fn is_bytes_header(self) -> bool {
        self.immediate_tag() == Some(ImmediateTag::BytesHeader)
    }

    /// Whether this is specifically a code-block header.
    pub fn is_code_header(self) -> bool {
        self.immediate_tag() == Some(ImmediateTag::CodeHeader)
    }

    // -- characters, booleans, nil, unspecified -----------------------------

    /// Construct a character immediate.
    pub fn char_(c: char) -> Result<Self, ValueError> {
        let code = c as u32;
        if code > 0x00FF_FFFF {
            return Err(ValueError::CharOutOfRange(code));
        }
        Ok(Self((code << ImmediateTag::SHIFT) | ImmediateTag::Char as u32))
    }

    /// Decode this word as a character, if it is one.
    pub fn as_char(self) -> Option<char> {
        if self.immediate_tag() != Some(ImmediateTag::Char) {
            return None;
        }
        let code = self.0 >> ImmediateTag::SHIFT;
        char::from_u32(code)
    }

    fn special(which: Special) -> Self {
        Self(((which as u32) << ImmediateTag::SHIFT) | ImmediateTag::Special as u32)
    }

    fn as_special(self) -> Option<Special> {
        if self.immediate_tag() != Some(ImmediateTag::Special) {
            return None;
        }
        Special::from_payload(self.0 >> ImmediateTag::SHIFT)
    }

    /// The empty list / nil.
    pub fn nil() -> Self {
        Self::special(Special::Nil)
    }

    /// Whether this word is nil.
    pub fn is_nil(self) -> bool {
        self.as_special() == Some(Special::Nil)
    }

    /// The unspecified value, returned by e.g. `set!` and failed reads.
    pub fn unspecified() -> Self {
        Self::special(Special::Unspecified)
    }

    /// Whether this word is the unspecified value.
    pub fn is_unspecified(self) -> bool {
        self.as_special() == Some(Special::Unspecified)
    }

    /// Construct a boolean immediate.
    pub fn bool_(b: bool) -> Self {
        Self::special(if b { Special::True } else { Special::False })
    }

    /// Decode this word as a boolean, if it is `#t` or `#f`.
    pub fn as_bool(self) -> Option<bool> {
        match self.as_special() {
            Some(Special::True) => Some(true),
            Some(Special::False) => Some(false),
            _ => None,
        }
    }

    /// Suo's truthiness rule: everything except `#f` is true.
    pub fn is_truthy(self) -> bool {
        self.as_bool() != Some(false)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(i) = self.as_small_int() {
            return write!(f, "Word::Int({i})");
        }
        if let Some(c) = self.as_char() {
            return write!(f, "Word::Char({c:?})");
        }
        if self.is_nil() {
            return write!(f, "Word::Nil");
        }
        if self.is_unspecified() {
            return write!(f, "Word::Unspecified");
        }
        if let Some(b) = self.as_bool() {
            return write!(f, "Word::Bool({b})");
        }
        match self.tag() {
            Tag::Ptr(kind) => write!(f, "Word::Ptr({kind:?}, {:#x})", self.0 & !MASK_3BIT),
            Tag::SmallInt => write!(f, "Word::Int(?)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(0)]
    #[case(1)]
    #[case(-1)]
    #[case(SMALL_INT_MAX)]
    #[case(SMALL_INT_MIN)]
    #[case(12345)]
    #[case(-54321)]
    fn small_int_round_trips(#[case] v: i32) {
        let w = Word::small_int(v).unwrap();
        assert!(w.is_small_int());
        assert_eq!(w.as_small_int(), Some(v));
    }

    #[test]
    fn small_int_out_of_range_rejected() {
        assert!(Word::small_int(SMALL_INT_MAX + 1).is_err());
        assert!(Word::small_int(SMALL_INT_MIN - 1).is_err());
    }

    proptest::proptest! {
        #[test]
        fn small_int_round_trips_over_the_whole_range(v in SMALL_INT_MIN..=SMALL_INT_MAX) {
            let w = Word::small_int(v).unwrap();
            proptest::prop_assert!(w.is_small_int());
            proptest::prop_assert_eq!(w.as_small_int(), Some(v));
        }
    }

    #[test]
    fn pointer_tags_round_trip() {
        let addr = 0x1000;
        assert!(Word::pair_ptr(addr).unwrap().is_ptr(PtrTag::Pair));
        assert!(Word::vector_ptr(addr).unwrap().is_ptr(PtrTag::Vector));
        assert!(Word::record_ptr(addr).unwrap().is_ptr(PtrTag::Record));
        assert!(Word::bytes_ptr(addr).unwrap().is_ptr(PtrTag::Bytes));
        assert_eq!(Word::vector_ptr(addr).unwrap().ptr_address(), Some(addr));
    }

    #[test]
    fn misaligned_pointer_rejected() {
        assert!(Word::pair_ptr(1).is_err());
    }

    #[test]
    fn headers_round_trip() {
        let v = Word::vector_header(7).unwrap();
        assert!(v.is_vector_header());
        assert_eq!(v.header_length(), Some(7));

        let b = Word::bytes_header(19).unwrap();
        assert!(b.is_bytes_header());
        assert_eq!(b.header_length(), Some(19));

        let c = Word::code_header(4).unwrap();
        assert!(c.is_code_header());
        assert_eq!(c.header_length(), Some(4));
    }

    #[test]
    fn special_immediates() {
        assert!(Word::nil().is_nil());
        assert!(Word::unspecified().is_unspecified());
        assert_eq!(Word::bool_(true).as_bool(), Some(true));
        assert_eq!(Word::bool_(false).as_bool(), Some(false));
        assert!(!Word::bool_(false).is_truthy());
        assert!(Word::bool_(true).is_truthy());
        assert!(Word::nil().is_truthy());
    }

    #[test]
    fn characters_round_trip() {
        let w = Word::char_('λ').unwrap();
        assert_eq!(w.as_char(), Some('λ'));
    }
}
