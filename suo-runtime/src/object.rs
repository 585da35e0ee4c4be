//! Pure object-shape arithmetic shared by the allocator and the collector
//! (spec §3.2, §4.1, §4.2).

use suo_types::Word;

/// Word size in bytes. Every heap address is a multiple of [`WORD_BYTES`].
pub const WORD_BYTES: usize = 4;

/// Round a word count up to the next even number, preserving the 8-byte
/// (two-word) object alignment invariant (spec §3.1, §4.1).
pub const fn round_up_even(words: usize) -> usize {
    (words + 1) & !1
}

/// Number of 4-byte words needed to hold `n_bytes` raw bytes.
pub const fn words_for_bytes(n_bytes: usize) -> usize {
    (n_bytes + WORD_BYTES - 1) / WORD_BYTES
}

/// The shape of a heap object, as determined either from the pointer that
/// addresses it (when allocating or copying) or from its first word alone
/// (when scanning raw memory with no pointer in hand — spec §3.1's
/// "identifiable without context" invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Two words, car and cdr, no header.
    Pair,
    /// One header word (length in words) followed by that many value words.
    Vector {
        /// Payload length in words.
        length: usize,
    },
    /// One header word (length in bytes) followed by the raw byte payload.
    Bytes {
        /// Payload length in bytes.
        length_bytes: usize,
    },
    /// A byte-vector-shaped header followed by the instruction payload,
    /// then a literal-count word, then the literal values themselves.
    ///
    /// Layout, per spec §9's resolution of the `code_ptr_lit_end` ambiguity:
    /// `[header][⌈bytes/4⌉ payload words][literal-count word][literals...]`.
    /// `lit_end` is the word offset (from the object base) of one past the
    /// last literal; total object size is computed as `lit_end + 1`, not
    /// accumulated with `+=` — see `DESIGN.md` for the deviation this
    /// resolves.
    Code {
        /// Length of the raw instruction payload, in bytes.
        payload_bytes: usize,
        /// Word offset, from the object base, of the literal-count word.
        lit_begin: usize,
        /// Word offset, from the object base, one past the last literal.
        lit_end: usize,
    },
    /// One header word (a descriptor pointer) followed by `|fields|` payload
    /// words, which are value words if `fields >= 0` or raw bytes if
    /// `fields < 0` (spec §3.2).
    Record {
        /// Signed field count from the descriptor's field 0.
        fields: i32,
    },
}

impl Shape {
    /// Total object size in words, including the header and rounded up to
    /// the even-word alignment boundary.
    pub fn size_words(self) -> usize {
        let raw = match self {
            Shape::Pair => 2,
            Shape::Vector { length } => 1 + length,
            Shape::Bytes { length_bytes } => 1 + words_for_bytes(length_bytes),
            Shape::Code { lit_end, .. } => lit_end + 1,
            Shape::Record { fields } => 1 + fields.unsigned_abs() as usize,
        };
        round_up_even(raw)
    }

    /// Whether this record's payload words hold tagged values (to be
    /// scanned by the GC) as opposed to raw bytes.
    pub fn record_fields_are_values(fields: i32) -> bool {
        fields >= 0
    }

    /// Decode the `Vector`/`Bytes`/`Code` shape from a header word that is
    /// already known to be one of the three header kinds.
    pub fn from_header(header: Word) -> Option<Shape> {
        if header.is_vector_header() {
            return Some(Shape::Vector {
                length: header.header_length()?,
            });
        }
        if header.is_bytes_header() {
            return Some(Shape::Bytes {
                length_bytes: header.header_length()?,
            });
        }
        if header.is_code_header() {
            let payload_bytes = header.header_length()?;
            let lit_begin = 1 + words_for_bytes(payload_bytes);
            return Some(Shape::Code {
                payload_bytes,
                lit_begin,
                // `lit_end` isn't known from the header alone; the caller
                // fills it in once it has read the literal-count word.
                lit_end: lit_begin,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_two_words() {
        assert_eq!(Shape::Pair.size_words(), 2);
    }

    #[rstest::rstest]
    #[case(3, 4)] // 1+3=4, even already
    #[case(2, 4)] // 1+2=3, rounds to 4
    fn vector_rounds_up(#[case] length: usize, #[case] words: usize) {
        assert_eq!(Shape::Vector { length }.size_words(), words);
    }

    #[test]
    fn bytes_packs_four_per_word() {
        assert_eq!(Shape::Bytes { length_bytes: 5 }.size_words(), round_up_even(1 + 2));
    }

    #[test]
    fn record_uses_absolute_field_count() {
        assert_eq!(Shape::Record { fields: 3 }.size_words(), round_up_even(4));
        assert_eq!(Shape::Record { fields: -3 }.size_words(), round_up_even(4));
    }

    proptest::proptest! {
        #[test]
        fn round_up_even_is_always_even_and_never_shrinks(words in 0usize..10_000) {
            let rounded = round_up_even(words);
            proptest::prop_assert_eq!(rounded % 2, 0);
            proptest::prop_assert!(rounded >= words);
        }
    }
}
