use derive_more::Display;

/// Errors surfaced by the allocator and collector (spec §4.1, §4.2, §7).
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The semi-space could not satisfy an allocation even after a
    /// collection. Per spec §6, the caller prints `FULL` to stderr and
    /// aborts; this variant carries the request size so the caller can log
    /// it first.
    #[display(fmt = "heap exhausted: requested {requested} words, semi-space holds {capacity}")]
    HeapExhausted {
        /// Words requested by the failing `allocate` call.
        requested: usize,
        /// Total capacity of one semi-space, in words.
        capacity: usize,
    },
    /// The debug heap-consistency check found a structural violation.
    #[display(fmt = "heap consistency check failed: {_0}")]
    Inconsistent(HeapCheckError),
    /// A value was produced from [`suo_types`] that the heap cannot encode
    /// (misaligned address, oversized length).
    #[display(fmt = "{_0}")]
    Value(suo_types::ValueError),
}

#[cfg(feature = "std")]
impl std::error::Error for RuntimeError {}

impl From<suo_types::ValueError> for RuntimeError {
    fn from(e: suo_types::ValueError) -> Self {
        Self::Value(e)
    }
}

/// A structural violation found by [`crate::Heap::check_consistency`]
/// (spec §4.2 "Optional heap check").
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum HeapCheckError {
    /// A pointer field's target address does not land on the start of any
    /// object, as determined by the shadow size-map.
    #[display(fmt = "pointer at word {at:#x} targets non-object-start address {target:#x}")]
    DanglingPointer {
        /// Word offset of the field holding the bad pointer.
        at: usize,
        /// The address it pointed to.
        target: usize,
    },
    /// A header pattern was found where only field contents should appear.
    #[display(fmt = "header-shaped word found as field content at word {_0:#x}")]
    HeaderAsFieldContent(usize),
}

#[cfg(feature = "std")]
impl std::error::Error for HeapCheckError {}
