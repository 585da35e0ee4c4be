//! Cheney-style copying collector (spec §4.2).

use suo_types::{PtrTag, Tag, Word};

use crate::{
    error::{HeapCheckError, RuntimeError},
    heap::Heap,
    object::{Shape, WORD_BYTES},
};

/// Whether a tagged word addresses a heap location at all. Unlike
/// [`suo_types::Word::is_object_ptr`] this also recognises the
/// `Descriptor` tag, which only ever appears as the first word of a
/// record but must still be followed and relocated by the collector.
fn has_address(v: Word) -> bool {
    matches!(v.tag(), Tag::Ptr(k) if k != PtrTag::Immediate)
}

fn rebuild_with_tag(new_addr: usize, kind: PtrTag) -> Word {
    match kind {
        PtrTag::Pair => Word::pair_ptr(new_addr),
        PtrTag::Vector => Word::vector_ptr(new_addr),
        PtrTag::Record => Word::record_ptr(new_addr),
        PtrTag::Bytes => Word::bytes_ptr(new_addr),
        PtrTag::Descriptor => Word::descriptor_header(new_addr),
        PtrTag::Immediate => unreachable!("Immediate words carry no address"),
    }
    .expect("relocated address inherits source alignment")
}

/// Classify the object starting at `memory[idx]` purely from its first
/// word, with no external pointer in hand (spec §3.1's "a scanner tells
/// pairs from other objects" invariant). Used by the scan step and the
/// debug consistency check.
fn classify(memory: &[Word], idx: usize) -> Shape {
    let first = memory[idx];
    if let Some(shape) = Shape::from_header(first) {
        if let Shape::Code { payload_bytes, lit_begin, .. } = shape {
            let lit_end = memory[idx + lit_begin]
                .as_small_int()
                .expect("code block literal-count word must be a small integer") as usize;
            return Shape::Code { payload_bytes, lit_begin, lit_end };
        }
        return shape;
    }
    if first.is_ptr(PtrTag::Descriptor) {
        let daddr = first.ptr_address().expect("descriptor header always has an address");
        let fields = memory[daddr / WORD_BYTES + 1]
            .as_small_int()
            .expect("descriptor field 0 must be a small integer");
        return Shape::Record { fields };
    }
    Shape::Pair
}

/// A single semi-space pass over the shared backing buffer, parameterised
/// by the to-space bounds. Holds only a `&mut [Word]` so the caller can
/// freely re-borrow `Heap::memory_mut()` between phases rather than
/// juggling one long-lived borrow across unrelated field accesses.
struct Spaces<'m> {
    memory: &'m mut [Word],
    to_base: usize,
    to_end: usize,
}

impl<'m> Spaces<'m> {
    /// Copy (or find the already-copied location of) the object `v` points
    /// to, returning the equivalent pointer in to-space. Non-pointer words
    /// (small integers, characters, booleans, nil, unspecified) pass
    /// through untouched.
    fn copy_value(&mut self, alloc: &mut usize, v: Word) -> Result<Word, RuntimeError> {
        if !has_address(v) {
            return Ok(v);
        }
        let kind = match v.tag() {
            Tag::Ptr(k) => k,
            Tag::SmallInt => unreachable!(),
        };
        let addr = v.ptr_address().expect("has_address implies a pointer tag");
        let idx = addr / WORD_BYTES;

        // Forwarding marker: a `Pair`-tagged word whose target already lies
        // in to-space (spec §4.2). This can't be confused with a live,
        // not-yet-copied object's own first word: from-space and to-space
        // are disjoint ranges, and every object reachable before this
        // collection started lived in from-space, so no genuine pre-existing
        // pointer can already target an address inside to-space. The only
        // way this address range is hit is if this exact slot was
        // overwritten by this collection's own forwarding step.
        let marker = self.memory[idx];
        if marker.is_ptr(PtrTag::Pair) {
            if let Some(target) = marker.ptr_address() {
                let tidx = target / WORD_BYTES;
                if tidx >= self.to_base && tidx < self.to_end {
                    return Ok(rebuild_with_tag(target, kind));
                }
            }
        }

        // Not yet copied. Determine this object's shape. Record sizing
        // reads the descriptor's field 0 directly out of from-space by
        // address, without forcing the descriptor to move first: safe even
        // when the descriptor is this very record (the self-referential
        // `record-type-type`, spec §9), because forwarding only ever
        // overwrites word 0 of an object, never its field words.
        let shape = match kind {
            PtrTag::Pair => Shape::Pair,
            PtrTag::Vector | PtrTag::Bytes => Shape::from_header(self.memory[idx])
                .ok_or(RuntimeError::Inconsistent(HeapCheckError::HeaderAsFieldContent(idx)))?,
            PtrTag::Record | PtrTag::Descriptor => {
                let daddr = self.memory[idx]
                    .ptr_address()
                    .expect("record/descriptor header always carries a descriptor address");
                let fields = self.memory[daddr / WORD_BYTES + 1].as_small_int().ok_or(
                    RuntimeError::Inconsistent(HeapCheckError::HeaderAsFieldContent(daddr / WORD_BYTES + 1)),
                )?;
                Shape::Record { fields }
            }
            PtrTag::Immediate => unreachable!(),
        };

        let shape = if let Shape::Code { lit_begin, payload_bytes, .. } = shape {
            let lit_end = self.memory[idx + lit_begin].as_small_int().ok_or(RuntimeError::Inconsistent(
                HeapCheckError::HeaderAsFieldContent(idx + lit_begin),
            ))? as usize;
            Shape::Code { payload_bytes, lit_begin, lit_end }
        } else {
            shape
        };

        let size = shape.size_words();
        let new_idx = *alloc;
        if new_idx + size > self.to_end {
            return Err(RuntimeError::HeapExhausted { requested: size, capacity: self.to_end - self.to_base });
        }
        for i in 0..size {
            self.memory[new_idx + i] = self.memory[idx + i];
        }
        *alloc += size;
        self.memory[idx] =
            Word::pair_ptr(new_idx * WORD_BYTES).expect("to-space allocation is always two-word aligned");
        Ok(rebuild_with_tag(new_idx * WORD_BYTES, kind))
    }
}

impl Heap {
    /// Run one collection: copy everything reachable from the root stack,
    /// the well-known type records, and the symbol table into the inactive
    /// semi-space, then flip the active half over to it (spec §4.2).
    ///
    /// Each phase below re-borrows `self.memory_mut()` into a fresh
    /// [`Spaces`] rather than holding one borrow across the whole
    /// collection, so in between phases the collector can freely touch
    /// other `Heap` fields (roots, well-known addresses, symbol buckets).
    pub fn collect(&mut self) -> Result<(), RuntimeError> {
        if self.config().debug_heap_check {
            self.check_consistency()?;
        }

        let to_base = self.inactive_base();
        let to_end = to_base + self.capacity_words();
        let mut alloc = to_base;

        // Roots: the explicit root stack (spec §3.3).
        let mut roots = self.take_roots();
        {
            let mut spaces = Spaces { memory: self.memory_mut(), to_base, to_end };
            for v in roots.iter_mut() {
                *v = spaces.copy_value(&mut alloc, *v)?;
            }
        }
        self.restore_roots(roots);

        // Well-known type records (process-global roots, spec §5).
        let old_well_known = self.well_known().addresses();
        let mut new_well_known = [0usize; 4];
        {
            let mut spaces = Spaces { memory: self.memory_mut(), to_base, to_end };
            for (i, addr) in old_well_known.iter().enumerate() {
                let v = Word::descriptor_header(*addr).expect("well-known addresses stay aligned");
                let moved = spaces.copy_value(&mut alloc, v)?;
                new_well_known[i] = moved.ptr_address().expect("descriptor tag carries an address");
            }
        }
        self.well_known_mut().set_addresses(new_well_known);

        // Interned symbols (process-global roots, spec §5).
        let mut buckets = self.symbols_mut().take_buckets();
        {
            let mut spaces = Spaces { memory: self.memory_mut(), to_base, to_end };
            for bucket in buckets.iter_mut() {
                for w in bucket.iter_mut() {
                    *w = spaces.copy_value(&mut alloc, *w)?;
                }
            }
        }
        self.symbols_mut().restore_buckets(buckets);

        // Scan: walk to-space from its start to the current bump pointer,
        // rewriting every value slot each object contains.
        {
            let mut spaces = Spaces { memory: self.memory_mut(), to_base, to_end };
            let mut scan = to_base;
            while scan < alloc {
                let shape = classify(spaces.memory, scan);
                match shape {
                    Shape::Pair => {
                        let car = spaces.memory[scan];
                        let cdr = spaces.memory[scan + 1];
                        spaces.memory[scan] = spaces.copy_value(&mut alloc, car)?;
                        spaces.memory[scan + 1] = spaces.copy_value(&mut alloc, cdr)?;
                    }
                    Shape::Vector { length } => {
                        for i in 1..=length {
                            let v = spaces.memory[scan + i];
                            spaces.memory[scan + i] = spaces.copy_value(&mut alloc, v)?;
                        }
                    }
                    Shape::Bytes { .. } => {
                        // Raw byte payloads hold no pointers (spec §4.2 "Scan step").
                    }
                    Shape::Code { lit_begin, lit_end, .. } => {
                        for i in (lit_begin + 1)..lit_end {
                            let v = spaces.memory[scan + i];
                            spaces.memory[scan + i] = spaces.copy_value(&mut alloc, v)?;
                        }
                    }
                    Shape::Record { fields } => {
                        let header = spaces.memory[scan];
                        spaces.memory[scan] = spaces.copy_value(&mut alloc, header)?;
                        if Shape::record_fields_are_values(fields) {
                            for i in 1..=fields.unsigned_abs() as usize {
                                let v = spaces.memory[scan + i];
                                spaces.memory[scan + i] = spaces.copy_value(&mut alloc, v)?;
                            }
                        }
                    }
                }
                scan += shape.size_words();
            }
        }

        self.finish_collection(to_base, alloc);
        tracing::trace!(live_words = alloc - to_base, "collection finished");

        if self.config().debug_heap_check {
            self.check_consistency()?;
        }
        Ok(())
    }

    /// The debug two-pass consistency check (spec §4.2 "Optional heap
    /// check"): pass 1 computes a shadow size-map over the active space,
    /// pass 2 validates every pointer field lands on an object start and
    /// that no header pattern appears as field content.
    pub fn check_consistency(&self) -> Result<(), RuntimeError> {
        let base = self.active_base();
        let end = self.active_bump();
        let memory = self.memory();

        let mut sizes = vec![0usize; end.saturating_sub(base)];
        let mut cursor = base;
        while cursor < end {
            let shape = classify(memory, cursor);
            let size = shape.size_words();
            sizes[cursor - base] = size;
            cursor += size;
        }

        let is_object_start = |idx: usize| -> bool { idx >= base && idx < end && sizes[idx - base] != 0 };

        let mut cursor = base;
        while cursor < end {
            let size = sizes[cursor - base];
            let shape = classify(memory, cursor);
            let field_range: Vec<usize> = match shape {
                Shape::Pair => vec![cursor, cursor + 1],
                Shape::Vector { length } => (1..=length).map(|i| cursor + i).collect(),
                Shape::Bytes { .. } => vec![],
                Shape::Code { lit_begin, lit_end, .. } => ((lit_begin + 1)..lit_end).map(|i| cursor + i).collect(),
                Shape::Record { fields } if Shape::record_fields_are_values(fields) => {
                    (1..=fields.unsigned_abs() as usize).map(|i| cursor + i).collect()
                }
                Shape::Record { .. } => vec![],
            };
            for idx in field_range {
                let v = memory[idx];
                if has_address(v) {
                    let target = v.ptr_address().expect("has_address implies a pointer") / WORD_BYTES;
                    if !is_object_start(target) {
                        return Err(RuntimeError::Inconsistent(HeapCheckError::DanglingPointer {
                            at: idx,
                            target: target * WORD_BYTES,
                        }));
                    }
                } else if v.is_header() {
                    return Err(RuntimeError::Inconsistent(HeapCheckError::HeaderAsFieldContent(idx)));
                }
            }
            cursor += size;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn collecting_empty_heap_succeeds() {
        let mut heap = Heap::new(Config { heap_words: 256, ..Config::default() });
        heap.collect().unwrap();
    }

    #[test]
    fn live_pair_survives_collection() {
        let mut heap = Heap::new(Config { heap_words: 256, ..Config::default() });
        let pair = heap.alloc_pair(Word::small_int(1).unwrap(), Word::small_int(2).unwrap()).unwrap();
        let root = heap.push_root(pair);
        heap.collect().unwrap();
        let after = heap.root(root);
        assert!(after.is_ptr(suo_types::PtrTag::Pair));
        let addr = after.ptr_address().unwrap();
        assert_eq!(heap.read(addr, 0).as_small_int(), Some(1));
        assert_eq!(heap.read(addr, 1).as_small_int(), Some(2));
        heap.pop_root(root);
    }

    #[test]
    fn garbage_pair_does_not_survive_two_collections() {
        let mut heap = Heap::new(Config { heap_words: 256, ..Config::default() });
        let _garbage = heap.alloc_pair(Word::small_int(9).unwrap(), Word::small_int(9).unwrap()).unwrap();
        heap.collect().unwrap();
        // No root kept `_garbage` alive; a second collection must still
        // succeed (idempotence, no dangling-pointer panics) even though the
        // garbage is gone.
        heap.collect().unwrap();
        heap.check_consistency().unwrap();
    }

    #[test]
    fn record_round_trips_through_collection() {
        let mut heap = Heap::new(Config { heap_words: 256, ..Config::default() });
        let string_type = heap.well_known().string_type;
        let bytes = heap.alloc_bytes(b"hi").unwrap();
        let rec = heap.alloc_record(string_type, &[bytes]).unwrap();
        let root = heap.push_root(rec);
        heap.collect().unwrap();
        let after = heap.root(root);
        let addr = after.ptr_address().unwrap();
        let field0 = heap.read(addr, 1);
        assert!(field0.is_ptr(suo_types::PtrTag::Bytes));
        assert_eq!(heap.read_bytes(field0.ptr_address().unwrap()), b"hi");
        heap.pop_root(root);
    }

    #[test]
    fn interned_symbol_survives_collection_via_symbol_table_roots() {
        let mut heap = Heap::new(Config { heap_words: 512, ..Config::default() });
        let _sym = heap.intern("lambda").unwrap();
        heap.collect().unwrap();
        // The symbol table is a GC root on its own: re-interning the same
        // name after a collection must find the relocated record rather
        // than allocate a duplicate.
        let a = heap.intern("lambda").unwrap();
        let b = heap.intern("lambda").unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
