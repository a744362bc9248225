//! Bump-allocated byte arenas, reset once per batch cycle.
//!
//! Rentals are returned as [`ArenaSpan`] offsets. Growth moves the backing storage, so a span
//! stays valid across growth while a borrowed slice does not.

use fcs_core::{EngineError, PipelineConfig};

/// Offset handle into a [`NativeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaSpan {
    offset: usize,
    len: usize,
}

impl ArenaSpan {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug)]
pub struct NativeArena {
    name: &'static str,
    buf: Vec<u8>,
    used: usize,
    limit: usize,
    grow_count: u32,
}

impl NativeArena {
    pub fn new(name: &'static str, initial_capacity: usize, limit: usize) -> Self {
        Self {
            name,
            buf: vec![0; initial_capacity],
            used: 0,
            limit: limit.max(initial_capacity),
            grow_count: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of reallocations since construction.
    pub fn grow_count(&self) -> u32 {
        self.grow_count
    }

    /// Address of the backing storage. Only meaningful for identity comparisons.
    pub fn base_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }

    /// Reserves `n` bytes and returns their offset handle. Rented bytes are not cleared.
    pub fn rent(&mut self, n: usize) -> Result<ArenaSpan, EngineError> {
        self.ensure_capacity(n)?;
        let span = ArenaSpan {
            offset: self.used,
            len: n,
        };
        self.used += n;
        Ok(span)
    }

    /// Rents `bytes.len()` bytes and copies `bytes` into them.
    pub fn rent_copy(&mut self, bytes: &[u8]) -> Result<ArenaSpan, EngineError> {
        let span = self.rent(bytes.len())?;
        self.buf[span.offset..span.end()].copy_from_slice(bytes);
        Ok(span)
    }

    /// Makes room for `n` more bytes. Returns true when the storage moved.
    pub fn ensure_capacity(&mut self, n: usize) -> Result<bool, EngineError> {
        let needed = self.used.checked_add(n).ok_or(EngineError::Capacity {
            arena: self.name,
            requested: n,
            limit: self.limit,
        })?;
        if needed <= self.buf.len() {
            return Ok(false);
        }
        self.grow(n, needed)?;
        Ok(true)
    }

    fn grow(&mut self, n: usize, needed: usize) -> Result<(), EngineError> {
        let capacity_error = || EngineError::Capacity {
            arena: self.name,
            requested: n,
            limit: self.limit,
        };
        if needed > self.limit {
            return Err(capacity_error());
        }

        let cap = self.buf.len();
        let target = cap
            .saturating_mul(2)
            .max(cap.saturating_add(n))
            .min(self.limit)
            .max(needed);

        self.buf
            .try_reserve_exact(target - cap)
            .map_err(|_| capacity_error())?;
        self.buf.resize(target, 0);
        self.grow_count += 1;

        tracing::debug!(arena = self.name, from = cap, to = target, "arena grown");
        Ok(())
    }

    /// Rewinds to empty without releasing memory.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Bytes of a live span. `None` for spans past the current high-water mark.
    pub fn bytes(&self, span: ArenaSpan) -> Option<&[u8]> {
        if span.end() > self.used {
            return None;
        }
        Some(&self.buf[span.offset..span.end()])
    }

    pub fn bytes_mut(&mut self, span: ArenaSpan) -> Option<&mut [u8]> {
        if span.end() > self.used {
            return None;
        }
        Some(&mut self.buf[span.offset..span.end()])
    }

    /// Everything rented since the last reset.
    pub fn used_bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaKind {
    RawVertex,
    SortedVertex,
    RawIndex,
    SortedIndex,
}

impl ArenaKind {
    pub fn name(self) -> &'static str {
        match self {
            ArenaKind::RawVertex => "raw-vertex",
            ArenaKind::SortedVertex => "sorted-vertex",
            ArenaKind::RawIndex => "raw-index",
            ArenaKind::SortedIndex => "sorted-index",
        }
    }
}

/// The four arenas a render context lends to its driver.
#[derive(Debug)]
pub struct ArenaPool {
    pub raw_vertices: NativeArena,
    pub sorted_vertices: NativeArena,
    pub raw_indices: NativeArena,
    pub sorted_indices: NativeArena,
}

impl ArenaPool {
    pub fn new(config: &PipelineConfig) -> Self {
        let make = |kind: ArenaKind| {
            NativeArena::new(
                kind.name(),
                config.arena_initial_capacity,
                config.arena_max_capacity,
            )
        };
        Self {
            raw_vertices: make(ArenaKind::RawVertex),
            sorted_vertices: make(ArenaKind::SortedVertex),
            raw_indices: make(ArenaKind::RawIndex),
            sorted_indices: make(ArenaKind::SortedIndex),
        }
    }

    pub fn get(&self, kind: ArenaKind) -> &NativeArena {
        match kind {
            ArenaKind::RawVertex => &self.raw_vertices,
            ArenaKind::SortedVertex => &self.sorted_vertices,
            ArenaKind::RawIndex => &self.raw_indices,
            ArenaKind::SortedIndex => &self.sorted_indices,
        }
    }

    pub fn reset_all(&mut self) {
        self.raw_vertices.reset();
        self.sorted_vertices.reset();
        self.raw_indices.reset();
        self.sorted_indices.reset();
    }
}
