//! Shared linear index table.

use std::sync::OnceLock;

/// Number of entries in the table (the full `u16` range).
pub const LINEAR_INDEX_COUNT: usize = u16::MAX as usize + 1;

/// `0, 1, 2, ..., 65535`, built once.
pub fn linear_indices() -> &'static [u16] {
    static TABLE: OnceLock<Vec<u16>> = OnceLock::new();
    TABLE.get_or_init(|| (0..=u16::MAX).collect())
}

/// [`linear_indices`] viewed as bytes, ready for an index buffer upload.
pub fn linear_index_bytes() -> &'static [u8] {
    bytemuck::cast_slice(linear_indices())
}
