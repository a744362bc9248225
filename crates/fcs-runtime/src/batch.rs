//! Backend-agnostic batching: sort, compact, merge.
//!
//! Upload and draw stay in the drivers; everything before that is shared.

use fcs_core::EngineError;

use crate::arena::{ArenaSpan, NativeArena};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    /// Submission order, drawn at End.
    #[default]
    Deferred,
    /// Drawn as soon as it is submitted.
    Immediate,
    /// Ascending texture handle.
    Texture,
    /// Descending depth, then texture handle.
    BackToFront,
    /// Ascending depth, then texture handle.
    FrontToBack,
}

/// One recorded draw. `T` is the backend's texture reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand<T> {
    pub texture_handle: u64,
    pub source: T,
    /// Raw-arena bytes; `None` for vertexless draws.
    pub vertices: Option<ArenaSpan>,
    pub vertex_count: u32,
    pub sort_depth: f32,
}

impl<T> DrawCommand<T> {
    pub fn is_vertexless(&self) -> bool {
        self.vertices.is_none()
    }
}

/// A run of adjacent commands sharing texture and vertex kind.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuBatch<T> {
    pub texture_handle: u64,
    pub source: T,
    pub start_vertex: u32,
    pub vertex_count: u32,
    pub vertexless: bool,
}

/// Stable sort per `mode`. Deferred and Immediate keep submission order.
pub fn sort_commands<T>(commands: &mut [DrawCommand<T>], mode: SortMode) {
    let by_handle = |a: &DrawCommand<T>, b: &DrawCommand<T>| a.texture_handle.cmp(&b.texture_handle);
    match mode {
        SortMode::Deferred | SortMode::Immediate => {}
        SortMode::Texture => commands.sort_by(by_handle),
        SortMode::BackToFront => commands.sort_by(|a, b| {
            b.sort_depth
                .total_cmp(&a.sort_depth)
                .then_with(|| by_handle(a, b))
        }),
        SortMode::FrontToBack => commands.sort_by(|a, b| {
            a.sort_depth
                .total_cmp(&b.sort_depth)
                .then_with(|| by_handle(a, b))
        }),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactStats {
    /// Vertices that carry bytes in the sorted arena.
    pub total_vertices: u32,
    pub total_bytes: usize,
    /// The contiguous sorted-arena region to upload, when any bytes were copied.
    pub sorted: Option<ArenaSpan>,
}

/// Copies vertex bytes into `sorted` in command order and merges adjacent commands into
/// `batches` (cleared first). With `copy_vertices == false` only the merge runs.
pub fn compact_and_merge<T: Clone>(
    commands: &[DrawCommand<T>],
    stride: usize,
    raw: &NativeArena,
    sorted: &mut NativeArena,
    copy_vertices: bool,
    batches: &mut Vec<GpuBatch<T>>,
) -> Result<CompactStats, EngineError> {
    batches.clear();
    let mut stats = CompactStats::default();
    if commands.is_empty() {
        return Ok(stats);
    }

    if copy_vertices {
        let total: usize = commands
            .iter()
            .filter(|c| !c.is_vertexless())
            .map(|c| c.vertex_count as usize * stride)
            .sum();
        if total > 0 {
            let region = sorted.rent(total)?;
            let dest = sorted
                .bytes_mut(region)
                .ok_or_else(|| EngineError::state("sorted arena region is not live"))?;

            let mut cursor = 0;
            for c in commands {
                let Some(span) = c.vertices else { continue };
                let n = c.vertex_count as usize * stride;
                let src = raw
                    .bytes(span)
                    .filter(|b| b.len() >= n)
                    .ok_or_else(|| {
                        EngineError::state(format!(
                            "draw command span {span:?} does not hold {n} vertex bytes"
                        ))
                    })?;
                dest[cursor..cursor + n].copy_from_slice(&src[..n]);
                cursor += n;
            }
            stats.total_bytes = total;
            stats.sorted = Some(region);
        }
    }

    let mut current: Option<GpuBatch<T>> = None;
    for c in commands {
        let vertexless = c.is_vertexless();
        match current.as_mut() {
            Some(b) if b.texture_handle == c.texture_handle && b.vertexless == vertexless => {
                b.vertex_count += c.vertex_count;
            }
            _ => {
                if let Some(done) = current.take() {
                    batches.push(done);
                }
                current = Some(GpuBatch {
                    texture_handle: c.texture_handle,
                    source: c.source.clone(),
                    start_vertex: stats.total_vertices,
                    vertex_count: c.vertex_count,
                    vertexless,
                });
            }
        }
        if !vertexless {
            stats.total_vertices += c.vertex_count;
        }
    }
    if let Some(done) = current {
        batches.push(done);
    }

    Ok(stats)
}
