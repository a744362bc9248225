use fcs_runtime::batch::{compact_and_merge, sort_commands};
use fcs_runtime::{DrawCommand, GpuBatch, NativeArena, SortMode};

const STRIDE: usize = 4;

/// Records the same scene into fresh arenas and returns the batches plus the compacted bytes.
fn run(mode: SortMode) -> (Vec<GpuBatch<u64>>, Vec<u8>) {
    let mut raw = NativeArena::new("raw", 64, 1 << 16);
    let mut sorted = NativeArena::new("sorted", 64, 1 << 16);

    // (handle, depth); fill byte is the submission index.
    let scene = [(3, 0.5), (1, 0.5), (3, 0.25), (2, 0.75), (1, 0.5), (2, 0.25)];
    let mut commands: Vec<DrawCommand<u64>> = scene
        .iter()
        .enumerate()
        .map(|(i, &(handle, depth))| DrawCommand {
            texture_handle: handle,
            source: handle,
            vertices: Some(raw.rent_copy(&[i as u8; 6 * STRIDE]).expect("rent")),
            vertex_count: 6,
            sort_depth: depth,
        })
        .collect();

    sort_commands(&mut commands, mode);
    let mut batches = Vec::new();
    let stats = compact_and_merge(&commands, STRIDE, &raw, &mut sorted, true, &mut batches)
        .expect("compact");
    let bytes = stats
        .sorted
        .and_then(|s| sorted.bytes(s))
        .map(<[u8]>::to_vec)
        .unwrap_or_default();
    (batches, bytes)
}

fn submission_order(bytes: &[u8]) -> Vec<u8> {
    bytes.chunks_exact(6 * STRIDE).map(|q| q[0]).collect()
}

#[test]
fn batching_is_deterministic_across_runs() {
    for mode in [
        SortMode::Deferred,
        SortMode::Texture,
        SortMode::BackToFront,
        SortMode::FrontToBack,
    ] {
        let first = run(mode);
        for _ in 0..4 {
            assert_eq!(run(mode), first, "{mode:?} must produce identical batches");
        }
    }
}

#[test]
fn depth_sorts_break_ties_by_texture_then_submission() {
    let (_, back_to_front) = run(SortMode::BackToFront);
    assert_eq!(submission_order(&back_to_front), vec![3, 1, 4, 0, 5, 2]);

    let (_, front_to_back) = run(SortMode::FrontToBack);
    assert_eq!(submission_order(&front_to_back), vec![5, 2, 1, 4, 0, 3]);
}

#[test]
fn texture_sort_keeps_submission_order_within_a_texture() {
    let (batches, bytes) = run(SortMode::Texture);
    assert_eq!(submission_order(&bytes), vec![1, 4, 3, 5, 0, 2]);

    let runs: Vec<_> = batches
        .iter()
        .map(|b| (b.texture_handle, b.start_vertex, b.vertex_count))
        .collect();
    assert_eq!(runs, vec![(1, 0, 12), (2, 12, 12), (3, 24, 12)]);
}
