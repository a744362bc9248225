//! Quad-to-vertex packing specialized per vertex layout.
//!
//! A [`VertexWriter`] resolves, once per layout, how every attribute is encoded. Writing a quad
//! then only walks that table: no semantic string matching happens per draw.

use std::collections::HashMap;
use std::rc::Rc;

use fcs_core::EngineError;

use crate::arena::{ArenaSpan, NativeArena};
use crate::geometry::Rect;
use crate::layout::{VertexElementFormat, VertexLayout};

/// Vertices emitted per quad (two triangles).
pub const QUAD_VERTICES: usize = 6;

const ROTATION_EPSILON: f32 = 0.001;

// Corner index per emitted vertex: [TL, TR, BL, BL, TR, BR].
const CORNER_OF_VERTEX: [usize; QUAD_VERTICES] = [0, 1, 2, 2, 1, 3];
const U_MAP: [usize; QUAD_VERTICES] = [0, 1, 0, 0, 1, 1];
const V_MAP: [usize; QUAD_VERTICES] = [0, 0, 1, 1, 0, 1];

/// One textured quad as requested by a caller. The driver supplies the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadRequest {
    pub source: Rect,
    pub dest: Rect,
    pub texture_width: u32,
    pub texture_height: u32,
    /// Radians, clockwise in screen space.
    pub rotation: f32,
    pub depth: f32,
    /// Packed RGBA (see [`crate::geometry::Color::packed`]).
    pub color: u32,
    pub flip_x: bool,
    pub flip_y: bool,
}

/// A [`QuadRequest`] resolved against a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    pub quad: QuadRequest,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl QuadGeometry {
    pub fn new(quad: QuadRequest, viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            quad,
            viewport_width,
            viewport_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// `(ndc_x, ndc_y, depth, 1)`, first `n` components.
    Position(usize),
    /// `(u, v, 0, 1)`, first `n` components.
    TexCoord(usize),
    /// Raw packed `u32`.
    PackedColor,
    /// Four floats in `0..=1`, red from the low byte.
    UnpackedColor,
    /// `(0, 0, 0, 1)`, first `n` components.
    Constant(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttributeWriter {
    offset: usize,
    encoding: Encoding,
}

/// Per-layout packing table.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexWriter {
    stride: usize,
    attributes: Vec<AttributeWriter>,
}

impl VertexWriter {
    /// Resolves the encoding table. Fails on formats the packer cannot encode.
    pub fn new(layout: &VertexLayout) -> Result<Self, EngineError> {
        let mut attributes = Vec::with_capacity(layout.elements().len());
        for e in layout.elements() {
            let semantic = e.semantic.to_ascii_uppercase();
            let unsupported = || EngineError::UnsupportedFormat {
                semantic: format!("{}{}", e.semantic, e.semantic_index),
                format: e.format.to_string(),
            };

            let encoding = if semantic.contains("COLOR") {
                match e.format {
                    VertexElementFormat::Color | VertexElementFormat::UInt => Encoding::PackedColor,
                    VertexElementFormat::Float4 => Encoding::UnpackedColor,
                    _ => return Err(unsupported()),
                }
            } else {
                let n = e.format.float_components().ok_or_else(unsupported)?;
                if semantic.contains("POSITION") {
                    Encoding::Position(n)
                } else if semantic.contains("TEXCOORD") {
                    Encoding::TexCoord(n)
                } else {
                    Encoding::Constant(n)
                }
            };
            attributes.push(AttributeWriter {
                offset: e.offset,
                encoding,
            });
        }

        Ok(Self {
            stride: layout.stride(),
            attributes,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes one quad occupies.
    pub fn quad_bytes(&self) -> usize {
        self.stride * QUAD_VERTICES
    }

    /// Writes six vertices into `dest[..6 * stride]`.
    pub fn write(&self, dest: &mut [u8], geometry: &QuadGeometry) -> Result<(), EngineError> {
        if dest.len() < self.quad_bytes() {
            return Err(EngineError::other(format!(
                "vertex destination holds {} bytes, quad needs {}",
                dest.len(),
                self.quad_bytes()
            )));
        }
        if self.stride == 0 {
            return Ok(());
        }

        let q = &geometry.quad;
        let (us, vs) = uv_bounds(q);
        let corners = ndc_corners(geometry);
        let color = [
            (q.color & 0xFF) as f32 / 255.0,
            (q.color >> 8 & 0xFF) as f32 / 255.0,
            (q.color >> 16 & 0xFF) as f32 / 255.0,
            (q.color >> 24 & 0xFF) as f32 / 255.0,
        ];

        for (i, vertex) in dest
            .chunks_exact_mut(self.stride)
            .take(QUAD_VERTICES)
            .enumerate()
        {
            let [x, y] = corners[CORNER_OF_VERTEX[i]];
            let (u, v) = (us[U_MAP[i]], vs[V_MAP[i]]);

            for attr in &self.attributes {
                let out = &mut vertex[attr.offset..];
                match attr.encoding {
                    Encoding::Position(n) => put_floats(out, &[x, y, q.depth, 1.0][..n]),
                    Encoding::TexCoord(n) => put_floats(out, &[u, v, 0.0, 1.0][..n]),
                    Encoding::PackedColor => out[..4].copy_from_slice(bytemuck::bytes_of(&q.color)),
                    Encoding::UnpackedColor => put_floats(out, &color),
                    Encoding::Constant(n) => put_floats(out, &[0.0, 0.0, 0.0, 1.0][..n]),
                }
            }
        }
        Ok(())
    }
}

fn put_floats(out: &mut [u8], values: &[f32]) {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    out[..bytes.len()].copy_from_slice(bytes);
}

/// `([u_min, u_max], [v_min, v_max])`, swapped on flipped axes.
fn uv_bounds(q: &QuadRequest) -> ([f32; 2], [f32; 2]) {
    let tw = q.texture_width.max(1) as f32;
    let th = q.texture_height.max(1) as f32;
    let mut us = [q.source.left() as f32 / tw, q.source.right() as f32 / tw];
    let mut vs = [q.source.top() as f32 / th, q.source.bottom() as f32 / th];
    if q.flip_x {
        us.swap(0, 1);
    }
    if q.flip_y {
        vs.swap(0, 1);
    }
    (us, vs)
}

/// `[TL, TR, BL, BR]` in normalized device coordinates.
fn ndc_corners(g: &QuadGeometry) -> [[f32; 2]; 4] {
    let q = &g.quad;
    let vw = g.viewport_width.max(1) as f32;
    let vh = g.viewport_height.max(1) as f32;
    let ndc = |px: f32, py: f32| [2.0 * px / vw - 1.0, 1.0 - 2.0 * py / vh];

    let (l, t) = (q.dest.left() as f32, q.dest.top() as f32);
    let (r, b) = (q.dest.right() as f32, q.dest.bottom() as f32);

    if q.rotation.abs() < ROTATION_EPSILON {
        return [ndc(l, t), ndc(r, t), ndc(l, b), ndc(r, b)];
    }

    let (hw, hh) = (q.dest.width as f32 * 0.5, q.dest.height as f32 * 0.5);
    let (cx, cy) = (l + hw, t + hh);
    let (sin, cos) = q.rotation.sin_cos();
    let (dx, dy) = (hw * cos, hw * sin);
    let (ux, uy) = (-hh * sin, hh * cos);
    [
        ndc(cx - dx - ux, cy - dy - uy),
        ndc(cx + dx - ux, cy + dy - uy),
        ndc(cx - dx + ux, cy - dy + uy),
        ndc(cx + dx + ux, cy + dy + uy),
    ]
}

/// Writers keyed by layout, so effects sharing a layout share the table.
#[derive(Debug, Default)]
pub struct WriterCache {
    writers: HashMap<VertexLayout, Rc<VertexWriter>>,
}

impl WriterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, layout: &VertexLayout) -> Result<Rc<VertexWriter>, EngineError> {
        if let Some(w) = self.writers.get(layout) {
            return Ok(Rc::clone(w));
        }
        let writer = Rc::new(VertexWriter::new(layout)?);
        self.writers.insert(layout.clone(), Rc::clone(&writer));
        Ok(writer)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

/// Per-quad depth bias. Each packed quad sorts slightly in front of the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    epsilon: f32,
    step: f32,
}

impl DepthBias {
    pub fn new(step: f32) -> Self {
        Self { epsilon: 0.0, step }
    }

    /// Returns `depth - epsilon` and advances epsilon.
    pub fn apply(&mut self, depth: f32) -> f32 {
        let adjusted = depth - self.epsilon;
        self.epsilon += self.step;
        adjusted
    }

    pub fn reset(&mut self) {
        self.epsilon = 0.0;
    }
}

/// Rents six vertices from `arena` and packs `geometry` into them.
pub fn pack_quad(
    arena: &mut NativeArena,
    writer: &VertexWriter,
    geometry: &QuadGeometry,
) -> Result<ArenaSpan, EngineError> {
    let span = arena.rent(writer.quad_bytes())?;
    let dest = arena
        .bytes_mut(span)
        .ok_or_else(|| EngineError::state("freshly rented span is not live"))?;
    writer.write(dest, geometry)?;
    Ok(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_f32s(bytes: &[u8], offset: usize, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let at = offset + i * 4;
                f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
            })
            .collect()
    }

    fn pos_uv_layout() -> VertexLayout {
        let mut l = VertexLayout::new();
        l.push_auto("POSITION", 0, VertexElementFormat::Float4)
            .expect("position");
        l.push_auto("TEXCOORD", 0, VertexElementFormat::Float2)
            .expect("texcoord");
        l
    }

    fn quad(dest: Rect) -> QuadRequest {
        QuadRequest {
            source: Rect::new(0, 0, 64, 64),
            dest,
            texture_width: 64,
            texture_height: 64,
            rotation: 0.0,
            depth: 0.5,
            color: 0xFFFF_FFFF,
            flip_x: false,
            flip_y: false,
        }
    }

    fn pack(writer: &VertexWriter, g: &QuadGeometry) -> Vec<u8> {
        let mut buf = vec![0u8; writer.quad_bytes()];
        writer.write(&mut buf, g).expect("write quad");
        buf
    }

    fn corner(buf: &[u8], stride: usize, vertex: usize) -> (Vec<f32>, Vec<f32>) {
        (
            read_f32s(buf, vertex * stride, 4),
            read_f32s(buf, vertex * stride + 16, 2),
        )
    }

    #[test]
    fn axis_aligned_quad_maps_to_ndc_and_uv() {
        let writer = VertexWriter::new(&pos_uv_layout()).expect("writer");
        assert_eq!(writer.stride(), 24);
        let g = QuadGeometry::new(quad(Rect::new(0, 0, 100, 50)), 200, 100);
        let buf = pack(&writer, &g);

        // [TL, TR, BL, BL, TR, BR]
        let expected = [
            ([-1.0, 1.0], [0.0, 0.0]),
            ([0.0, 1.0], [1.0, 0.0]),
            ([-1.0, 0.0], [0.0, 1.0]),
            ([-1.0, 0.0], [0.0, 1.0]),
            ([0.0, 1.0], [1.0, 0.0]),
            ([0.0, 0.0], [1.0, 1.0]),
        ];
        for (i, (xy, uv)) in expected.iter().enumerate() {
            let (pos, tex) = corner(&buf, 24, i);
            assert_eq!(&pos[..2], xy, "vertex {i} position");
            assert_eq!(pos[2], 0.5, "vertex {i} depth");
            assert_eq!(pos[3], 1.0, "vertex {i} w");
            assert_eq!(&tex[..], uv, "vertex {i} uv");
        }
    }

    #[test]
    fn flip_x_swaps_u_only() {
        let writer = VertexWriter::new(&pos_uv_layout()).expect("writer");
        let plain = pack(&writer, &QuadGeometry::new(quad(Rect::new(0, 0, 100, 50)), 200, 100));
        let mut q = quad(Rect::new(0, 0, 100, 50));
        q.flip_x = true;
        let flipped = pack(&writer, &QuadGeometry::new(q, 200, 100));

        for i in 0..QUAD_VERTICES {
            let (p0, t0) = corner(&plain, 24, i);
            let (p1, t1) = corner(&flipped, 24, i);
            assert_eq!(p0, p1, "positions unchanged at vertex {i}");
            assert_eq!(t1[0], 1.0 - t0[0], "u mirrored at vertex {i}");
            assert_eq!(t1[1], t0[1], "v unchanged at vertex {i}");
        }
    }

    #[test]
    fn rotated_quad_keeps_center_and_extent() {
        let writer = VertexWriter::new(&pos_uv_layout()).expect("writer");
        let mut q = quad(Rect::new(50, 25, 100, 50));
        q.rotation = std::f32::consts::FRAC_PI_2;
        let buf = pack(&writer, &QuadGeometry::new(q, 200, 100));

        // Rotating 90 degrees about (100, 50) maps TL to (125, 0) in pixels.
        let (tl, _) = corner(&buf, 24, 0);
        assert!((tl[0] - 0.25).abs() < 1e-5, "tl.x = {}", tl[0]);
        assert!((tl[1] - 1.0).abs() < 1e-5, "tl.y = {}", tl[1]);

        // TL and BR stay symmetric about the center (0, 0 in NDC).
        let (br, _) = corner(&buf, 24, 5);
        assert!((tl[0] + br[0]).abs() < 1e-5);
        assert!((tl[1] + br[1]).abs() < 1e-5);
    }

    #[test]
    fn color_encodings() {
        let mut packed = VertexLayout::new();
        packed
            .push_auto("COLOR", 0, VertexElementFormat::Color)
            .expect("color");
        let mut unpacked = VertexLayout::new();
        unpacked
            .push_auto("Color", 0, VertexElementFormat::Float4)
            .expect("color");

        let mut q = quad(Rect::new(0, 0, 10, 10));
        q.color = 0x80FF_0033;
        let g = QuadGeometry::new(q, 10, 10);

        let buf = pack(&VertexWriter::new(&packed).expect("packed writer"), &g);
        assert_eq!(&buf[..4], &0x80FF_0033u32.to_ne_bytes());

        let buf = pack(&VertexWriter::new(&unpacked).expect("float writer"), &g);
        let c = read_f32s(&buf, 0, 4);
        assert_eq!(c[0], 0x33 as f32 / 255.0);
        assert_eq!(c[1], 0.0);
        assert_eq!(c[2], 1.0);
        assert_eq!(c[3], 0x80 as f32 / 255.0);
    }

    #[test]
    fn unknown_semantic_writes_constant() {
        let mut l = VertexLayout::new();
        l.push_auto("NORMAL", 0, VertexElementFormat::Float4)
            .expect("normal");
        let buf = pack(
            &VertexWriter::new(&l).expect("writer"),
            &QuadGeometry::new(quad(Rect::new(0, 0, 1, 1)), 1, 1),
        );
        assert_eq!(read_f32s(&buf, 0, 4), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unsupported_formats_fail_at_generation() {
        let mut l = VertexLayout::new();
        l.push_auto("TEXCOORD", 0, VertexElementFormat::Short2)
            .expect("push");
        let err = VertexWriter::new(&l).expect_err("short2 is not packable");
        assert!(matches!(err, EngineError::UnsupportedFormat { .. }), "got {err:?}");

        let mut l = VertexLayout::new();
        l.push_auto("COLOR", 0, VertexElementFormat::Float3)
            .expect("push");
        assert!(VertexWriter::new(&l).is_err(), "float3 color is not packable");
    }

    #[test]
    fn short_destination_is_rejected() {
        let writer = VertexWriter::new(&pos_uv_layout()).expect("writer");
        let mut buf = vec![0u8; 10];
        let g = QuadGeometry::new(quad(Rect::new(0, 0, 1, 1)), 1, 1);
        assert!(writer.write(&mut buf, &g).is_err());
    }

    #[test]
    fn cache_shares_writers_by_layout() {
        let mut cache = WriterCache::new();
        let a = cache.get_or_create(&pos_uv_layout()).expect("first");
        let b = cache.get_or_create(&pos_uv_layout()).expect("second");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn depth_bias_accumulates_until_reset() {
        let mut bias = DepthBias::new(0.25);
        assert_eq!(bias.apply(1.0), 1.0);
        assert_eq!(bias.apply(1.0), 0.75);
        assert_eq!(bias.apply(1.0), 0.5);
        bias.reset();
        assert_eq!(bias.apply(1.0), 1.0);
    }

    #[test]
    fn pack_quad_rents_six_vertices() {
        let writer = VertexWriter::new(&pos_uv_layout()).expect("writer");
        let mut arena = NativeArena::new("test", 64, 4096);
        let g = QuadGeometry::new(quad(Rect::new(0, 0, 10, 10)), 10, 10);
        let s1 = pack_quad(&mut arena, &writer, &g).expect("first quad");
        let s2 = pack_quad(&mut arena, &writer, &g).expect("second quad");
        assert_eq!(s1.len(), 144);
        assert_eq!(s2.offset(), 144);
        assert_eq!(arena.used(), 288);
    }
}
