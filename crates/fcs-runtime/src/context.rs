//! Sprite-batch style facade over a [`RenderDriver`].
//!
//! The context owns the arenas and lends them to its driver on every call.

use std::cell::RefCell;
use std::rc::Rc;

use fcs_core::{EngineError, PipelineConfig};

use crate::arena::{ArenaPool, ArenaSpan};
use crate::batch::SortMode;
use crate::driver::{BeginParams, HostTexture, RenderDriver};
use crate::index::linear_indices;
use crate::packer::{QuadRequest, QUAD_VERTICES};

pub use crate::geometry::{Color, Rect, SpriteEffects, Vec2};

#[derive(Debug)]
pub struct RenderContext<D> {
    driver: D,
    arenas: ArenaPool,
}

impl<D: RenderDriver> RenderContext<D> {
    pub fn new(driver: D, config: &PipelineConfig) -> Self {
        Self {
            driver,
            arenas: ArenaPool::new(config),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn arenas(&self) -> &ArenaPool {
        &self.arenas
    }

    pub fn is_active(&self) -> bool {
        self.driver.is_active()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.driver.sort_mode()
    }

    pub fn begin(
        &mut self,
        params: BeginParams<D::Texture>,
        material: Option<Rc<RefCell<D::Material>>>,
    ) -> Result<(), EngineError> {
        self.driver.begin(&mut self.arenas, params, material)
    }

    pub fn end(&mut self) -> Result<(), EngineError> {
        self.driver.end(&mut self.arenas)
    }

    // ---------------------------------------------------------------------------------------------
    // Quads
    // ---------------------------------------------------------------------------------------------

    /// Whole texture at `position`, unscaled.
    pub fn draw_at(&mut self, texture: &D::Texture, position: Vec2, color: Color) -> Result<(), EngineError> {
        let (w, h) = texture_size(texture);
        let dest = Rect::new(position.x as i32, position.y as i32, w, h);
        self.draw_quad(texture, full_quad(texture, dest, color))
    }

    /// Whole texture stretched over `dest`.
    pub fn draw_rect(&mut self, texture: &D::Texture, dest: Rect, color: Color) -> Result<(), EngineError> {
        self.draw_quad(texture, full_quad(texture, dest, color))
    }

    /// `source` region of the texture stretched over `dest`.
    pub fn draw_region(
        &mut self,
        texture: &D::Texture,
        source: Rect,
        dest: Rect,
        color: Color,
    ) -> Result<(), EngineError> {
        let quad = QuadRequest {
            source,
            ..full_quad(texture, dest, color)
        };
        self.draw_quad(texture, quad)
    }

    /// `source` region at `position`, scaled uniformly, rotated about its center.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_scaled(
        &mut self,
        texture: &D::Texture,
        position: Vec2,
        source: Rect,
        scale: f32,
        rotation: f32,
        color: Color,
        effects: SpriteEffects,
        depth: f32,
    ) -> Result<(), EngineError> {
        let dest = Rect::new(
            position.x as i32,
            position.y as i32,
            (source.width as f32 * scale) as i32,
            (source.height as f32 * scale) as i32,
        );
        self.draw_transformed(texture, source, dest, rotation, color, effects, depth)
    }

    /// `source` region over `dest` with its size scaled, rotated about its center.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_region_scaled(
        &mut self,
        texture: &D::Texture,
        source: Rect,
        dest: Rect,
        scale: f32,
        rotation: f32,
        color: Color,
        effects: SpriteEffects,
        depth: f32,
    ) -> Result<(), EngineError> {
        let dest = Rect::new(
            dest.x,
            dest.y,
            (dest.width as f32 * scale) as i32,
            (dest.height as f32 * scale) as i32,
        );
        self.draw_transformed(texture, source, dest, rotation, color, effects, depth)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_transformed(
        &mut self,
        texture: &D::Texture,
        source: Rect,
        dest: Rect,
        rotation: f32,
        color: Color,
        effects: SpriteEffects,
        depth: f32,
    ) -> Result<(), EngineError> {
        let quad = QuadRequest {
            source,
            rotation,
            depth,
            flip_x: effects.contains(SpriteEffects::FLIP_HORIZONTALLY),
            flip_y: effects.contains(SpriteEffects::FLIP_VERTICALLY),
            ..full_quad(texture, dest, color)
        };
        self.draw_quad(texture, quad)
    }

    fn draw_quad(&mut self, texture: &D::Texture, quad: QuadRequest) -> Result<(), EngineError> {
        let span = self.driver.create_vertex_data(&mut self.arenas, &quad)?;
        let stride = if span.is_some() {
            self.driver.vertex_stride()
        } else {
            0
        };
        self.driver.draw(
            &mut self.arenas,
            texture,
            span,
            stride,
            QUAD_VERTICES as u32,
            quad.depth,
        )
    }

    // ---------------------------------------------------------------------------------------------
    // Raw vertices
    // ---------------------------------------------------------------------------------------------

    /// Caller-packed vertex bytes, copied into the raw arena. `None` or empty is vertexless.
    pub fn draw_vertices(
        &mut self,
        texture: &D::Texture,
        vertices: Option<&[u8]>,
        stride: usize,
        count: u32,
    ) -> Result<(), EngineError> {
        let span = self.copy_vertices(vertices)?;
        self.driver
            .draw(&mut self.arenas, texture, span, stride, count, 0.0)
    }

    /// Triangle-list user primitives.
    pub fn draw_user_primitives(
        &mut self,
        texture: &D::Texture,
        vertices: Option<&[u8]>,
        stride: usize,
        vertex_count: u32,
    ) -> Result<(), EngineError> {
        if let Some(bytes) = vertices.filter(|b| !b.is_empty()) {
            let needed = vertex_count as usize * stride;
            if bytes.len() < needed {
                return Err(EngineError::other(format!(
                    "user primitive holds {} bytes, {vertex_count} vertices need {needed}",
                    bytes.len()
                )));
            }
        }
        self.draw_vertices(texture, vertices, stride, vertex_count)
    }

    /// Indexed triangle list, expanded to a plain triangle list through the index arena.
    /// `indices == None` uses the linear table (vertices in order).
    pub fn draw_user_indexed_primitives(
        &mut self,
        texture: &D::Texture,
        vertices: &[u8],
        indices: Option<&[u16]>,
        stride: usize,
    ) -> Result<(), EngineError> {
        if stride == 0 || vertices.is_empty() {
            return self.draw_vertices(texture, None, stride, 0);
        }
        let vertex_count = vertices.len() / stride;
        let indices = match indices {
            Some(i) if !i.is_empty() => i,
            _ => &linear_indices()[..vertex_count.min(linear_indices().len())],
        };

        let index_span = self.arenas.raw_indices.rent_copy(bytemuck::cast_slice(indices))?;
        let out = self.arenas.raw_vertices.rent(indices.len() * stride)?;
        let index_bytes = self
            .arenas
            .raw_indices
            .bytes(index_span)
            .ok_or_else(|| EngineError::state("index span is not live"))?;
        let dest = self
            .arenas
            .raw_vertices
            .bytes_mut(out)
            .ok_or_else(|| EngineError::state("vertex span is not live"))?;

        for (slot, pair) in index_bytes.chunks_exact(2).enumerate() {
            let i = u16::from_ne_bytes([pair[0], pair[1]]) as usize;
            if i >= vertex_count {
                return Err(EngineError::other(format!(
                    "index {i} out of range for {vertex_count} vertices"
                )));
            }
            dest[slot * stride..(slot + 1) * stride]
                .copy_from_slice(&vertices[i * stride..(i + 1) * stride]);
        }

        self.driver.draw(
            &mut self.arenas,
            texture,
            Some(out),
            stride,
            indices.len() as u32,
            0.0,
        )
    }

    fn copy_vertices(&mut self, vertices: Option<&[u8]>) -> Result<Option<ArenaSpan>, EngineError> {
        match vertices {
            Some(bytes) if !bytes.is_empty() => self.arenas.raw_vertices.rent_copy(bytes).map(Some),
            _ => Ok(None),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // One-shot
    // ---------------------------------------------------------------------------------------------

    /// Begin, one draw, End. `end` runs even when the draw fails.
    pub fn apply(
        &mut self,
        material: Rc<RefCell<D::Material>>,
        source: &D::Texture,
        destination: Option<D::Texture>,
        vertices: Option<&[u8]>,
        stride: usize,
        count: u32,
    ) -> Result<(), EngineError> {
        let params = BeginParams {
            destination,
            ..BeginParams::default()
        };
        self.begin(params, Some(material))?;
        let drawn = self.draw_vertices(source, vertices, stride, count);
        let ended = self.end();
        drawn.and(ended)
    }

    pub fn dispose(&mut self) {
        self.driver.dispose();
    }
}

fn texture_size<T: HostTexture>(texture: &T) -> (i32, i32) {
    (texture.width() as i32, texture.height() as i32)
}

fn full_quad<T: HostTexture>(texture: &T, dest: Rect, color: Color) -> QuadRequest {
    let (w, h) = texture_size(texture);
    QuadRequest {
        source: Rect::new(0, 0, w, h),
        dest,
        texture_width: texture.width(),
        texture_height: texture.height(),
        rotation: 0.0,
        depth: 0.0,
        color: color.packed(),
        flip_x: false,
        flip_y: false,
    }
}
