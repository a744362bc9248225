//! OpenGL Begin/Draw/End driver.
//!
//! Begin snapshots the host's GL state, End batches, draws and puts the snapshot back. Draws
//! either queue (every sort mode but `Immediate`) or execute on the spot.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fcs_core::{EngineError, PipelineConfig};
use fcs_runtime::arena::{ArenaPool, ArenaSpan};
use fcs_runtime::batch::{DrawCommand, GpuBatch, SortMode};
use fcs_runtime::driver::{BatchCycle, BeginParams, HostSurface, HostTexture, RenderDriver};
use fcs_runtime::layout::VertexLayout;
use fcs_runtime::packer::{pack_quad, QuadGeometry, QuadRequest};
use fcs_runtime::state::SamplerState;

use crate::device::{GlDevice, GlName};
use crate::material::{GlMaterial, GlTexture};
use crate::snapshot::{BindingFootprint, GlStateSnapshot};
use crate::state::{apply_blend, apply_depth_stencil, apply_rasterizer, attrib_format, create_sampler};

/// Vertices a vertexless draw issues when the caller gave no count.
const FULLSCREEN_VERTICES: u32 = 6;

/// Streamed vertex buffer plus the VAO describing it.
#[derive(Debug, Default)]
struct DynamicBuffer {
    vbo: Option<GlName>,
    vao: Option<GlName>,
    capacity: usize,
    configured: Option<VertexLayout>,
}

pub struct GlDriver<D, S> {
    gl: Rc<D>,
    surface: S,
    cycle: BatchCycle<GlTexture, GlMaterial>,
    saved: Option<GlStateSnapshot>,
    internal_fbo: Option<GlName>,
    empty_vao: Option<GlName>,
    dynamic: DynamicBuffer,
    slack: usize,
    samplers: Vec<(SamplerState, GlName)>,
    sampler: GlName,
    /// Texture the driver last bound to unit 0, `None` once something else may have touched it.
    unit0: Option<GlName>,
}

impl<D, S> fmt::Debug for GlDriver<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlDriver")
            .field("active", &self.cycle.is_active())
            .field("sort_mode", &self.cycle.sort_mode())
            .field("dynamic", &self.dynamic)
            .field("samplers", &self.samplers.len())
            .finish()
    }
}

impl<D, S> GlDriver<D, S>
where
    D: GlDevice,
    S: HostSurface<Texture = GlTexture>,
{
    pub fn new(gl: Rc<D>, surface: S, config: &PipelineConfig) -> Self {
        Self {
            gl,
            surface,
            cycle: BatchCycle::new(config.depth_epsilon_step),
            saved: None,
            internal_fbo: None,
            empty_vao: None,
            dynamic: DynamicBuffer::default(),
            slack: config.dynamic_buffer_slack,
            samplers: Vec::new(),
            sampler: 0,
            unit0: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.gl
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Capacity of the streamed vertex buffer in bytes, 0 when released.
    pub fn dynamic_capacity(&self) -> usize {
        self.dynamic.capacity
    }

    /// Destination size, else the host's current target, else the backbuffer.
    fn target_size(&self) -> (u32, u32) {
        if let Some(dest) = self.cycle.params().destination {
            return (dest.width, dest.height);
        }
        match self.surface.current_target() {
            Some(t) => (t.width, t.height),
            None => self.surface.backbuffer_size(),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Lazily created device objects
    // ---------------------------------------------------------------------------------------------

    fn internal_fbo(&mut self) -> Result<GlName, EngineError> {
        if let Some(fbo) = self.internal_fbo {
            return Ok(fbo);
        }
        let fbo = self
            .gl
            .create_framebuffer()
            .map_err(|e| EngineError::GlCreate(format!("framebuffer: {e}")))?;
        self.internal_fbo = Some(fbo);
        Ok(fbo)
    }

    fn empty_vao(&mut self) -> Result<GlName, EngineError> {
        if let Some(vao) = self.empty_vao {
            return Ok(vao);
        }
        let vao = self
            .gl
            .create_vertex_array()
            .map_err(|e| EngineError::GlCreate(format!("empty vertex array: {e}")))?;
        self.empty_vao = Some(vao);
        Ok(vao)
    }

    fn sampler_for(&mut self, state: SamplerState) -> Result<GlName, EngineError> {
        if let Some(&(_, s)) = self.samplers.iter().find(|(known, _)| *known == state) {
            return Ok(s);
        }
        let s = create_sampler(self.gl.as_ref(), &state)
            .map_err(|e| EngineError::GlCreate(format!("sampler: {e}")))?;
        self.samplers.push((state, s));
        Ok(s)
    }

    // ---------------------------------------------------------------------------------------------
    // Dynamic vertex buffer
    // ---------------------------------------------------------------------------------------------

    fn upload(&mut self, bytes: &[u8], layout: &VertexLayout) -> Result<(), EngineError> {
        let gl = Rc::clone(&self.gl);
        let vao = match self.dynamic.vao {
            Some(vao) => vao,
            None => {
                let vao = gl
                    .create_vertex_array()
                    .map_err(|e| EngineError::GlCreate(format!("vertex array: {e}")))?;
                self.dynamic.vao = Some(vao);
                vao
            }
        };
        let vbo = match self.dynamic.vbo {
            Some(vbo) => vbo,
            None => {
                let vbo = gl
                    .create_buffer()
                    .map_err(|e| EngineError::GlCreate(format!("vertex buffer: {e}")))?;
                self.dynamic.vbo = Some(vbo);
                self.dynamic.capacity = 0;
                self.dynamic.configured = None;
                vbo
            }
        };

        gl.bind_vertex_array(vao);
        gl.bind_buffer(glow::ARRAY_BUFFER, vbo);
        if bytes.len() > self.dynamic.capacity {
            let grown = (bytes.len() + self.slack).max(self.dynamic.capacity * 2);
            tracing::debug!(from = self.dynamic.capacity, to = grown, "dynamic vertex buffer grown");
            self.dynamic.capacity = grown;
        }
        // Re-specifying the store orphans whatever the previous frame still reads.
        gl.buffer_data_size(glow::ARRAY_BUFFER, self.dynamic.capacity, glow::STREAM_DRAW);
        gl.buffer_sub_data(glow::ARRAY_BUFFER, 0, bytes);

        if self.dynamic.configured.as_ref() != Some(layout) {
            configure_attributes(gl.as_ref(), layout);
            self.dynamic.configured = Some(layout.clone());
        }
        Ok(())
    }

    fn release_dynamic(&mut self) {
        if let Some(vbo) = self.dynamic.vbo.take() {
            self.gl.delete_buffer(vbo);
        }
        if let Some(vao) = self.dynamic.vao.take() {
            self.gl.delete_vertex_array(vao);
        }
        self.dynamic.capacity = 0;
        self.dynamic.configured = None;
    }

    // ---------------------------------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------------------------------

    fn apply_fixed_function(&mut self) -> Result<(), EngineError> {
        let params = self.cycle.params();
        let (blend, depth, raster, sampler) = (
            params.blend_or_default(),
            params.depth_stencil_or_default(),
            params.rasterizer_or_default(),
            params.sampler_or_default(),
        );
        let gl = self.gl.as_ref();
        apply_blend(gl, &blend);
        apply_depth_stencil(gl, &depth);
        apply_rasterizer(gl, &raster);
        self.sampler = self.sampler_for(sampler)?;
        self.unit0 = None;
        Ok(())
    }

    /// Runs the compute pass over `source` into the material's Shadow and returns the Shadow.
    fn dispatch(&mut self, material: &mut GlMaterial, program: GlName, source: &GlTexture) -> Result<GlName, EngineError> {
        let gl = self.gl.as_ref();
        gl.active_texture(glow::TEXTURE0);
        let shadow = material.ensure_shadow(gl, source.width, source.height, None)?;

        gl.use_program(program);
        material.bind_uniform_buffers(gl);
        gl.bind_texture(source.name);
        material.bind_auxiliary_textures(gl);
        gl.bind_image_texture(0, shadow, glow::WRITE_ONLY, glow::RGBA8);

        let [x, y, z] = material.dispatch_groups();
        gl.dispatch_compute(x, y, z);
        gl.memory_barrier(glow::TEXTURE_FETCH_BARRIER_BIT | glow::SHADER_IMAGE_ACCESS_BARRIER_BIT);
        gl.bind_image_texture(0, 0, glow::WRITE_ONLY, glow::RGBA8);
        self.unit0 = None;

        tracing::trace!(shadow, groups = ?[x, y, z], "compute dispatched");
        Ok(shadow)
    }

    /// Compute-only materials have no program to draw with: the Shadow is copied straight into
    /// the destination (or the host's current target).
    fn copy_shadow(&self, material: &GlMaterial, shadow: GlName) {
        let target = self
            .cycle
            .params()
            .destination
            .or_else(|| self.surface.current_target());
        let (Some(target), Some(extent)) = (target, material.shadow_extent()) else {
            tracing::warn!(key = material.key(), "compute result has no target to copy into; skipped");
            return;
        };
        self.gl.copy_image_sub_data(
            shadow,
            target.name,
            extent.width.min(target.width),
            extent.height.min(target.height),
        );
    }

    fn bind_target(&mut self) -> Result<(), EngineError> {
        let (w, h) = self.target_size();
        let destination = self.cycle.params().destination;
        match destination {
            Some(dest) => {
                let fbo = self.internal_fbo()?;
                self.gl.bind_framebuffer(fbo);
                self.gl.framebuffer_texture_2d(dest.name);
            }
            None => {
                let host = self.saved.as_ref().map_or(0, |s| s.framebuffer);
                self.gl.bind_framebuffer(host);
            }
        }
        self.gl.viewport(0, 0, w as i32, h as i32);
        Ok(())
    }

    /// One merged batch: optional compute pass, then either a draw or the Shadow copy.
    fn run_batch(&mut self, material: &mut GlMaterial, batch: &GpuBatch<GlTexture>) -> Result<(), EngineError> {
        let mut source = batch.source.name;
        if let Some(cs) = material.compute_program() {
            source = self.dispatch(material, cs, &batch.source)?;
        }

        let Some(program) = material.program() else {
            self.copy_shadow(material, source);
            return Ok(());
        };

        let gl = Rc::clone(&self.gl);
        gl.use_program(program);
        gl.active_texture(glow::TEXTURE0);
        if self.unit0 != Some(source) {
            gl.bind_texture(source);
            gl.bind_sampler(0, self.sampler);
            self.unit0 = Some(source);
        }
        material.bind_auxiliary_textures(gl.as_ref());
        material.bind_sampler_uniforms(gl.as_ref());
        material.bind_uniform_buffers(gl.as_ref());
        self.bind_target()?;

        if batch.vertexless {
            let count = if batch.vertex_count == 0 {
                FULLSCREEN_VERTICES
            } else {
                batch.vertex_count
            };
            gl.bind_vertex_array(self.empty_vao()?);
            gl.draw_arrays(glow::TRIANGLES, 0, count as i32);
        } else {
            let vao = self
                .dynamic
                .vao
                .ok_or_else(|| EngineError::state("vertex batch without an uploaded vertex buffer"))?;
            gl.bind_vertex_array(vao);
            gl.draw_arrays(glow::TRIANGLES, batch.start_vertex as i32, batch.vertex_count as i32);
        }
        Ok(())
    }

    fn execute_immediate(
        &mut self,
        arenas: &ArenaPool,
        material: &Rc<RefCell<GlMaterial>>,
        texture: &GlTexture,
        vertices: Option<ArenaSpan>,
        count: u32,
    ) -> Result<(), EngineError> {
        let mut mat = material.borrow_mut();
        mat.sync_to_device(self.gl.as_ref())?;

        if let (Some(span), Some(layout)) = (vertices, mat.layout()) {
            let n = count as usize * layout.stride();
            let bytes = arenas
                .raw_vertices
                .bytes(span)
                .filter(|b| b.len() >= n)
                .ok_or_else(|| EngineError::state(format!("span {span:?} does not hold {n} vertex bytes")))?;
            self.upload(&bytes[..n], layout)?;
        }
        if mat.program().is_some() {
            self.apply_fixed_function()?;
        }

        let batch = GpuBatch {
            texture_handle: texture.sort_handle(),
            source: *texture,
            start_vertex: 0,
            vertex_count: count,
            vertexless: vertices.is_none(),
        };
        self.run_batch(&mut mat, &batch)
    }

    /// Sort, compact, upload, then walk the batches.
    fn process(&mut self, arenas: &mut ArenaPool) -> Result<(), EngineError> {
        if self.cycle.commands().is_empty() {
            return Ok(());
        }
        let Some(material) = self.cycle.material().cloned() else {
            return Ok(());
        };
        let mut mat = material.borrow_mut();
        let graphics = mat.program().is_some();

        let stats = self.cycle.prepare(arenas, mat.stride(), graphics)?;
        match (stats.sorted, mat.layout()) {
            (Some(span), Some(layout)) => {
                let bytes = arenas
                    .sorted_vertices
                    .bytes(span)
                    .ok_or_else(|| EngineError::state("sorted vertex region is not live"))?;
                self.upload(bytes, layout)?;
            }
            _ => self.release_dynamic(),
        }

        mat.sync_to_device(self.gl.as_ref())?;
        if graphics {
            self.apply_fixed_function()?;
        }

        let batches = self.cycle.take_batches();
        for batch in &batches {
            self.run_batch(&mut mat, batch)?;
        }
        tracing::trace!(batches = batches.len(), bytes = stats.total_bytes, "gl batches drawn");
        Ok(())
    }
}

/// Points attribute `i` at element `i` of `layout` in the bound VAO.
fn configure_attributes<D: GlDevice + ?Sized>(gl: &D, layout: &VertexLayout) {
    let stride = layout.stride() as i32;
    for (index, e) in layout.elements().iter().enumerate() {
        let index = index as u32;
        let f = attrib_format(e.format);
        let components = e.format.component_count() as i32;
        gl.enable_vertex_attrib_array(index);
        if f.integer {
            gl.vertex_attrib_pointer_i32(index, components, f.data_type, stride, e.offset as i32);
        } else {
            gl.vertex_attrib_pointer_f32(index, components, f.data_type, f.normalized, stride, e.offset as i32);
        }
    }
}

impl<D, S> RenderDriver for GlDriver<D, S>
where
    D: GlDevice,
    S: HostSurface<Texture = GlTexture>,
{
    type Texture = GlTexture;
    type Material = GlMaterial;

    fn begin(
        &mut self,
        arenas: &mut ArenaPool,
        params: BeginParams<GlTexture>,
        material: Option<Rc<RefCell<GlMaterial>>>,
    ) -> Result<(), EngineError> {
        self.cycle.ensure_idle()?;
        let footprint = material
            .as_ref()
            .map_or_else(BindingFootprint::default, |m| m.borrow().binding_footprint());
        self.saved = Some(GlStateSnapshot::capture(self.gl.as_ref(), &footprint));
        tracing::trace!(sort_mode = ?params.sort_mode, "gl begin");
        self.cycle.start(arenas, params, material)
    }

    fn draw(
        &mut self,
        arenas: &mut ArenaPool,
        texture: &GlTexture,
        vertices: Option<ArenaSpan>,
        stride: usize,
        count: u32,
        depth: f32,
    ) -> Result<(), EngineError> {
        self.cycle.ensure_active("draw")?;
        let material = self
            .cycle
            .material()
            .cloned()
            .ok_or_else(|| EngineError::state("draw needs a material bound at begin"))?;

        let expected = material.borrow().stride();
        let vertices = if expected == 0 { None } else { vertices };
        if vertices.is_some() && stride != expected {
            return Err(EngineError::other(format!(
                "vertex stride {stride} does not match the material layout stride {expected}"
            )));
        }

        if self.cycle.sort_mode() == SortMode::Immediate {
            return self.execute_immediate(arenas, &material, texture, vertices, count);
        }
        self.cycle.record(DrawCommand {
            texture_handle: texture.sort_handle(),
            source: *texture,
            vertices,
            vertex_count: count,
            sort_depth: depth,
        });
        Ok(())
    }

    fn end(&mut self, arenas: &mut ArenaPool) -> Result<(), EngineError> {
        self.cycle.ensure_active("end")?;
        let mut guard = scopeguard::guard((self, arenas), |(driver, arenas)| {
            if let Some(saved) = driver.saved.take() {
                saved.restore(driver.gl.as_ref());
            }
            driver.cycle.finish(arenas);
        });

        let (driver, arenas) = &mut *guard;
        if driver.cycle.sort_mode() == SortMode::Immediate {
            return Ok(());
        }
        let result = driver.process(arenas);
        if let Err(e) = &result {
            tracing::error!(error = %e, "gl batch processing failed; host state restored");
        }
        result
    }

    fn create_vertex_data(
        &mut self,
        arenas: &mut ArenaPool,
        quad: &QuadRequest,
    ) -> Result<Option<ArenaSpan>, EngineError> {
        self.cycle.ensure_active("create_vertex_data")?;
        let writer = match self.cycle.material() {
            Some(m) => m.borrow().vertex_writer().cloned(),
            None => None,
        };
        let Some(writer) = writer else {
            return Ok(None);
        };

        let quad = QuadRequest {
            depth: self.cycle.biased_depth(quad.depth),
            ..*quad
        };
        let (w, h) = self.target_size();
        pack_quad(&mut arenas.raw_vertices, &writer, &QuadGeometry::new(quad, w, h)).map(Some)
    }

    fn vertex_stride(&self) -> usize {
        self.cycle.material().map_or(0, |m| m.borrow().stride())
    }

    fn is_active(&self) -> bool {
        self.cycle.is_active()
    }

    fn sort_mode(&self) -> SortMode {
        self.cycle.sort_mode()
    }

    fn dispose(&mut self) {
        if self.cycle.is_active() {
            tracing::warn!("gl driver disposed inside begin/end");
        }
        self.release_dynamic();
        if let Some(fbo) = self.internal_fbo.take() {
            self.gl.delete_framebuffer(fbo);
        }
        if let Some(vao) = self.empty_vao.take() {
            self.gl.delete_vertex_array(vao);
        }
        for (_, s) in self.samplers.drain(..) {
            self.gl.delete_sampler(s);
        }
        self.sampler = 0;
    }
}
