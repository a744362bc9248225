//! Direct3D 11 Begin/Draw/End driver.
//!
//! Begin snapshots the immediate context, End batches, draws and puts the snapshot back before
//! flushing. Draws either queue (every sort mode but `Immediate`) or execute on the spot.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fcs_core::{EngineError, PipelineConfig};
use fcs_runtime::arena::{ArenaPool, ArenaSpan};
use fcs_runtime::batch::{DrawCommand, GpuBatch, SortMode};
use fcs_runtime::driver::{BatchCycle, BeginParams, HostSurface, HostTexture, RenderDriver};
use fcs_runtime::packer::{pack_quad, QuadGeometry, QuadRequest};

use crate::desc::{
    BindFlags, BlendBinding, BufferDesc, DepthStencilBinding, Handle, PrimitiveTopology, RenderTargetBinding, Stage,
    Usage, VertexBufferBinding, Viewport,
};
use crate::device::D3D11Device;
use crate::material::{D3D11Material, D3D11Texture, ShadowBuffer};
use crate::snapshot::D3D11StateSnapshot;
use crate::state::StateObjects;

/// Vertices a vertexless draw issues when the caller gave no count.
const FULLSCREEN_VERTICES: u32 = 6;

/// Streamed `Usage::Dynamic` vertex buffer.
#[derive(Debug, Default)]
struct DynamicBuffer {
    buffer: Option<Handle>,
    capacity: usize,
}

pub struct D3D11Driver<D, S> {
    device: Rc<D>,
    surface: S,
    cycle: BatchCycle<D3D11Texture, D3D11Material>,
    saved: Option<D3D11StateSnapshot>,
    captured_slots: u32,
    states: StateObjects,
    dynamic: DynamicBuffer,
    slack: usize,
    /// Render target views created for destinations that came without one, by resource.
    targets: Vec<(Handle, Handle)>,
    /// View the driver last bound to `t0` of the pixel stage, `None` once it may have changed.
    bound_view: Option<Handle>,
}

impl<D, S> fmt::Debug for D3D11Driver<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3D11Driver")
            .field("active", &self.cycle.is_active())
            .field("sort_mode", &self.cycle.sort_mode())
            .field("dynamic", &self.dynamic)
            .field("state_objects", &self.states.len())
            .finish()
    }
}

impl<D, S> D3D11Driver<D, S>
where
    D: D3D11Device,
    S: HostSurface<Texture = D3D11Texture>,
{
    pub fn new(device: Rc<D>, surface: S, config: &PipelineConfig) -> Self {
        Self {
            device,
            surface,
            cycle: BatchCycle::new(config.depth_epsilon_step),
            saved: None,
            captured_slots: config.captured_slots,
            states: StateObjects::default(),
            dynamic: DynamicBuffer::default(),
            slack: config.dynamic_buffer_slack,
            targets: Vec::new(),
            bound_view: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
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

    fn target_view(&mut self, texture: &D3D11Texture) -> Result<Handle, EngineError> {
        if let Some(rtv) = texture.target {
            return Ok(rtv);
        }
        if let Some(&(_, rtv)) = self.targets.iter().find(|(res, _)| *res == texture.resource) {
            return Ok(rtv);
        }
        let rtv = self
            .device
            .create_render_target_view(texture.resource)
            .map_err(|e| EngineError::DeviceCreate(format!("render target view: {e}")))?;
        self.targets.push((texture.resource, rtv));
        Ok(rtv)
    }

    // ---------------------------------------------------------------------------------------------
    // Dynamic vertex buffer
    // ---------------------------------------------------------------------------------------------

    fn upload(&mut self, bytes: &[u8]) -> Result<Handle, EngineError> {
        let buffer = match self.dynamic.buffer {
            Some(b) if bytes.len() <= self.dynamic.capacity => b,
            current => {
                let grown = (bytes.len() + self.slack).max(self.dynamic.capacity * 2);
                if let Some(old) = current {
                    self.device.release(old);
                }
                self.dynamic = DynamicBuffer::default();
                let b = self
                    .device
                    .create_buffer(&BufferDesc {
                        byte_width: grown as u32,
                        usage: Usage::Dynamic,
                        bind: BindFlags::VERTEX_BUFFER,
                        cpu_write: true,
                    })
                    .map_err(|e| EngineError::DeviceCreate(format!("vertex buffer: {e}")))?;
                tracing::debug!(to = grown, "dynamic vertex buffer grown");
                self.dynamic = DynamicBuffer {
                    buffer: Some(b),
                    capacity: grown,
                };
                b
            }
        };
        self.device
            .write_discard(buffer, bytes)
            .map_err(|e| EngineError::other(format!("vertex upload: {e}")))?;
        Ok(buffer)
    }

    fn release_dynamic(&mut self) {
        if let Some(b) = self.dynamic.buffer.take() {
            self.device.release(b);
        }
        self.dynamic.capacity = 0;
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
        let device = self.device.as_ref();
        let created = |e: String| EngineError::DeviceCreate(format!("state object: {e}"));

        let blend_state = self.states.blend(device, &blend).map_err(created)?;
        let depth_state = self.states.depth_stencil(device, &depth).map_err(created)?;
        let raster_state = self.states.rasterizer(device, &raster).map_err(created)?;
        let sampler_state = self.states.sampler(device, &sampler).map_err(created)?;

        device.set_blend_state(&BlendBinding {
            state: Some(blend_state),
            factor: blend.blend_factor.to_vec4(),
            sample_mask: u32::MAX,
        });
        device.set_depth_stencil_state(&DepthStencilBinding {
            state: Some(depth_state),
            stencil_ref: depth.reference_stencil as u32,
        });
        device.set_rasterizer_state(Some(raster_state));
        device.set_samplers(Stage::Pixel, 0, &[Some(sampler_state)]);
        self.bound_view = None;
        Ok(())
    }

    /// Runs the compute pass over `source` into the material's Shadow and returns the Shadow.
    fn dispatch(
        &mut self,
        material: &mut D3D11Material,
        shader: Handle,
        source: &D3D11Texture,
    ) -> Result<ShadowBuffer, EngineError> {
        let device = self.device.as_ref();
        let view = source
            .view
            .ok_or_else(|| EngineError::other("compute source has no shader resource view"))?;
        let shadow = material.ensure_shadow(device, source.width, source.height)?;

        let mut views = vec![Some(view)];
        views.extend(material.auxiliary_views());

        device.set_shader(Stage::Compute, Some(shader));
        device.set_constant_buffers(Stage::Compute, 0, &material.constant_buffer_bindings());
        device.set_shader_resources(Stage::Compute, 0, &views);
        device.cs_set_unordered_access_view(0, Some(shadow.uav));

        let [x, y, z] = material.dispatch_groups();
        device.dispatch(x, y, z);

        // The Shadow is read as an SRV next; it must not stay bound for writing.
        device.cs_set_unordered_access_view(0, None);
        device.set_shader_resources(Stage::Compute, 0, &vec![None; views.len()]);
        device.set_shader(Stage::Compute, None);

        tracing::trace!(shadow = ?shadow.texture, groups = ?[x, y, z], "compute dispatched");
        Ok(shadow)
    }

    /// Compute-only materials have nothing to draw with: the Shadow is copied straight into the
    /// destination (or the host's current target). `CopyResource` needs identical sizes.
    fn copy_shadow(&self, material: &D3D11Material, shadow: &ShadowBuffer) {
        let target = self
            .cycle
            .params()
            .destination
            .or_else(|| self.surface.current_target());
        let (Some(target), Some(extent)) = (target, material.shadow_extent()) else {
            tracing::warn!(key = material.key(), "compute result has no target to copy into; skipped");
            return;
        };
        if (extent.width, extent.height) != (target.width, target.height) {
            tracing::warn!(
                key = material.key(),
                shadow = ?(extent.width, extent.height),
                target = ?(target.width, target.height),
                "compute result and target differ in size; copy skipped"
            );
            return;
        }
        self.device.copy_resource(target.resource, shadow.texture);
    }

    fn bind_target(&mut self) -> Result<(), EngineError> {
        let (w, h) = self.target_size();
        let destination = self.cycle.params().destination;
        let binding = match destination {
            Some(dest) => RenderTargetBinding {
                color: Some(self.target_view(&dest)?),
                depth: None,
            },
            None => match &self.saved {
                Some(saved) => saved.render_target,
                None => self.device.render_target(),
            },
        };
        self.device.set_render_target(&binding);
        self.device.set_viewports(&[Viewport::of_size(w, h)]);
        Ok(())
    }

    /// One merged batch: optional compute pass, then either a draw or the Shadow copy.
    fn run_batch(&mut self, material: &mut D3D11Material, batch: &GpuBatch<D3D11Texture>) -> Result<(), EngineError> {
        let mut view = batch.source.view;
        if let Some(cs) = material.effect().compute_shader() {
            let shadow = self.dispatch(material, cs, &batch.source)?;
            if !material.has_graphics() {
                self.copy_shadow(material, &shadow);
                return Ok(());
            }
            view = Some(shadow.srv);
            self.bound_view = None;
        }

        let device = Rc::clone(&self.device);
        let effect = material.effect();
        device.set_shader(Stage::Vertex, effect.vertex_shader());
        device.set_shader(Stage::Pixel, effect.pixel_shader());
        device.set_input_layout(effect.input_layout());
        device.set_primitive_topology(PrimitiveTopology::TriangleList);

        let buffers = material.constant_buffer_bindings();
        device.set_constant_buffers(Stage::Vertex, 0, &buffers);
        device.set_constant_buffers(Stage::Pixel, 0, &buffers);
        if self.bound_view != view || view.is_none() {
            device.set_shader_resources(Stage::Pixel, 0, &[view]);
            self.bound_view = view;
        }
        let aux = material.auxiliary_views();
        if !aux.is_empty() {
            device.set_shader_resources(Stage::Pixel, 1, &aux);
        }
        self.bind_target()?;

        if batch.vertexless {
            let count = if batch.vertex_count == 0 {
                FULLSCREEN_VERTICES
            } else {
                batch.vertex_count
            };
            device.set_vertex_buffer(0, &VertexBufferBinding::NONE);
            device.draw(count, 0);
        } else {
            let buffer = self
                .dynamic
                .buffer
                .ok_or_else(|| EngineError::state("vertex batch without an uploaded vertex buffer"))?;
            device.set_vertex_buffer(
                0,
                &VertexBufferBinding {
                    buffer: Some(buffer),
                    stride: material.stride() as u32,
                    offset: 0,
                },
            );
            device.draw(batch.vertex_count, batch.start_vertex);
        }
        Ok(())
    }

    fn execute_immediate(
        &mut self,
        arenas: &ArenaPool,
        material: &Rc<RefCell<D3D11Material>>,
        texture: &D3D11Texture,
        vertices: Option<ArenaSpan>,
        count: u32,
    ) -> Result<(), EngineError> {
        let mut mat = material.borrow_mut();
        mat.sync_to_device(self.device.as_ref());

        if let Some(span) = vertices {
            let n = count as usize * mat.stride();
            let bytes = arenas
                .raw_vertices
                .bytes(span)
                .filter(|b| b.len() >= n)
                .ok_or_else(|| EngineError::state(format!("span {span:?} does not hold {n} vertex bytes")))?;
            self.upload(&bytes[..n])?;
        }
        if mat.has_graphics() {
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
        let graphics = mat.has_graphics();

        let stats = self.cycle.prepare(arenas, mat.stride(), graphics)?;
        match stats.sorted {
            Some(span) => {
                let bytes = arenas
                    .sorted_vertices
                    .bytes(span)
                    .ok_or_else(|| EngineError::state("sorted vertex region is not live"))?;
                self.upload(bytes)?;
            }
            None => self.release_dynamic(),
        }

        mat.sync_to_device(self.device.as_ref());
        if graphics {
            self.apply_fixed_function()?;
        }

        let batches = self.cycle.take_batches();
        for batch in &batches {
            self.run_batch(&mut mat, batch)?;
        }
        tracing::trace!(batches = batches.len(), bytes = stats.total_bytes, "d3d11 batches drawn");
        Ok(())
    }
}

impl<D, S> RenderDriver for D3D11Driver<D, S>
where
    D: D3D11Device,
    S: HostSurface<Texture = D3D11Texture>,
{
    type Texture = D3D11Texture;
    type Material = D3D11Material;

    fn begin(
        &mut self,
        arenas: &mut ArenaPool,
        params: BeginParams<D3D11Texture>,
        material: Option<Rc<RefCell<D3D11Material>>>,
    ) -> Result<(), EngineError> {
        self.cycle.ensure_idle()?;
        let slots = material
            .as_ref()
            .map_or(0, |m| m.borrow().binding_slot_count())
            .max(self.captured_slots);
        self.saved = Some(D3D11StateSnapshot::capture(self.device.as_ref(), slots));
        tracing::trace!(sort_mode = ?params.sort_mode, "d3d11 begin");
        self.cycle.start(arenas, params, material)
    }

    fn draw(
        &mut self,
        arenas: &mut ArenaPool,
        texture: &D3D11Texture,
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
                saved.restore(driver.device.as_ref());
            }
            driver.device.flush();
            driver.cycle.finish(arenas);
        });

        let (driver, arenas) = &mut *guard;
        if driver.cycle.sort_mode() == SortMode::Immediate {
            return Ok(());
        }
        let result = driver.process(arenas);
        if let Err(e) = &result {
            tracing::error!(error = %e, "d3d11 batch processing failed; context state restored");
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
            tracing::warn!("d3d11 driver disposed inside begin/end");
        }
        self.release_dynamic();
        self.states.release_all(self.device.as_ref());
        for (_, rtv) in self.targets.drain(..) {
            self.device.release(rtv);
        }
        self.bound_view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::D3D11ShaderFactory;
    use crate::mock::{Call, MockD3D11};
    use fcs_runtime::container::{BlockType, ContainerBuilder, Metadata};
    use fcs_runtime::context::RenderContext;
    use fcs_runtime::geometry::{Color, Rect};
    use fcs_runtime::state::{BlendState, RasterizerState};

    #[derive(Debug, Clone, Default)]
    struct Surface {
        target: Option<D3D11Texture>,
    }

    impl HostSurface for Surface {
        type Texture = D3D11Texture;

        fn backbuffer_size(&self) -> (u32, u32) {
            (800, 600)
        }

        fn current_target(&self) -> Option<D3D11Texture> {
            self.target
        }
    }

    const SPRITE_META: &str = r#"{"InputElements":[
        {"SemanticName":"POSITION","SemanticIndex":0,"Format":"float2","AlignedByteOffset":0},
        {"SemanticName":"TEXCOORD","SemanticIndex":0,"Format":"float2","AlignedByteOffset":8}]}"#;

    fn graphics_container(meta: &str) -> Vec<u8> {
        ContainerBuilder::new(1)
            .block(BlockType::DxbcVertex, b"DXBCvs".to_vec())
            .block(BlockType::DxbcPixel, b"DXBCps".to_vec())
            .raw_block(BlockType::Metadata.code(), meta)
            .build()
    }

    fn compute_container() -> Vec<u8> {
        ContainerBuilder::new(1)
            .block(BlockType::DxbcCompute, b"DXBCcs".to_vec())
            .raw_block(BlockType::Metadata.code(), r#"{"ThreadX":8,"ThreadY":8}"#)
            .build()
    }

    struct Fixture {
        device: Rc<MockD3D11>,
        factory: D3D11ShaderFactory<MockD3D11>,
        ctx: RenderContext<D3D11Driver<MockD3D11, Surface>>,
    }

    fn fixture() -> Fixture {
        let config = PipelineConfig {
            arena_initial_capacity: 4096,
            arena_max_capacity: 1 << 20,
            ..PipelineConfig::default()
        };
        let device = Rc::new(MockD3D11::new());
        let factory = D3D11ShaderFactory::new(Rc::clone(&device), &config);
        let driver = D3D11Driver::new(Rc::clone(&device), Surface::default(), &config);
        Fixture {
            device,
            factory,
            ctx: RenderContext::new(driver, &config),
        }
    }

    fn texture(id: u64, width: u32, height: u32) -> D3D11Texture {
        D3D11Texture::new(Handle(id), Some(Handle(id + 1)), width, height)
    }

    fn a() -> D3D11Texture {
        texture(0x20, 64, 64)
    }

    fn b() -> D3D11Texture {
        texture(0x30, 64, 64)
    }

    fn draw_ranges(device: &MockD3D11) -> Vec<(u32, u32)> {
        device
            .draws()
            .into_iter()
            .filter_map(|c| match c {
                Call::Draw { count, start } => Some((start, count)),
                _ => None,
            })
            .collect()
    }

    fn draw_sequence(f: &mut Fixture, mode: SortMode) {
        let m = f
            .factory
            .create_material_from_bytes("sprite", &graphics_container(SPRITE_META))
            .expect("material");
        f.ctx
            .begin(BeginParams::default().with_sort_mode(mode), Some(m))
            .expect("begin");
        for tex in [a(), a(), b(), a()] {
            f.ctx
                .draw_rect(&tex, Rect::new(0, 0, 32, 32), Color::default())
                .expect("draw");
        }
        f.ctx.end().expect("end");
    }

    #[test]
    fn deferred_merges_only_adjacent_runs() {
        let mut f = fixture();
        draw_sequence(&mut f, SortMode::Deferred);
        assert_eq!(draw_ranges(&f.device), vec![(0, 12), (12, 6), (18, 6)]);
        assert!(f.device.calls().contains(&Call::SetTopology(PrimitiveTopology::TriangleList)));
    }

    #[test]
    fn texture_sort_groups_by_handle() {
        let mut f = fixture();
        draw_sequence(&mut f, SortMode::Texture);
        assert_eq!(draw_ranges(&f.device), vec![(0, 18), (18, 6)]);
        let uploaded: usize = f
            .device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WriteDiscard { len, .. } => Some(len),
                _ => None,
            })
            .sum();
        assert_eq!(uploaded, 24 * 16);
    }

    #[test]
    fn source_view_is_rebound_only_when_it_changes() {
        let mut f = fixture();
        draw_sequence(&mut f, SortMode::Deferred);
        let binds: Vec<_> = f
            .device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetShaderResources {
                    stage: Stage::Pixel,
                    start: 0,
                    views,
                } if views.first().copied().flatten() != MockD3D11::HOST_VIEW => views.first().copied().flatten(),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![a().view.expect("a"), b().view.expect("b"), a().view.expect("a")]);
    }

    #[test]
    fn immediate_draws_before_end() {
        let mut f = fixture();
        let m = f
            .factory
            .create_material_from_bytes("sprite", &graphics_container(SPRITE_META))
            .expect("material");
        f.ctx
            .begin(BeginParams::default().with_sort_mode(SortMode::Immediate), Some(m))
            .expect("begin");
        f.ctx
            .draw_rect(&a(), Rect::new(0, 0, 8, 8), Color::default())
            .expect("draw");
        assert_eq!(draw_ranges(&f.device), vec![(0, 6)]);
        f.ctx.end().expect("end");
        assert_eq!(f.device.draws().len(), 1, "end draws nothing more");
    }

    #[test]
    fn end_restores_and_flushes() {
        let mut f = fixture();
        let before = D3D11StateSnapshot::capture(f.device.as_ref(), 8);

        let m = f
            .factory
            .create_material_from_bytes("sprite", &graphics_container(SPRITE_META))
            .expect("material");
        let params = BeginParams {
            destination: Some(b()),
            blend: Some(BlendState::ALPHA_BLEND),
            rasterizer: Some(RasterizerState::CULL_NONE),
            ..BeginParams::default()
        };
        f.ctx.begin(params, Some(m)).expect("begin");
        f.ctx
            .draw_rect(&a(), Rect::new(0, 0, 8, 8), Color::default())
            .expect("draw");
        f.ctx.end().expect("end");

        let calls = f.device.calls();
        let rtv = calls
            .iter()
            .find_map(|c| match c {
                Call::SetRenderTarget(RenderTargetBinding { color, .. }) if *color != MockD3D11::HOST_TARGET => *color,
                _ => None,
            })
            .expect("destination bound");
        assert_eq!(f.device.view_resource(rtv), Some(b().resource));
        assert!(calls.contains(&Call::SetViewports(vec![Viewport::of_size(64, 64)])));
        assert_eq!(calls.last(), Some(&Call::Flush));
        assert_eq!(D3D11StateSnapshot::capture(f.device.as_ref(), 8), before);
    }

    #[test]
    fn end_restores_slots_past_the_configured_capture() {
        let mut f = fixture();
        f.device.set_constant_buffers(Stage::Pixel, 10, &[Some(Handle(0x777))]);
        f.device.set_shader_resources(Stage::Pixel, 9, &[Some(Handle(0x778))]);

        let meta: Metadata = serde_json::from_value(serde_json::json!({
            "InputElements": [
                { "SemanticName": "POSITION", "SemanticIndex": 0, "Format": "float2", "AlignedByteOffset": 0 },
                { "SemanticName": "TEXCOORD", "SemanticIndex": 0, "Format": "float2", "AlignedByteOffset": 8 }
            ],
            "Buffers": [ { "Name": "Wide", "Slot": 10, "TotalSize": 16 } ],
            "Textures": [ { "Name": "Main", "Slot": 0 }, { "Name": "Far", "Slot": 9 } ]
        }))
        .expect("metadata deserializes");
        let bytes = ContainerBuilder::new(1)
            .block(BlockType::DxbcVertex, b"DXBCvs".to_vec())
            .block(BlockType::DxbcPixel, b"DXBCps".to_vec())
            .metadata(&meta)
            .expect("metadata serializes")
            .build();
        let m = f
            .factory
            .create_material_from_bytes("wide", &bytes)
            .expect("material");
        m.borrow_mut().set_texture(9, Some(texture(0x40, 64, 64)));
        assert_eq!(m.borrow().binding_slot_count(), 11);
        let before = D3D11StateSnapshot::capture(f.device.as_ref(), 11);

        f.ctx.begin(BeginParams::default(), Some(m)).expect("begin");
        f.ctx
            .draw_rect(&a(), Rect::new(0, 0, 8, 8), Color::default())
            .expect("draw");
        f.ctx.end().expect("end");

        assert!(f.device.calls().iter().any(|c| matches!(
            c,
            Call::SetConstantBuffers { stage: Stage::Pixel, start: 0, buffers } if buffers.len() == 11
        )));
        assert_eq!(f.device.constant_buffers(Stage::Pixel, 10, 1), vec![Some(Handle(0x777))]);
        assert_eq!(f.device.shader_resources(Stage::Pixel, 9, 1), vec![Some(Handle(0x778))]);
        assert_eq!(D3D11StateSnapshot::capture(f.device.as_ref(), 11), before);
    }

    #[test]
    fn nested_begin_keeps_the_first_snapshot() {
        let mut f = fixture();
        let before = D3D11StateSnapshot::capture(f.device.as_ref(), 8);
        f.ctx.begin(BeginParams::default(), None).expect("begin");
        f.device.set_viewports(&[Viewport::of_size(3, 4)]);

        let err = f
            .ctx
            .begin(BeginParams::default(), None)
            .expect_err("second begin");
        assert!(matches!(err, EngineError::State(_)));

        f.ctx.end().expect("end");
        assert_eq!(D3D11StateSnapshot::capture(f.device.as_ref(), 8), before);
    }

    #[test]
    fn draw_without_begin_is_a_state_error() {
        let mut f = fixture();
        let err = f.ctx.draw_vertices(&a(), None, 0, 6).expect_err("not active");
        assert!(matches!(err, EngineError::State(_)));
        assert!(matches!(f.ctx.end(), Err(EngineError::State(_))));
    }

    #[test]
    fn vertexless_material_draws_without_a_vertex_buffer() {
        let mut f = fixture();
        let m = f
            .factory
            .create_material_from_bytes("fullscreen", &graphics_container("{}"))
            .expect("material");
        assert_eq!(m.borrow().stride(), 0);

        f.ctx.apply(m, &a(), None, None, 0, 0).expect("apply");
        assert_eq!(draw_ranges(&f.device), vec![(0, 6)]);
        let calls = f.device.calls();
        assert!(calls.contains(&Call::SetVertexBuffer(VertexBufferBinding::NONE)));
        assert!(calls.contains(&Call::SetViewports(vec![Viewport::of_size(800, 600)])));
    }

    #[test]
    fn compute_only_material_dispatches_and_copies() {
        let mut f = fixture();
        let m = f
            .factory
            .create_material_from_bytes("cs", &compute_container())
            .expect("material");
        let dest = texture(0x40, 100, 50);
        let src = texture(0x50, 100, 50);

        f.ctx.apply(m, &src, Some(dest), None, 0, 0).expect("apply");

        let calls = f.device.calls();
        assert!(calls.contains(&Call::Dispatch([13, 7, 1])));
        let copied = calls.iter().any(|c| matches!(c, Call::CopyResource { dst, .. } if *dst == dest.resource));
        assert!(copied, "shadow copied into the destination");
        assert!(f.device.draws().is_empty());
        assert_eq!(f.device.bound_uav(), None, "uav unbound after dispatch");
    }

    #[test]
    fn mismatched_compute_target_is_skipped() {
        let mut f = fixture();
        let m = f
            .factory
            .create_material_from_bytes("cs", &compute_container())
            .expect("material");
        f.ctx
            .apply(m, &texture(0x50, 100, 50), Some(texture(0x40, 64, 64)), None, 0, 0)
            .expect("apply");
        assert!(!f.device.calls().iter().any(|c| matches!(c, Call::CopyResource { .. })));
    }

    #[test]
    fn end_restores_even_when_batching_fails() {
        let mut f = fixture();
        let before = D3D11StateSnapshot::capture(f.device.as_ref(), 8);
        let m = f
            .factory
            .create_material_from_bytes("sprite", &graphics_container(SPRITE_META))
            .expect("material");
        f.ctx.begin(BeginParams::default(), Some(m)).expect("begin");
        f.ctx
            .draw_rect(&a(), Rect::new(0, 0, 8, 8), Color::default())
            .expect("draw");
        f.device.fail_create("CreateBuffer");

        let err = f.ctx.end().expect_err("vertex buffer cannot be created");
        assert!(matches!(err, EngineError::DeviceCreate(_)));
        assert!(!f.ctx.is_active());
        assert_eq!(D3D11StateSnapshot::capture(f.device.as_ref(), 8), before);
    }

    #[test]
    fn dispose_releases_driver_objects() {
        let mut f = fixture();
        let baseline = f.device.live_objects();
        let m = f
            .factory
            .create_material_from_bytes("sprite", &graphics_container(SPRITE_META))
            .expect("material");
        let material_objects = f.device.live_objects() - baseline;
        f.ctx
            .begin(BeginParams::default().with_destination(b()), Some(m))
            .expect("begin");
        f.ctx
            .draw_rect(&a(), Rect::new(0, 0, 8, 8), Color::default())
            .expect("draw");
        f.ctx.end().expect("end");
        assert!(f.ctx.driver().dynamic_capacity() >= 6 * 16);

        f.ctx.dispose();
        assert_eq!(f.device.live_objects(), baseline + material_objects);
    }
}
