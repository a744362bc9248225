//! Immediate-context state captured at Begin and put back at End.

use crate::desc::{
    BlendBinding, DepthStencilBinding, Handle, IndexBufferBinding, PrimitiveTopology, RenderTargetBinding, Stage,
    VertexBufferBinding, Viewport,
};
use crate::device::D3D11Device;

/// `D3D11_COMMONSHADER_CONSTANT_BUFFER_API_SLOT_COUNT`.
const CONSTANT_BUFFER_SLOTS: u32 = 14;
/// `D3D11_COMMONSHADER_SAMPLER_SLOT_COUNT`.
const SAMPLER_SLOTS: u32 = 16;
/// `D3D11_COMMONSHADER_INPUT_RESOURCE_SLOT_COUNT`.
const RESOURCE_SLOTS: u32 = 128;

/// Everything the driver may disturb while drawing.
///
/// Constant buffers, resource views and samplers are captured over the first `slots` slots of
/// each stage, clamped to the device limits. The driver sizes `slots` to cover every binding of
/// the material bound at Begin. Vertex buffers past slot 0, stream-out and the
/// hull/domain/geometry stages are never touched and so not captured.
#[derive(Debug, Clone, PartialEq)]
pub struct D3D11StateSnapshot {
    pub slots: u32,
    /// Indexed by [`Stage::index`].
    pub shaders: [Option<Handle>; 3],
    pub input_layout: Option<Handle>,
    pub topology: PrimitiveTopology,
    pub index_buffer: IndexBufferBinding,
    pub vertex_buffer: VertexBufferBinding,
    pub blend: BlendBinding,
    pub depth_stencil: DepthStencilBinding,
    pub rasterizer: Option<Handle>,
    pub constant_buffers: [Vec<Option<Handle>>; 3],
    pub ps_resources: Vec<Option<Handle>>,
    pub cs_resources: Vec<Option<Handle>>,
    pub ps_samplers: Vec<Option<Handle>>,
    pub cs_uav: Option<Handle>,
    pub viewports: Vec<Viewport>,
    pub render_target: RenderTargetBinding,
}

impl D3D11StateSnapshot {
    pub fn capture<D: D3D11Device + ?Sized>(device: &D, slots: u32) -> Self {
        let shaders = Stage::ALL.map(|s| device.shader(s));
        let constant_buffers = Stage::ALL.map(|s| device.constant_buffers(s, 0, slots.min(CONSTANT_BUFFER_SLOTS)));
        let resources = slots.min(RESOURCE_SLOTS);

        Self {
            slots,
            shaders,
            input_layout: device.input_layout(),
            topology: device.primitive_topology(),
            index_buffer: device.index_buffer(),
            vertex_buffer: device.vertex_buffer(0),
            blend: device.blend_state(),
            depth_stencil: device.depth_stencil_state(),
            rasterizer: device.rasterizer_state(),
            constant_buffers,
            ps_resources: device.shader_resources(Stage::Pixel, 0, resources),
            cs_resources: device.shader_resources(Stage::Compute, 0, resources),
            ps_samplers: device.samplers(Stage::Pixel, 0, slots.min(SAMPLER_SLOTS)),
            cs_uav: device.cs_unordered_access_view(0),
            viewports: device.viewports(),
            render_target: device.render_target(),
        }
    }

    pub fn restore<D: D3D11Device + ?Sized>(&self, device: &D) {
        // Views first: a resource still bound as UAV would null out the SRV rebinds below.
        device.cs_set_unordered_access_view(0, self.cs_uav);
        device.set_render_target(&self.render_target);

        for stage in Stage::ALL {
            device.set_shader(stage, self.shaders[stage.index()]);
            device.set_constant_buffers(stage, 0, &self.constant_buffers[stage.index()]);
        }
        device.set_shader_resources(Stage::Pixel, 0, &self.ps_resources);
        device.set_shader_resources(Stage::Compute, 0, &self.cs_resources);
        device.set_samplers(Stage::Pixel, 0, &self.ps_samplers);

        device.set_input_layout(self.input_layout);
        device.set_primitive_topology(self.topology);
        device.set_index_buffer(&self.index_buffer);
        device.set_vertex_buffer(0, &self.vertex_buffer);

        device.set_blend_state(&self.blend);
        device.set_depth_stencil_state(&self.depth_stencil);
        device.set_rasterizer_state(self.rasterizer);
        device.set_viewports(&self.viewports);
    }
}
