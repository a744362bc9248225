//! The slice of `ID3D11Device` + immediate `ID3D11DeviceContext` the driver touches.
//!
//! The host owns the real device and implements this trait over it; the crate never links a
//! D3D11 binding itself. Handles returned by getters are borrowed: the implementation balances
//! whatever references the native getters add, so the driver only calls [`D3D11Device::release`]
//! on objects it created.

use crate::desc::{
    BlendBinding, BlendDesc, BufferDesc, DepthStencilBinding, DepthStencilDesc, Handle, IndexBufferBinding,
    InputElementDesc, PrimitiveTopology, RasterizerDesc, RenderTargetBinding, SamplerDesc, SignatureParameter,
    Stage, Texture2DDesc, VertexBufferBinding, Viewport,
};

pub trait D3D11Device {
    // ---- object creation ----
    fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<Handle, String>;
    fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<Handle, String>;
    fn create_compute_shader(&self, bytecode: &[u8]) -> Result<Handle, String>;
    fn create_input_layout(&self, elements: &[InputElementDesc], vs_bytecode: &[u8]) -> Result<Handle, String>;
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Handle, String>;
    fn create_texture_2d(&self, desc: &Texture2DDesc) -> Result<Handle, String>;
    fn create_shader_resource_view(&self, resource: Handle) -> Result<Handle, String>;
    fn create_unordered_access_view(&self, resource: Handle) -> Result<Handle, String>;
    fn create_render_target_view(&self, resource: Handle) -> Result<Handle, String>;
    fn create_blend_state(&self, desc: &BlendDesc) -> Result<Handle, String>;
    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<Handle, String>;
    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<Handle, String>;
    fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<Handle, String>;
    fn release(&self, object: Handle);

    /// Input signature of a vertex shader (`D3DReflect`). Hosts without a reflector return an
    /// error and the layout falls back to container metadata.
    fn reflect_input_signature(&self, vs_bytecode: &[u8]) -> Result<Vec<SignatureParameter>, String>;

    // ---- shader stages ----
    fn shader(&self, stage: Stage) -> Option<Handle>;
    fn set_shader(&self, stage: Stage, shader: Option<Handle>);
    fn constant_buffers(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>>;
    fn set_constant_buffers(&self, stage: Stage, start: u32, buffers: &[Option<Handle>]);
    fn shader_resources(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>>;
    fn set_shader_resources(&self, stage: Stage, start: u32, views: &[Option<Handle>]);
    fn samplers(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>>;
    fn set_samplers(&self, stage: Stage, start: u32, samplers: &[Option<Handle>]);
    fn cs_unordered_access_view(&self, slot: u32) -> Option<Handle>;
    fn cs_set_unordered_access_view(&self, slot: u32, view: Option<Handle>);

    // ---- input assembler ----
    fn input_layout(&self) -> Option<Handle>;
    fn set_input_layout(&self, layout: Option<Handle>);
    fn primitive_topology(&self) -> PrimitiveTopology;
    fn set_primitive_topology(&self, topology: PrimitiveTopology);
    fn index_buffer(&self) -> IndexBufferBinding;
    fn set_index_buffer(&self, binding: &IndexBufferBinding);
    fn vertex_buffer(&self, slot: u32) -> VertexBufferBinding;
    fn set_vertex_buffer(&self, slot: u32, binding: &VertexBufferBinding);

    // ---- rasterizer / output merger ----
    fn rasterizer_state(&self) -> Option<Handle>;
    fn set_rasterizer_state(&self, state: Option<Handle>);
    fn viewports(&self) -> Vec<Viewport>;
    fn set_viewports(&self, viewports: &[Viewport]);
    fn blend_state(&self) -> BlendBinding;
    fn set_blend_state(&self, binding: &BlendBinding);
    fn depth_stencil_state(&self) -> DepthStencilBinding;
    fn set_depth_stencil_state(&self, binding: &DepthStencilBinding);
    fn render_target(&self) -> RenderTargetBinding;
    fn set_render_target(&self, binding: &RenderTargetBinding);

    // ---- work ----
    /// `UpdateSubresource` of a whole default-usage resource.
    fn update_subresource(&self, resource: Handle, bytes: &[u8]);
    /// `Map(WRITE_DISCARD)`, copy, `Unmap` on a dynamic buffer.
    fn write_discard(&self, buffer: Handle, bytes: &[u8]) -> Result<(), String>;
    fn draw(&self, vertex_count: u32, start_vertex: u32);
    fn dispatch(&self, x: u32, y: u32, z: u32);
    fn copy_resource(&self, destination: Handle, source: Handle);
    fn flush(&self);
}
