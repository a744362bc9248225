//! Recording immediate-context model for tests.
//!
//! Starts out with host bindings in every slot the snapshot reads, hands out handles for created
//! objects, tracks which of them are still alive and logs the calls tests assert on.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::desc::{
    BlendBinding, BlendDesc, BufferDesc, DepthStencilBinding, DepthStencilDesc, DxgiFormat, Handle,
    IndexBufferBinding, InputElementDesc, PrimitiveTopology, RasterizerDesc, RenderTargetBinding, SamplerDesc,
    SignatureParameter, Stage, Texture2DDesc, VertexBufferBinding, Viewport,
};
use crate::device::D3D11Device;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetShader { stage: Stage, shader: Option<Handle> },
    SetConstantBuffers { stage: Stage, start: u32, buffers: Vec<Option<Handle>> },
    SetShaderResources { stage: Stage, start: u32, views: Vec<Option<Handle>> },
    SetSamplers { stage: Stage, start: u32, samplers: Vec<Option<Handle>> },
    SetUav(Option<Handle>),
    SetInputLayout(Option<Handle>),
    SetTopology(PrimitiveTopology),
    SetVertexBuffer(VertexBufferBinding),
    SetBlend(BlendBinding),
    SetDepthStencil(DepthStencilBinding),
    SetRasterizer(Option<Handle>),
    SetViewports(Vec<Viewport>),
    SetRenderTarget(RenderTargetBinding),
    UpdateSubresource { resource: Handle, len: usize },
    WriteDiscard { buffer: Handle, len: usize },
    Draw { count: u32, start: u32 },
    Dispatch([u32; 3]),
    CopyResource { dst: Handle, src: Handle },
    Flush,
}

type Slots = [BTreeMap<u32, Handle>; 3];

#[derive(Debug, Clone)]
struct Model {
    shaders: [Option<Handle>; 3],
    constant_buffers: Slots,
    resources: Slots,
    samplers: Slots,
    uav: Option<Handle>,
    input_layout: Option<Handle>,
    topology: PrimitiveTopology,
    index_buffer: IndexBufferBinding,
    vertex_buffer: VertexBufferBinding,
    blend: BlendBinding,
    depth_stencil: DepthStencilBinding,
    rasterizer: Option<Handle>,
    viewports: Vec<Viewport>,
    render_target: RenderTargetBinding,
}

fn read(map: &BTreeMap<u32, Handle>, start: u32, count: u32) -> Vec<Option<Handle>> {
    (start..start + count).map(|slot| map.get(&slot).copied()).collect()
}

fn write(map: &mut BTreeMap<u32, Handle>, start: u32, values: &[Option<Handle>]) {
    for (slot, value) in (start..).zip(values) {
        match value {
            Some(h) => map.insert(slot, *h),
            None => map.remove(&slot),
        };
    }
}

#[derive(Debug)]
pub struct MockD3D11 {
    model: RefCell<Model>,
    calls: RefCell<Vec<Call>>,
    next: Cell<u64>,
    live: RefCell<BTreeMap<Handle, &'static str>>,
    buffers: RefCell<HashMap<Handle, BufferDesc>>,
    views: RefCell<HashMap<Handle, Handle>>,
    input_layouts: RefCell<Vec<Vec<InputElementDesc>>>,
    signature: RefCell<Option<Vec<SignatureParameter>>>,
    failures: RefCell<HashSet<String>>,
}

impl MockD3D11 {
    pub const HOST_VIEW: Option<Handle> = Some(Handle(4));
    pub const HOST_TARGET: Option<Handle> = Some(Handle(12));

    /// A context that already carries host state, so restores are observable.
    pub fn new() -> Self {
        let mut model = Model {
            shaders: [Some(Handle(1)), Some(Handle(2)), None],
            constant_buffers: Default::default(),
            resources: Default::default(),
            samplers: Default::default(),
            uav: None,
            input_layout: Some(Handle(6)),
            topology: PrimitiveTopology::TriangleStrip,
            index_buffer: IndexBufferBinding {
                buffer: Some(Handle(7)),
                format: DxgiFormat::R16_UInt,
                offset: 0,
            },
            vertex_buffer: VertexBufferBinding {
                buffer: Some(Handle(8)),
                stride: 32,
                offset: 0,
            },
            blend: BlendBinding {
                state: Some(Handle(9)),
                factor: [1.0; 4],
                sample_mask: u32::MAX,
            },
            depth_stencil: DepthStencilBinding {
                state: Some(Handle(10)),
                stencil_ref: 1,
            },
            rasterizer: Some(Handle(11)),
            viewports: vec![Viewport::of_size(800, 600)],
            render_target: RenderTargetBinding {
                color: Self::HOST_TARGET,
                depth: Some(Handle(13)),
            },
        };
        model.constant_buffers[Stage::Vertex.index()].insert(0, Handle(3));
        model.resources[Stage::Pixel.index()].insert(0, Handle(4));
        model.samplers[Stage::Pixel.index()].insert(0, Handle(5));

        Self {
            model: RefCell::new(model),
            calls: RefCell::new(Vec::new()),
            next: Cell::new(0x1000),
            live: RefCell::new(BTreeMap::new()),
            buffers: RefCell::new(HashMap::new()),
            views: RefCell::new(HashMap::new()),
            input_layouts: RefCell::new(Vec::new()),
            signature: RefCell::new(None),
            failures: RefCell::new(HashSet::new()),
        }
    }

    /// Makes every later call of the named creation method fail (`"CreateBuffer"`, ...).
    pub fn fail_create(&self, method: &str) {
        self.failures.borrow_mut().insert(method.to_string());
    }

    /// Input signature reflection reports; without one reflection is unavailable.
    pub fn set_signature(&self, params: Vec<SignatureParameter>) {
        *self.signature.borrow_mut() = Some(params);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn draws(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Draw { .. }))
            .cloned()
            .collect()
    }

    pub fn live_objects(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn buffer_desc(&self, buffer: Handle) -> Option<BufferDesc> {
        self.buffers.borrow().get(&buffer).copied()
    }

    /// Resource a created view points at.
    pub fn view_resource(&self, view: Handle) -> Option<Handle> {
        self.views.borrow().get(&view).copied()
    }

    pub fn last_input_layout(&self) -> Option<Vec<InputElementDesc>> {
        self.input_layouts.borrow().last().cloned()
    }

    pub fn bound_uav(&self) -> Option<Handle> {
        self.model.borrow().uav
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn create(&self, method: &'static str) -> Result<Handle, String> {
        if self.failures.borrow().contains(method) {
            return Err(format!("{method} failed: E_OUTOFMEMORY"));
        }
        let h = Handle(self.next.get());
        self.next.set(h.0 + 1);
        self.live.borrow_mut().insert(h, method);
        Ok(h)
    }

    fn create_view(&self, method: &'static str, resource: Handle) -> Result<Handle, String> {
        let view = self.create(method)?;
        self.views.borrow_mut().insert(view, resource);
        Ok(view)
    }
}

impl D3D11Device for MockD3D11 {
    fn create_vertex_shader(&self, _bytecode: &[u8]) -> Result<Handle, String> {
        self.create("CreateVertexShader")
    }

    fn create_pixel_shader(&self, _bytecode: &[u8]) -> Result<Handle, String> {
        self.create("CreatePixelShader")
    }

    fn create_compute_shader(&self, _bytecode: &[u8]) -> Result<Handle, String> {
        self.create("CreateComputeShader")
    }

    fn create_input_layout(&self, elements: &[InputElementDesc], _vs_bytecode: &[u8]) -> Result<Handle, String> {
        let h = self.create("CreateInputLayout")?;
        self.input_layouts.borrow_mut().push(elements.to_vec());
        Ok(h)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Handle, String> {
        let h = self.create("CreateBuffer")?;
        self.buffers.borrow_mut().insert(h, *desc);
        Ok(h)
    }

    fn create_texture_2d(&self, _desc: &Texture2DDesc) -> Result<Handle, String> {
        self.create("CreateTexture2D")
    }

    fn create_shader_resource_view(&self, resource: Handle) -> Result<Handle, String> {
        self.create_view("CreateShaderResourceView", resource)
    }

    fn create_unordered_access_view(&self, resource: Handle) -> Result<Handle, String> {
        self.create_view("CreateUnorderedAccessView", resource)
    }

    fn create_render_target_view(&self, resource: Handle) -> Result<Handle, String> {
        self.create_view("CreateRenderTargetView", resource)
    }

    fn create_blend_state(&self, _desc: &BlendDesc) -> Result<Handle, String> {
        self.create("CreateBlendState")
    }

    fn create_depth_stencil_state(&self, _desc: &DepthStencilDesc) -> Result<Handle, String> {
        self.create("CreateDepthStencilState")
    }

    fn create_rasterizer_state(&self, _desc: &RasterizerDesc) -> Result<Handle, String> {
        self.create("CreateRasterizerState")
    }

    fn create_sampler_state(&self, _desc: &SamplerDesc) -> Result<Handle, String> {
        self.create("CreateSamplerState")
    }

    fn release(&self, object: Handle) {
        self.live.borrow_mut().remove(&object);
        self.buffers.borrow_mut().remove(&object);
    }

    fn reflect_input_signature(&self, _vs_bytecode: &[u8]) -> Result<Vec<SignatureParameter>, String> {
        self.signature
            .borrow()
            .clone()
            .ok_or_else(|| "D3DReflect unavailable".to_string())
    }

    fn shader(&self, stage: Stage) -> Option<Handle> {
        self.model.borrow().shaders[stage.index()]
    }

    fn set_shader(&self, stage: Stage, shader: Option<Handle>) {
        self.model.borrow_mut().shaders[stage.index()] = shader;
        self.record(Call::SetShader { stage, shader });
    }

    fn constant_buffers(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>> {
        read(&self.model.borrow().constant_buffers[stage.index()], start, count)
    }

    fn set_constant_buffers(&self, stage: Stage, start: u32, buffers: &[Option<Handle>]) {
        write(&mut self.model.borrow_mut().constant_buffers[stage.index()], start, buffers);
        self.record(Call::SetConstantBuffers {
            stage,
            start,
            buffers: buffers.to_vec(),
        });
    }

    fn shader_resources(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>> {
        read(&self.model.borrow().resources[stage.index()], start, count)
    }

    fn set_shader_resources(&self, stage: Stage, start: u32, views: &[Option<Handle>]) {
        write(&mut self.model.borrow_mut().resources[stage.index()], start, views);
        self.record(Call::SetShaderResources {
            stage,
            start,
            views: views.to_vec(),
        });
    }

    fn samplers(&self, stage: Stage, start: u32, count: u32) -> Vec<Option<Handle>> {
        read(&self.model.borrow().samplers[stage.index()], start, count)
    }

    fn set_samplers(&self, stage: Stage, start: u32, samplers: &[Option<Handle>]) {
        write(&mut self.model.borrow_mut().samplers[stage.index()], start, samplers);
        self.record(Call::SetSamplers {
            stage,
            start,
            samplers: samplers.to_vec(),
        });
    }

    fn cs_unordered_access_view(&self, _slot: u32) -> Option<Handle> {
        self.model.borrow().uav
    }

    fn cs_set_unordered_access_view(&self, _slot: u32, view: Option<Handle>) {
        self.model.borrow_mut().uav = view;
        self.record(Call::SetUav(view));
    }

    fn input_layout(&self) -> Option<Handle> {
        self.model.borrow().input_layout
    }

    fn set_input_layout(&self, layout: Option<Handle>) {
        self.model.borrow_mut().input_layout = layout;
        self.record(Call::SetInputLayout(layout));
    }

    fn primitive_topology(&self) -> PrimitiveTopology {
        self.model.borrow().topology
    }

    fn set_primitive_topology(&self, topology: PrimitiveTopology) {
        self.model.borrow_mut().topology = topology;
        self.record(Call::SetTopology(topology));
    }

    fn index_buffer(&self) -> IndexBufferBinding {
        self.model.borrow().index_buffer
    }

    fn set_index_buffer(&self, binding: &IndexBufferBinding) {
        self.model.borrow_mut().index_buffer = *binding;
    }

    fn vertex_buffer(&self, _slot: u32) -> VertexBufferBinding {
        self.model.borrow().vertex_buffer
    }

    fn set_vertex_buffer(&self, _slot: u32, binding: &VertexBufferBinding) {
        self.model.borrow_mut().vertex_buffer = *binding;
        self.record(Call::SetVertexBuffer(*binding));
    }

    fn rasterizer_state(&self) -> Option<Handle> {
        self.model.borrow().rasterizer
    }

    fn set_rasterizer_state(&self, state: Option<Handle>) {
        self.model.borrow_mut().rasterizer = state;
        self.record(Call::SetRasterizer(state));
    }

    fn viewports(&self) -> Vec<Viewport> {
        self.model.borrow().viewports.clone()
    }

    fn set_viewports(&self, viewports: &[Viewport]) {
        self.model.borrow_mut().viewports = viewports.to_vec();
        self.record(Call::SetViewports(viewports.to_vec()));
    }

    fn blend_state(&self) -> BlendBinding {
        self.model.borrow().blend
    }

    fn set_blend_state(&self, binding: &BlendBinding) {
        self.model.borrow_mut().blend = *binding;
        self.record(Call::SetBlend(*binding));
    }

    fn depth_stencil_state(&self) -> DepthStencilBinding {
        self.model.borrow().depth_stencil
    }

    fn set_depth_stencil_state(&self, binding: &DepthStencilBinding) {
        self.model.borrow_mut().depth_stencil = *binding;
        self.record(Call::SetDepthStencil(*binding));
    }

    fn render_target(&self) -> RenderTargetBinding {
        self.model.borrow().render_target
    }

    fn set_render_target(&self, binding: &RenderTargetBinding) {
        self.model.borrow_mut().render_target = *binding;
        self.record(Call::SetRenderTarget(*binding));
    }

    fn update_subresource(&self, resource: Handle, bytes: &[u8]) {
        self.record(Call::UpdateSubresource {
            resource,
            len: bytes.len(),
        });
    }

    fn write_discard(&self, buffer: Handle, bytes: &[u8]) -> Result<(), String> {
        let capacity = self.buffers.borrow().get(&buffer).map(|d| d.byte_width as usize);
        match capacity {
            Some(cap) if cap >= bytes.len() => {
                self.record(Call::WriteDiscard {
                    buffer,
                    len: bytes.len(),
                });
                Ok(())
            }
            Some(cap) => Err(format!("{} bytes do not fit a {cap}-byte buffer", bytes.len())),
            None => Err("Map on a released buffer".to_string()),
        }
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32) {
        self.record(Call::Draw {
            count: vertex_count,
            start: start_vertex,
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.record(Call::Dispatch([x, y, z]));
    }

    fn copy_resource(&self, destination: Handle, source: Handle) {
        self.record(Call::CopyResource {
            dst: destination,
            src: source,
        });
    }

    fn flush(&self) {
        self.record(Call::Flush);
    }
}
