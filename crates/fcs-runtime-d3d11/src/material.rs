//! D3D11 material: a shared [`D3D11Effect`] plus per-instance constant buffers and the compute
//! Shadow.

use std::collections::BTreeMap;
use std::rc::Rc;

use fcs_core::EngineError;
use fcs_runtime::driver::HostTexture;
use fcs_runtime::layout::VertexLayout;
use fcs_runtime::material::{MaterialCore, Parameter, ParamValue, ShadowExtent, ShadowPlan};
use fcs_runtime::packer::VertexWriter;

use crate::desc::{BindFlags, BufferDesc, DxgiFormat, Handle, Texture2DDesc, Usage};
use crate::device::D3D11Device;
use crate::effect::D3D11Effect;

/// A host texture: the resource plus the views the driver may need.
///
/// `view` is required to sample the texture; `target` is created on demand when the texture is
/// used as a destination without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11Texture {
    pub resource: Handle,
    pub view: Option<Handle>,
    pub target: Option<Handle>,
    pub width: u32,
    pub height: u32,
}

impl D3D11Texture {
    pub fn new(resource: Handle, view: Option<Handle>, width: u32, height: u32) -> Self {
        Self {
            resource,
            view,
            target: None,
            width,
            height,
        }
    }

    pub fn with_target(mut self, target: Handle) -> Self {
        self.target = Some(target);
        self
    }
}

impl HostTexture for D3D11Texture {
    fn sort_handle(&self) -> u64 {
        self.view.unwrap_or(self.resource).0
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Compute output: an RGBA8 texture writable through `uav` and readable through `srv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowBuffer {
    pub texture: Handle,
    pub srv: Handle,
    pub uav: Handle,
}

impl ShadowBuffer {
    fn create<D: D3D11Device + ?Sized>(device: &D, width: u32, height: u32) -> Result<Self, String> {
        let texture = device.create_texture_2d(&Texture2DDesc {
            width,
            height,
            format: DxgiFormat::R8G8B8A8_UNorm,
            bind: BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS,
        })?;
        let srv = match device.create_shader_resource_view(texture) {
            Ok(v) => v,
            Err(e) => {
                device.release(texture);
                return Err(e);
            }
        };
        let uav = match device.create_unordered_access_view(texture) {
            Ok(v) => v,
            Err(e) => {
                device.release(srv);
                device.release(texture);
                return Err(e);
            }
        };
        Ok(Self { texture, srv, uav })
    }

    fn release<D: D3D11Device + ?Sized>(self, device: &D) {
        device.release(self.uav);
        device.release(self.srv);
        device.release(self.texture);
    }
}

/// Constant buffer byte widths must be a multiple of 16.
fn aligned_width(len: usize) -> usize {
    len.max(1).div_ceil(16) * 16
}

#[derive(Debug)]
pub struct D3D11Material {
    key: String,
    effect: Rc<D3D11Effect>,
    core: MaterialCore<D3D11Texture>,
    writer: Option<Rc<VertexWriter>>,
    buffers: BTreeMap<u32, Handle>,
    shadow: Option<ShadowBuffer>,
}

impl D3D11Material {
    /// Creates one default-usage constant buffer per declared cbuffer up front.
    pub(crate) fn new<D: D3D11Device + ?Sized>(
        device: &D,
        key: String,
        effect: Rc<D3D11Effect>,
        writer: Option<Rc<VertexWriter>>,
        default_threads: [u32; 3],
    ) -> Result<Self, EngineError> {
        let core = MaterialCore::new(effect.metadata(), default_threads);
        let mut buffers = BTreeMap::new();
        for slot in core.slots().collect::<Vec<_>>() {
            let len = core.mirror(slot).map_or(0, <[u8]>::len);
            let desc = BufferDesc {
                byte_width: aligned_width(len) as u32,
                usage: Usage::Default,
                bind: BindFlags::CONSTANT_BUFFER,
                cpu_write: false,
            };
            match device.create_buffer(&desc) {
                Ok(b) => {
                    buffers.insert(slot, b);
                }
                Err(e) => {
                    for (_, b) in buffers {
                        device.release(b);
                    }
                    return Err(EngineError::DeviceCreate(format!("constant buffer for slot {slot}: {e}")));
                }
            }
        }

        Ok(Self {
            key,
            effect,
            core,
            writer,
            buffers,
            shadow: None,
        })
    }

    /// Cache key of the effect this material instantiates.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn effect(&self) -> &D3D11Effect {
        &self.effect
    }

    pub fn core(&self) -> &MaterialCore<D3D11Texture> {
        &self.core
    }

    pub fn parameter(&self, name: &str) -> Option<Parameter> {
        self.core.parameter(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), EngineError> {
        self.core.set(name, value)
    }

    pub fn set_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.core.set_bytes(name, bytes)
    }

    pub fn update_buffer(&mut self, slot: u32, bytes: &[u8]) -> Result<(), EngineError> {
        self.core.update_buffer(slot, bytes)
    }

    /// Auxiliary texture for register `t{slot}` (slot 0 is always the draw's source).
    pub fn set_texture(&mut self, slot: usize, texture: Option<D3D11Texture>) {
        self.core.set_texture(slot, texture);
    }

    pub fn has_graphics(&self) -> bool {
        self.effect.has_graphics()
    }

    pub fn layout(&self) -> Option<&VertexLayout> {
        self.effect.vertex_layout()
    }

    pub fn vertex_writer(&self) -> Option<&Rc<VertexWriter>> {
        self.writer.as_ref()
    }

    pub fn stride(&self) -> usize {
        self.writer.as_ref().map_or(0, |w| w.stride())
    }

    pub fn constant_buffer(&self, slot: u32) -> Option<Handle> {
        self.buffers.get(&slot).copied()
    }

    pub fn shadow(&self) -> Option<ShadowBuffer> {
        self.shadow
    }

    pub fn shadow_extent(&self) -> Option<ShadowExtent> {
        self.core.shadow_extent()
    }

    pub fn dispatch_groups(&self) -> [u32; 3] {
        self.core.dispatch_groups()
    }

    /// `UpdateSubresource` for every dirty mirror.
    pub fn sync_to_device<D: D3D11Device + ?Sized>(&mut self, device: &D) {
        for slot in self.core.take_dirty() {
            let (Some(&buffer), Some(bytes)) = (self.buffers.get(&slot), self.core.mirror(slot)) else {
                continue;
            };
            if bytes.len() % 16 == 0 {
                device.update_subresource(buffer, bytes);
            } else {
                let mut padded = bytes.to_vec();
                padded.resize(aligned_width(bytes.len()), 0);
                device.update_subresource(buffer, &padded);
            }
        }
    }

    /// Constant buffers as a dense `0..=max slot` binding array.
    pub fn constant_buffer_bindings(&self) -> Vec<Option<Handle>> {
        let Some((&last, _)) = self.buffers.last_key_value() else {
            return Vec::new();
        };
        (0..=last).map(|slot| self.buffers.get(&slot).copied()).collect()
    }

    /// Slots this material binds in one stage: constant buffers `b0..=max` and views
    /// `t0..texture_slot_count`.
    pub fn binding_slot_count(&self) -> u32 {
        let buffers = self.buffers.last_key_value().map_or(0, |(&slot, _)| slot + 1);
        buffers.max(self.core.texture_slot_count() as u32)
    }

    /// Views for registers `t1..`; `None` where no auxiliary texture is set.
    pub fn auxiliary_views(&self) -> Vec<Option<Handle>> {
        let mut views = Vec::new();
        for (slot, tex) in self.core.auxiliary_textures() {
            // `views[i]` lands in register `t(i + 1)`.
            if views.len() < slot - 1 {
                views.resize(slot - 1, None);
            }
            views.push(tex.view);
        }
        views
    }

    /// Makes sure the Shadow is an RGBA8 UAV/SRV texture of `width × height` and returns it.
    pub fn ensure_shadow<D: D3D11Device + ?Sized>(
        &mut self,
        device: &D,
        width: u32,
        height: u32,
    ) -> Result<ShadowBuffer, EngineError> {
        let plan = self.core.plan_shadow(width, height, None);
        match (plan, self.shadow) {
            (ShadowPlan::Reuse, Some(shadow)) => return Ok(shadow),
            (_, Some(old)) => old.release(device),
            (_, None) => {}
        }
        self.shadow = None;

        let shadow = ShadowBuffer::create(device, width, height).map_err(|e| {
            self.core.clear_shadow();
            EngineError::DeviceCreate(format!("shadow texture: {e}"))
        })?;
        self.shadow = Some(shadow);

        tracing::debug!(key = %self.key, width, height, groups = ?self.core.dispatch_groups(), "shadow recreated");
        Ok(shadow)
    }

    /// Releases the constant buffers and Shadow, handing the effect back for release.
    pub(crate) fn destroy<D: D3D11Device + ?Sized>(mut self, device: &D) -> (String, Rc<D3D11Effect>) {
        for (_, b) in std::mem::take(&mut self.buffers) {
            device.release(b);
        }
        if let Some(shadow) = self.shadow.take() {
            shadow.release(device);
        }
        (self.key, self.effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockD3D11};
    use fcs_runtime::container::{BlockType, Container, ContainerBuilder};

    fn effect(device: &MockD3D11) -> Rc<D3D11Effect> {
        let bytes = ContainerBuilder::new(1)
            .block(BlockType::DxbcCompute, b"DXBC....".to_vec())
            .raw_block(
                BlockType::Metadata.code(),
                r#"{
                    "Buffers": [
                        { "Name": "A", "Slot": 0, "TotalSize": 16, "Variables": { "Gain": { "Offset": 4, "Size": 4 } } },
                        { "Name": "B", "Slot": 2, "TotalSize": 20, "Variables": {} }
                    ],
                    "ThreadX": 16, "ThreadY": 16
                }"#,
            )
            .build();
        let container = Container::parse(&bytes).expect("container parses");
        Rc::new(D3D11Effect::new(device, &container).expect("effect"))
    }

    fn updates(device: &MockD3D11) -> Vec<usize> {
        device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateSubresource { len, .. } => Some(len),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn buffers_are_created_eagerly_and_padded() {
        let device = MockD3D11::new();
        let m = D3D11Material::new(&device, "fx".into(), effect(&device), None, [16, 16, 1]).expect("material");
        assert_eq!(device.buffer_desc(m.constant_buffer(2).expect("slot 2")).map(|d| d.byte_width), Some(32));
        assert_eq!(m.constant_buffer_bindings().len(), 3);
        assert_eq!(m.constant_buffer_bindings()[1], None);
    }

    #[test]
    fn sync_updates_only_dirty_slots() {
        let device = MockD3D11::new();
        let mut m = D3D11Material::new(&device, "fx".into(), effect(&device), None, [16, 16, 1]).expect("material");

        m.sync_to_device(&device);
        assert_eq!(updates(&device), vec![16, 32]);

        device.clear_calls();
        m.set("Gain", 2.0f32).expect("set gain");
        m.sync_to_device(&device);
        assert_eq!(updates(&device), vec![16]);
    }

    #[test]
    fn auxiliary_views_line_up_with_their_registers() {
        let device = MockD3D11::new();
        let mut m = D3D11Material::new(&device, "fx".into(), effect(&device), None, [16, 16, 1]).expect("material");
        assert!(m.auxiliary_views().is_empty());

        let mask = D3D11Texture::new(Handle(0x50), Some(Handle(0x51)), 8, 8);
        m.set_texture(1, Some(mask));
        assert_eq!(m.auxiliary_views(), vec![Some(Handle(0x51))]);

        m.set_texture(1, None);
        m.set_texture(3, Some(mask));
        assert_eq!(m.auxiliary_views(), vec![None, None, Some(Handle(0x51))]);
        assert_eq!(m.binding_slot_count(), 4);
    }

    #[test]
    fn binding_slot_count_covers_the_highest_constant_buffer() {
        let device = MockD3D11::new();
        let m = D3D11Material::new(&device, "fx".into(), effect(&device), None, [16, 16, 1]).expect("material");
        assert_eq!(m.binding_slot_count(), 3);
    }

    #[test]
    fn shadow_groups_round_up() {
        let device = MockD3D11::new();
        let mut m = D3D11Material::new(&device, "fx".into(), effect(&device), None, [8, 8, 1]).expect("material");
        let first = m.ensure_shadow(&device, 100, 50).expect("shadow");
        assert_eq!(m.dispatch_groups(), [7, 4, 1]);
        assert_eq!(m.ensure_shadow(&device, 100, 50).expect("reuse"), first);

        let before = device.live_objects();
        let second = m.ensure_shadow(&device, 32, 32).expect("resize");
        assert_ne!(first.texture, second.texture);
        assert_eq!(device.live_objects(), before, "old texture and views released");
    }

    #[test]
    fn destroy_releases_device_objects() {
        let device = MockD3D11::new();
        let fx = effect(&device);
        let mut m = D3D11Material::new(&device, "fx".into(), Rc::clone(&fx), None, [16, 16, 1]).expect("material");
        m.ensure_shadow(&device, 8, 8).expect("shadow");
        let (key, effect) = m.destroy(&device);
        assert_eq!(key, "fx");
        effect.destroy(&device);
        assert_eq!(device.live_objects(), 0);
    }
}
