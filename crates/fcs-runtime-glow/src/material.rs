//! GL material: a shared [`GlEffect`] plus per-instance uniform buffers and the compute Shadow.

use std::collections::BTreeMap;
use std::rc::Rc;

use fcs_core::EngineError;
use fcs_runtime::driver::HostTexture;
use fcs_runtime::layout::VertexLayout;
use fcs_runtime::material::{MaterialCore, Parameter, ParamValue, ShadowExtent, ShadowPlan};
use fcs_runtime::packer::VertexWriter;

use crate::device::{GlDevice, GlName};
use crate::effect::GlEffect;
use crate::snapshot::BindingFootprint;

/// A host texture by GL name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTexture {
    pub name: GlName,
    pub width: u32,
    pub height: u32,
}

impl GlTexture {
    pub fn new(name: GlName, width: u32, height: u32) -> Self {
        Self { name, width, height }
    }
}

impl HostTexture for GlTexture {
    fn sort_handle(&self) -> u64 {
        u64::from(self.name)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug)]
pub struct GlMaterial {
    key: String,
    effect: Rc<GlEffect>,
    core: MaterialCore<GlTexture>,
    writer: Option<Rc<VertexWriter>>,
    ubos: BTreeMap<u32, GlName>,
    shadow: Option<GlName>,
}

impl GlMaterial {
    pub(crate) fn new(
        key: String,
        effect: Rc<GlEffect>,
        writer: Option<Rc<VertexWriter>>,
        default_threads: [u32; 3],
    ) -> Self {
        let core = MaterialCore::new(effect.metadata(), default_threads);
        Self {
            key,
            effect,
            core,
            writer,
            ubos: BTreeMap::new(),
            shadow: None,
        }
    }

    /// Cache key of the effect this material instantiates.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn effect(&self) -> &GlEffect {
        &self.effect
    }

    pub fn core(&self) -> &MaterialCore<GlTexture> {
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

    /// Auxiliary texture for unit `slot` (slot 0 is always the draw's source).
    pub fn set_texture(&mut self, slot: usize, texture: Option<GlTexture>) {
        self.core.set_texture(slot, texture);
    }

    pub fn program(&self) -> Option<GlName> {
        self.effect.program()
    }

    pub fn compute_program(&self) -> Option<GlName> {
        self.effect.compute_program()
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

    pub fn ubo(&self, slot: u32) -> Option<GlName> {
        self.ubos.get(&slot).copied()
    }

    pub fn shadow(&self) -> Option<GlName> {
        self.shadow
    }

    pub fn shadow_extent(&self) -> Option<ShadowExtent> {
        self.core.shadow_extent()
    }

    pub fn dispatch_groups(&self) -> [u32; 3] {
        self.core.dispatch_groups()
    }

    /// Texture units and uniform-buffer slots this material binds while drawing.
    pub fn binding_footprint(&self) -> BindingFootprint {
        BindingFootprint {
            texture_units: self.core.texture_slot_count().max(1) as u32,
            uniform_slots: self.core.slots().collect(),
        }
    }

    /// Uploads every dirty mirror into its uniform buffer, creating buffers on first use.
    pub fn sync_to_device<D: GlDevice + ?Sized>(&mut self, gl: &D) -> Result<(), EngineError> {
        let dirty = self.core.take_dirty();
        if dirty.is_empty() {
            return Ok(());
        }

        let mut result = Ok(());
        for slot in dirty {
            let ubo = match self.ubos.get(&slot) {
                Some(&ubo) => ubo,
                None => match gl.create_buffer() {
                    Ok(ubo) => {
                        self.ubos.insert(slot, ubo);
                        ubo
                    }
                    Err(e) => {
                        result = Err(EngineError::GlCreate(format!(
                            "uniform buffer for slot {slot}: {e}"
                        )));
                        break;
                    }
                },
            };
            if let Some(bytes) = self.core.mirror(slot) {
                gl.bind_buffer(glow::UNIFORM_BUFFER, ubo);
                gl.buffer_data(glow::UNIFORM_BUFFER, bytes, glow::DYNAMIC_DRAW);
            }
        }
        gl.bind_buffer(glow::UNIFORM_BUFFER, 0);

        if result.is_err() {
            self.core.mark_all_dirty();
        }
        result
    }

    /// Binds every uniform buffer at its declared slot.
    pub fn bind_uniform_buffers<D: GlDevice + ?Sized>(&self, gl: &D) {
        for (&slot, &ubo) in &self.ubos {
            gl.bind_buffer_base(glow::UNIFORM_BUFFER, slot, ubo);
        }
    }

    /// Binds auxiliary textures to units 1.. and points the sampler uniforms at their units.
    /// Leaves unit 0 active.
    pub fn bind_auxiliary_textures<D: GlDevice + ?Sized>(&self, gl: &D) {
        for (slot, tex) in self.core.auxiliary_textures() {
            gl.active_texture(glow::TEXTURE0 + slot as u32);
            gl.bind_texture(tex.name);
        }
        gl.active_texture(glow::TEXTURE0);
    }

    pub fn bind_sampler_uniforms<D: GlDevice + ?Sized>(&self, gl: &D) {
        for s in self.effect.samplers() {
            gl.uniform_1_i32(s.location, s.unit as i32);
        }
    }

    /// Makes sure the Shadow is an RGBA8 texture of `width × height` and returns it.
    pub fn ensure_shadow<D: GlDevice + ?Sized>(
        &mut self,
        gl: &D,
        width: u32,
        height: u32,
        depth: Option<u32>,
    ) -> Result<GlName, EngineError> {
        let plan = self.core.plan_shadow(width, height, depth);
        match (plan, self.shadow) {
            (ShadowPlan::Reuse, Some(tex)) => return Ok(tex),
            (_, Some(old)) => gl.delete_texture(old),
            (_, None) => {}
        }
        self.shadow = None;

        let tex = gl.create_texture().map_err(|e| {
            self.core.clear_shadow();
            EngineError::GlCreate(format!("shadow texture: {e}"))
        })?;
        gl.bind_texture(tex);
        gl.tex_image_2d_rgba8(width, height);
        gl.tex_parameter_i32(glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        self.shadow = Some(tex);

        tracing::debug!(key = %self.key, width, height, groups = ?self.core.dispatch_groups(), "shadow recreated");
        Ok(tex)
    }

    /// Deletes the uniform buffers and Shadow, handing the effect back for release.
    pub(crate) fn destroy<D: GlDevice + ?Sized>(mut self, gl: &D) -> (String, Rc<GlEffect>) {
        for (_, ubo) in std::mem::take(&mut self.ubos) {
            gl.delete_buffer(ubo);
        }
        if let Some(tex) = self.shadow.take() {
            gl.delete_texture(tex);
        }
        (self.key, self.effect)
    }
}
