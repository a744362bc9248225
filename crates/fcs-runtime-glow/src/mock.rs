//! Recording GL model for tests.
//!
//! Tracks the bindings and toggles the snapshot reads, hands out object names, and logs the
//! calls tests assert on.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::device::{ActiveVariable, GlDevice, GlName};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UseProgram(GlName),
    BindFramebuffer(GlName),
    FramebufferTexture(GlName),
    Viewport([i32; 4]),
    BindTexture { unit: u32, texture: GlName },
    BindSampler { unit: u32, sampler: GlName },
    Uniform1 { location: u32, value: i32 },
    BlockBinding { program: GlName, index: u32, binding: u32 },
    BindBufferBase { index: u32, buffer: GlName },
    BufferData { target: u32, len: usize },
    BufferSubData { target: u32, offset: usize, len: usize },
    AttribPointer { index: u32, components: i32, data_type: u32, stride: i32, offset: i32 },
    BindImage { unit: u32, texture: GlName },
    Dispatch([u32; 3]),
    Barrier(u32),
    CopyImage { src: GlName, dst: GlName, width: u32, height: u32 },
    DrawArrays { vao: GlName, first: i32, count: i32 },
    BlendFunc([u32; 4]),
    StencilOp([u32; 3]),
    CullFace(u32),
    PolygonMode(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Object {
    Buffer,
    VertexArray,
    Framebuffer,
    Texture,
    Sampler,
    Shader,
    Program,
}

#[derive(Debug, Clone, Default)]
struct Model {
    ints: HashMap<u32, i32>,
    viewport: [i32; 4],
    color_mask: [bool; 4],
    polygon_mode: u32,
    enabled: BTreeSet<u32>,
    /// `glGetIntegeri_v` state keyed by `(pname, index)`.
    indexed: HashMap<(u32, u32), i32>,
    blend_color: [f32; 4],
    active_texture: u32,
    unit_textures: HashMap<u32, GlName>,
    unit_samplers: HashMap<u32, GlName>,
    live: BTreeMap<GlName, Object>,
}

#[derive(Debug)]
pub struct MockGl {
    model: RefCell<Model>,
    calls: RefCell<Vec<Call>>,
    next_name: Cell<GlName>,
    compile_failures: RefCell<HashMap<u32, String>>,
    shader_kinds: RefCell<HashMap<GlName, u32>>,
    link_failure: RefCell<Option<String>>,
    attributes: RefCell<Vec<ActiveVariable>>,
    uniforms: RefCell<Vec<ActiveVariable>>,
    blocks: RefCell<Vec<String>>,
    fail_buffers: Cell<bool>,
}

impl MockGl {
    /// A context that already carries host state, so restores are observable.
    pub fn new() -> Self {
        let mut model = Model {
            viewport: [0, 0, 800, 600],
            color_mask: [true; 4],
            polygon_mode: glow::FILL,
            active_texture: glow::TEXTURE0 + 2,
            ..Model::default()
        };
        model.ints.extend([
            (glow::DRAW_FRAMEBUFFER_BINDING, 5),
            (glow::VERTEX_ARRAY_BINDING, 4),
            (glow::ARRAY_BUFFER_BINDING, 6),
            (glow::CURRENT_PROGRAM, 8),
            (glow::DEPTH_WRITEMASK, 1),
            (glow::DEPTH_FUNC, glow::LESS as i32),
            (glow::BLEND_SRC_RGB, glow::ONE as i32),
            (glow::BLEND_DST_RGB, glow::ZERO as i32),
            (glow::BLEND_SRC_ALPHA, glow::ONE as i32),
            (glow::BLEND_DST_ALPHA, glow::ZERO as i32),
            (glow::BLEND_EQUATION_RGB, glow::FUNC_ADD as i32),
            (glow::BLEND_EQUATION_ALPHA, glow::FUNC_ADD as i32),
            (glow::CULL_FACE_MODE, glow::BACK as i32),
            (glow::STENCIL_FUNC, glow::ALWAYS as i32),
            (glow::STENCIL_VALUE_MASK, -1),
            (glow::STENCIL_WRITEMASK, -1),
            (glow::STENCIL_FAIL, glow::KEEP as i32),
            (glow::STENCIL_PASS_DEPTH_FAIL, glow::KEEP as i32),
            (glow::STENCIL_PASS_DEPTH_PASS, glow::KEEP as i32),
            (glow::UNIFORM_BUFFER_BINDING, 9),
        ]);
        model.indexed.extend([
            ((glow::IMAGE_BINDING_ACCESS, 0), glow::READ_ONLY as i32),
            ((glow::IMAGE_BINDING_FORMAT, 0), glow::R8 as i32),
        ]);
        model.enabled.insert(glow::SCISSOR_TEST);
        model.unit_textures.insert(glow::TEXTURE0, 11);

        Self {
            model: RefCell::new(model),
            calls: RefCell::new(Vec::new()),
            next_name: Cell::new(100),
            compile_failures: RefCell::new(HashMap::new()),
            shader_kinds: RefCell::new(HashMap::new()),
            link_failure: RefCell::new(None),
            attributes: RefCell::new(Vec::new()),
            uniforms: RefCell::new(Vec::new()),
            blocks: RefCell::new(Vec::new()),
            fail_buffers: Cell::new(false),
        }
    }

    pub fn fail_compile(&self, kind: u32, log: &str) {
        self.compile_failures.borrow_mut().insert(kind, log.to_string());
    }

    pub fn fail_link(&self, log: &str) {
        *self.link_failure.borrow_mut() = Some(log.to_string());
    }

    /// Attributes every linked program reports: `(name, gl type, location)`.
    pub fn set_attributes(&self, attributes: &[(&str, u32, u32)]) {
        *self.attributes.borrow_mut() = attributes
            .iter()
            .map(|&(name, gl_type, location)| ActiveVariable {
                name: name.to_string(),
                gl_type,
                size: 1,
                location: Some(location),
            })
            .collect();
    }

    /// Uniforms every linked program reports: `(name, gl type, location)`.
    pub fn set_uniforms(&self, uniforms: &[(&str, u32, u32)]) {
        *self.uniforms.borrow_mut() = uniforms
            .iter()
            .map(|&(name, gl_type, location)| ActiveVariable {
                name: name.to_string(),
                gl_type,
                size: 1,
                location: Some(location),
            })
            .collect();
    }

    pub fn set_uniform_blocks(&self, names: &[&str]) {
        *self.blocks.borrow_mut() = names.iter().map(|n| n.to_string()).collect();
    }

    /// Every later `create_buffer` fails.
    pub fn fail_buffer_creation(&self) {
        self.fail_buffers.set(true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn draws(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::DrawArrays { .. }))
            .collect()
    }

    fn count_live(&self, kind: Object) -> usize {
        self.model.borrow().live.values().filter(|&&k| k == kind).count()
    }

    pub fn live_shaders(&self) -> usize {
        self.count_live(Object::Shader)
    }

    pub fn live_programs(&self) -> usize {
        self.count_live(Object::Program)
    }

    pub fn live_buffers(&self) -> usize {
        self.count_live(Object::Buffer)
    }

    pub fn live_textures(&self) -> usize {
        self.count_live(Object::Texture)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn create(&self, kind: Object) -> Result<GlName, String> {
        let name = self.next_name.get();
        self.next_name.set(name + 1);
        self.model.borrow_mut().live.insert(name, kind);
        Ok(name)
    }

    fn delete(&self, name: GlName) {
        self.model.borrow_mut().live.remove(&name);
    }

    fn set_int(&self, pname: u32, value: i32) {
        self.model.borrow_mut().ints.insert(pname, value);
    }
}

impl GlDevice for MockGl {
    fn get_integer(&self, pname: u32) -> i32 {
        let m = self.model.borrow();
        match pname {
            glow::ACTIVE_TEXTURE => m.active_texture as i32,
            glow::TEXTURE_BINDING_2D => m.unit_textures.get(&m.active_texture).copied().unwrap_or(0) as i32,
            glow::SAMPLER_BINDING => m.unit_samplers.get(&m.active_texture).copied().unwrap_or(0) as i32,
            other => m.ints.get(&other).copied().unwrap_or(0),
        }
    }

    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32 {
        self.model.borrow().indexed.get(&(pname, index)).copied().unwrap_or(0)
    }

    fn get_float_v(&self, pname: u32, out: &mut [f32]) {
        let m = self.model.borrow();
        match pname {
            glow::BLEND_COLOR => out.copy_from_slice(&m.blend_color[..out.len()]),
            _ => out.fill(0.0),
        }
    }

    fn get_integer_v(&self, pname: u32, out: &mut [i32]) {
        let m = self.model.borrow();
        match pname {
            glow::VIEWPORT => out.copy_from_slice(&m.viewport[..out.len()]),
            glow::COLOR_WRITEMASK => {
                for (o, c) in out.iter_mut().zip(m.color_mask) {
                    *o = c as i32;
                }
            }
            glow::POLYGON_MODE => out.fill(m.polygon_mode as i32),
            _ => out.fill(0),
        }
    }

    fn is_enabled(&self, cap: u32) -> bool {
        self.model.borrow().enabled.contains(&cap)
    }

    fn set_enabled(&self, cap: u32, on: bool) {
        let mut m = self.model.borrow_mut();
        if on {
            m.enabled.insert(cap);
        } else {
            m.enabled.remove(&cap);
        }
    }

    fn create_buffer(&self) -> Result<GlName, String> {
        if self.fail_buffers.get() {
            return Err("out of memory".to_string());
        }
        self.create(Object::Buffer)
    }

    fn delete_buffer(&self, name: GlName) {
        self.delete(name);
    }

    fn create_vertex_array(&self) -> Result<GlName, String> {
        self.create(Object::VertexArray)
    }

    fn delete_vertex_array(&self, name: GlName) {
        self.delete(name);
    }

    fn create_framebuffer(&self) -> Result<GlName, String> {
        self.create(Object::Framebuffer)
    }

    fn delete_framebuffer(&self, name: GlName) {
        self.delete(name);
    }

    fn create_texture(&self) -> Result<GlName, String> {
        self.create(Object::Texture)
    }

    fn delete_texture(&self, name: GlName) {
        self.delete(name);
    }

    fn create_sampler(&self) -> Result<GlName, String> {
        self.create(Object::Sampler)
    }

    fn delete_sampler(&self, name: GlName) {
        self.delete(name);
    }

    fn create_shader(&self, kind: u32) -> Result<GlName, String> {
        let name = self.create(Object::Shader)?;
        self.shader_kinds.borrow_mut().insert(name, kind);
        Ok(name)
    }

    fn shader_source(&self, _shader: GlName, _source: &str) {}

    fn compile_shader(&self, _shader: GlName) {}

    fn shader_compile_status(&self, shader: GlName) -> bool {
        let kind = self.shader_kinds.borrow().get(&shader).copied();
        kind.map_or(true, |k| !self.compile_failures.borrow().contains_key(&k))
    }

    fn shader_info_log(&self, shader: GlName) -> String {
        let kind = self.shader_kinds.borrow().get(&shader).copied();
        kind.and_then(|k| self.compile_failures.borrow().get(&k).cloned())
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: GlName) {
        self.delete(shader);
    }

    fn create_program(&self) -> Result<GlName, String> {
        self.create(Object::Program)
    }

    fn attach_shader(&self, _program: GlName, _shader: GlName) {}

    fn detach_shader(&self, _program: GlName, _shader: GlName) {}

    fn link_program(&self, _program: GlName) {}

    fn program_link_status(&self, _program: GlName) -> bool {
        self.link_failure.borrow().is_none()
    }

    fn program_info_log(&self, _program: GlName) -> String {
        self.link_failure.borrow().clone().unwrap_or_default()
    }

    fn delete_program(&self, program: GlName) {
        self.delete(program);
    }

    fn use_program(&self, program: GlName) {
        self.set_int(glow::CURRENT_PROGRAM, program as i32);
        self.record(Call::UseProgram(program));
    }

    fn active_attributes(&self, _program: GlName) -> Vec<ActiveVariable> {
        self.attributes.borrow().clone()
    }

    fn active_uniforms(&self, _program: GlName) -> Vec<ActiveVariable> {
        self.uniforms.borrow().clone()
    }

    fn uniform_block_index(&self, _program: GlName, name: &str) -> Option<u32> {
        self.blocks
            .borrow()
            .iter()
            .position(|b| b == name)
            .map(|i| i as u32)
    }

    fn uniform_block_binding(&self, program: GlName, index: u32, binding: u32) {
        self.record(Call::BlockBinding {
            program,
            index,
            binding,
        });
    }

    fn bind_buffer(&self, target: u32, buffer: GlName) {
        match target {
            glow::ARRAY_BUFFER => self.set_int(glow::ARRAY_BUFFER_BINDING, buffer as i32),
            glow::UNIFORM_BUFFER => self.set_int(glow::UNIFORM_BUFFER_BINDING, buffer as i32),
            _ => {}
        }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: GlName) {
        if target == glow::UNIFORM_BUFFER {
            self.set_int(glow::UNIFORM_BUFFER_BINDING, buffer as i32);
            self.model
                .borrow_mut()
                .indexed
                .insert((glow::UNIFORM_BUFFER_BINDING, index), buffer as i32);
        }
        self.record(Call::BindBufferBase { index, buffer });
    }

    fn buffer_data_size(&self, target: u32, size: usize, _usage: u32) {
        self.record(Call::BufferData { target, len: size });
    }

    fn buffer_data(&self, target: u32, bytes: &[u8], _usage: u32) {
        self.record(Call::BufferData {
            target,
            len: bytes.len(),
        });
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, bytes: &[u8]) {
        self.record(Call::BufferSubData {
            target,
            offset,
            len: bytes.len(),
        });
    }

    fn bind_vertex_array(&self, vao: GlName) {
        self.set_int(glow::VERTEX_ARRAY_BINDING, vao as i32);
    }

    fn enable_vertex_attrib_array(&self, _index: u32) {}

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        components: i32,
        data_type: u32,
        _normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.record(Call::AttribPointer {
            index,
            components,
            data_type,
            stride,
            offset,
        });
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, components: i32, data_type: u32, stride: i32, offset: i32) {
        self.record(Call::AttribPointer {
            index,
            components,
            data_type,
            stride,
            offset,
        });
    }

    fn active_texture(&self, unit: u32) {
        self.model.borrow_mut().active_texture = unit;
    }

    fn bind_texture(&self, texture: GlName) {
        let unit = {
            let mut m = self.model.borrow_mut();
            let unit = m.active_texture;
            m.unit_textures.insert(unit, texture);
            unit
        };
        self.record(Call::BindTexture {
            unit: unit - glow::TEXTURE0,
            texture,
        });
    }

    fn tex_image_2d_rgba8(&self, _width: u32, _height: u32) {}

    fn tex_parameter_i32(&self, _pname: u32, _value: i32) {}

    fn bind_sampler(&self, unit: u32, sampler: GlName) {
        self.model
            .borrow_mut()
            .unit_samplers
            .insert(glow::TEXTURE0 + unit, sampler);
        self.record(Call::BindSampler { unit, sampler });
    }

    fn sampler_parameter_i32(&self, _sampler: GlName, _pname: u32, _value: i32) {}

    fn sampler_parameter_f32(&self, _sampler: GlName, _pname: u32, _value: f32) {}

    fn uniform_1_i32(&self, location: u32, value: i32) {
        self.record(Call::Uniform1 { location, value });
    }

    fn bind_image_texture(&self, unit: u32, texture: GlName, access: u32, format: u32) {
        self.model.borrow_mut().indexed.extend([
            ((glow::IMAGE_BINDING_NAME, unit), texture as i32),
            ((glow::IMAGE_BINDING_ACCESS, unit), access as i32),
            ((glow::IMAGE_BINDING_FORMAT, unit), format as i32),
        ]);
        self.record(Call::BindImage { unit, texture });
    }

    fn copy_image_sub_data(&self, src: GlName, dst: GlName, width: u32, height: u32) {
        self.record(Call::CopyImage {
            src,
            dst,
            width,
            height,
        });
    }

    fn bind_framebuffer(&self, framebuffer: GlName) {
        self.set_int(glow::DRAW_FRAMEBUFFER_BINDING, framebuffer as i32);
        self.record(Call::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&self, texture: GlName) {
        self.record(Call::FramebufferTexture(texture));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.model.borrow_mut().viewport = [x, y, width, height];
        self.record(Call::Viewport([x, y, width, height]));
    }

    fn blend_color(&self, rgba: [f32; 4]) {
        self.model.borrow_mut().blend_color = rgba;
    }

    fn blend_equation_separate(&self, color: u32, alpha: u32) {
        self.set_int(glow::BLEND_EQUATION_RGB, color as i32);
        self.set_int(glow::BLEND_EQUATION_ALPHA, alpha as i32);
    }

    fn blend_func_separate(&self, src_color: u32, dst_color: u32, src_alpha: u32, dst_alpha: u32) {
        self.set_int(glow::BLEND_SRC_RGB, src_color as i32);
        self.set_int(glow::BLEND_DST_RGB, dst_color as i32);
        self.set_int(glow::BLEND_SRC_ALPHA, src_alpha as i32);
        self.set_int(glow::BLEND_DST_ALPHA, dst_alpha as i32);
        self.record(Call::BlendFunc([src_color, dst_color, src_alpha, dst_alpha]));
    }

    fn color_mask(&self, mask: [bool; 4]) {
        self.model.borrow_mut().color_mask = mask;
    }

    fn depth_mask(&self, write: bool) {
        self.set_int(glow::DEPTH_WRITEMASK, write as i32);
    }

    fn depth_func(&self, func: u32) {
        self.set_int(glow::DEPTH_FUNC, func as i32);
    }

    fn stencil_mask(&self, mask: u32) {
        self.set_int(glow::STENCIL_WRITEMASK, mask as i32);
    }

    fn stencil_func(&self, func: u32, reference: i32, mask: u32) {
        self.set_int(glow::STENCIL_FUNC, func as i32);
        self.set_int(glow::STENCIL_REF, reference);
        self.set_int(glow::STENCIL_VALUE_MASK, mask as i32);
    }

    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32) {
        self.set_int(glow::STENCIL_FAIL, fail as i32);
        self.set_int(glow::STENCIL_PASS_DEPTH_FAIL, depth_fail as i32);
        self.set_int(glow::STENCIL_PASS_DEPTH_PASS, pass as i32);
        self.record(Call::StencilOp([fail, depth_fail, pass]));
    }

    fn cull_face(&self, face: u32) {
        self.set_int(glow::CULL_FACE_MODE, face as i32);
        self.record(Call::CullFace(face));
    }

    fn polygon_mode(&self, mode: u32) {
        self.model.borrow_mut().polygon_mode = mode;
        self.record(Call::PolygonMode(mode));
    }

    fn draw_arrays(&self, _mode: u32, first: i32, count: i32) {
        let vao = self.get_integer(glow::VERTEX_ARRAY_BINDING) as GlName;
        self.record(Call::DrawArrays { vao, first, count });
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        self.record(Call::Dispatch([x, y, z]));
    }

    fn memory_barrier(&self, barriers: u32) {
        self.record(Call::Barrier(barriers));
    }
}
