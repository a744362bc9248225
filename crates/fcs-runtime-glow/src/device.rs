//! The slice of OpenGL the driver touches.
//!
//! Object names are plain `u32` with `0` meaning "none", the same convention GL queries report
//! bindings in. Enum arguments are raw GL values (`glow::*` constants).
#![allow(clippy::too_many_arguments)]

use std::num::NonZeroU32;

use glow::HasContext;

/// GL object name; `0` is the null object.
pub type GlName = u32;

/// An active attribute or uniform as reported by program introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub gl_type: u32,
    pub size: i32,
    /// Attribute location or uniform location; `None` for built-ins and inactive names.
    pub location: Option<u32>,
}

/// Narrow device seam. `glow::Context` implements it; tests use a recording model.
pub trait GlDevice {
    // ---- queries ----
    fn get_integer(&self, pname: u32) -> i32;
    fn get_integer_v(&self, pname: u32, out: &mut [i32]);
    /// Indexed binding query (`glGetIntegeri_v`), e.g. `UNIFORM_BUFFER_BINDING` per slot.
    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32;
    fn get_float_v(&self, pname: u32, out: &mut [f32]);
    fn is_enabled(&self, cap: u32) -> bool;
    fn set_enabled(&self, cap: u32, on: bool);

    // ---- object lifetime ----
    fn create_buffer(&self) -> Result<GlName, String>;
    fn delete_buffer(&self, name: GlName);
    fn create_vertex_array(&self) -> Result<GlName, String>;
    fn delete_vertex_array(&self, name: GlName);
    fn create_framebuffer(&self) -> Result<GlName, String>;
    fn delete_framebuffer(&self, name: GlName);
    fn create_texture(&self) -> Result<GlName, String>;
    fn delete_texture(&self, name: GlName);
    fn create_sampler(&self) -> Result<GlName, String>;
    fn delete_sampler(&self, name: GlName);

    // ---- shaders ----
    fn create_shader(&self, kind: u32) -> Result<GlName, String>;
    fn shader_source(&self, shader: GlName, source: &str);
    fn compile_shader(&self, shader: GlName);
    fn shader_compile_status(&self, shader: GlName) -> bool;
    fn shader_info_log(&self, shader: GlName) -> String;
    fn delete_shader(&self, shader: GlName);
    fn create_program(&self) -> Result<GlName, String>;
    fn attach_shader(&self, program: GlName, shader: GlName);
    fn detach_shader(&self, program: GlName, shader: GlName);
    fn link_program(&self, program: GlName);
    fn program_link_status(&self, program: GlName) -> bool;
    fn program_info_log(&self, program: GlName) -> String;
    fn delete_program(&self, program: GlName);
    fn use_program(&self, program: GlName);

    // ---- introspection ----
    fn active_attributes(&self, program: GlName) -> Vec<ActiveVariable>;
    fn active_uniforms(&self, program: GlName) -> Vec<ActiveVariable>;
    fn uniform_block_index(&self, program: GlName, name: &str) -> Option<u32>;
    fn uniform_block_binding(&self, program: GlName, index: u32, binding: u32);

    // ---- buffers and vertex arrays ----
    fn bind_buffer(&self, target: u32, buffer: GlName);
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: GlName);
    fn buffer_data_size(&self, target: u32, size: usize, usage: u32);
    fn buffer_data(&self, target: u32, bytes: &[u8], usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: usize, bytes: &[u8]);
    fn bind_vertex_array(&self, vao: GlName);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        components: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_pointer_i32(&self, index: u32, components: i32, data_type: u32, stride: i32, offset: i32);

    // ---- textures, samplers, images ----
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, texture: GlName);
    fn tex_image_2d_rgba8(&self, width: u32, height: u32);
    fn tex_parameter_i32(&self, pname: u32, value: i32);
    fn bind_sampler(&self, unit: u32, sampler: GlName);
    fn sampler_parameter_i32(&self, sampler: GlName, pname: u32, value: i32);
    fn sampler_parameter_f32(&self, sampler: GlName, pname: u32, value: f32);
    fn uniform_1_i32(&self, location: u32, value: i32);
    fn bind_image_texture(&self, unit: u32, texture: GlName, access: u32, format: u32);
    fn copy_image_sub_data(&self, src: GlName, dst: GlName, width: u32, height: u32);

    // ---- framebuffers ----
    fn bind_framebuffer(&self, framebuffer: GlName);
    fn framebuffer_texture_2d(&self, texture: GlName);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);

    // ---- fixed function ----
    fn blend_color(&self, rgba: [f32; 4]);
    fn blend_equation_separate(&self, color: u32, alpha: u32);
    fn blend_func_separate(&self, src_color: u32, dst_color: u32, src_alpha: u32, dst_alpha: u32);
    fn color_mask(&self, mask: [bool; 4]);
    fn depth_mask(&self, write: bool);
    fn depth_func(&self, func: u32);
    fn stencil_mask(&self, mask: u32);
    fn stencil_func(&self, func: u32, reference: i32, mask: u32);
    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32);
    fn cull_face(&self, face: u32);
    fn polygon_mode(&self, mode: u32);

    // ---- execution ----
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn dispatch_compute(&self, x: u32, y: u32, z: u32);
    fn memory_barrier(&self, barriers: u32);
}

fn nz(name: GlName) -> Option<NonZeroU32> {
    NonZeroU32::new(name)
}

fn raw<T>(r: Result<T, String>, name: impl Fn(T) -> NonZeroU32) -> Result<GlName, String> {
    r.map(|v| name(v).get())
}

// The host owns the context and keeps it current on this thread for as long as the driver
// lives. Every call below relies on that.
impl GlDevice for glow::Context {
    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.get_parameter_i32(pname) }
    }

    fn get_integer_v(&self, pname: u32, out: &mut [i32]) {
        unsafe { self.get_parameter_i32_slice(pname, out) }
    }

    fn get_integer_indexed(&self, pname: u32, index: u32) -> i32 {
        unsafe { self.get_parameter_indexed_i32(pname, index) }
    }

    fn get_float_v(&self, pname: u32, out: &mut [f32]) {
        unsafe { self.get_parameter_f32_slice(pname, out) }
    }

    fn is_enabled(&self, cap: u32) -> bool {
        unsafe { HasContext::is_enabled(self, cap) }
    }

    fn set_enabled(&self, cap: u32, on: bool) {
        unsafe {
            if on {
                self.enable(cap);
            } else {
                self.disable(cap);
            }
        }
    }

    fn create_buffer(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_buffer(self) }, |b| b.0)
    }

    fn delete_buffer(&self, name: GlName) {
        if let Some(n) = nz(name) {
            unsafe { HasContext::delete_buffer(self, glow::NativeBuffer(n)) }
        }
    }

    fn create_vertex_array(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_vertex_array(self) }, |v| v.0)
    }

    fn delete_vertex_array(&self, name: GlName) {
        if let Some(n) = nz(name) {
            unsafe { HasContext::delete_vertex_array(self, glow::NativeVertexArray(n)) }
        }
    }

    fn create_framebuffer(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_framebuffer(self) }, |f| f.0)
    }

    fn delete_framebuffer(&self, name: GlName) {
        if let Some(n) = nz(name) {
            unsafe { HasContext::delete_framebuffer(self, glow::NativeFramebuffer(n)) }
        }
    }

    fn create_texture(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_texture(self) }, |t| t.0)
    }

    fn delete_texture(&self, name: GlName) {
        if let Some(n) = nz(name) {
            unsafe { HasContext::delete_texture(self, glow::NativeTexture(n)) }
        }
    }

    fn create_sampler(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_sampler(self) }, |s| s.0)
    }

    fn delete_sampler(&self, name: GlName) {
        if let Some(n) = nz(name) {
            unsafe { HasContext::delete_sampler(self, glow::NativeSampler(n)) }
        }
    }

    fn create_shader(&self, kind: u32) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_shader(self, kind) }, |s| s.0)
    }

    fn shader_source(&self, shader: GlName, source: &str) {
        if let Some(n) = nz(shader) {
            unsafe { HasContext::shader_source(self, glow::NativeShader(n), source) }
        }
    }

    fn compile_shader(&self, shader: GlName) {
        if let Some(n) = nz(shader) {
            unsafe { HasContext::compile_shader(self, glow::NativeShader(n)) }
        }
    }

    fn shader_compile_status(&self, shader: GlName) -> bool {
        nz(shader).is_some_and(|n| unsafe { self.get_shader_compile_status(glow::NativeShader(n)) })
    }

    fn shader_info_log(&self, shader: GlName) -> String {
        nz(shader)
            .map(|n| unsafe { self.get_shader_info_log(glow::NativeShader(n)) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: GlName) {
        if let Some(n) = nz(shader) {
            unsafe { HasContext::delete_shader(self, glow::NativeShader(n)) }
        }
    }

    fn create_program(&self) -> Result<GlName, String> {
        raw(unsafe { HasContext::create_program(self) }, |p| p.0)
    }

    fn attach_shader(&self, program: GlName, shader: GlName) {
        if let (Some(p), Some(s)) = (nz(program), nz(shader)) {
            unsafe { HasContext::attach_shader(self, glow::NativeProgram(p), glow::NativeShader(s)) }
        }
    }

    fn detach_shader(&self, program: GlName, shader: GlName) {
        if let (Some(p), Some(s)) = (nz(program), nz(shader)) {
            unsafe { HasContext::detach_shader(self, glow::NativeProgram(p), glow::NativeShader(s)) }
        }
    }

    fn link_program(&self, program: GlName) {
        if let Some(p) = nz(program) {
            unsafe { HasContext::link_program(self, glow::NativeProgram(p)) }
        }
    }

    fn program_link_status(&self, program: GlName) -> bool {
        nz(program).is_some_and(|p| unsafe { self.get_program_link_status(glow::NativeProgram(p)) })
    }

    fn program_info_log(&self, program: GlName) -> String {
        nz(program)
            .map(|p| unsafe { self.get_program_info_log(glow::NativeProgram(p)) })
            .unwrap_or_default()
    }

    fn delete_program(&self, program: GlName) {
        if let Some(p) = nz(program) {
            unsafe { HasContext::delete_program(self, glow::NativeProgram(p)) }
        }
    }

    fn use_program(&self, program: GlName) {
        unsafe { HasContext::use_program(self, nz(program).map(glow::NativeProgram)) }
    }

    fn active_attributes(&self, program: GlName) -> Vec<ActiveVariable> {
        let Some(p) = nz(program).map(glow::NativeProgram) else {
            return Vec::new();
        };
        unsafe {
            (0..self.get_active_attributes(p))
                .filter_map(|i| self.get_active_attribute(p, i))
                .map(|a| ActiveVariable {
                    location: self.get_attrib_location(p, &a.name),
                    name: a.name,
                    gl_type: a.atype,
                    size: a.size,
                })
                .collect()
        }
    }

    fn active_uniforms(&self, program: GlName) -> Vec<ActiveVariable> {
        let Some(p) = nz(program).map(glow::NativeProgram) else {
            return Vec::new();
        };
        unsafe {
            (0..self.get_active_uniforms(p))
                .filter_map(|i| self.get_active_uniform(p, i))
                .map(|u| ActiveVariable {
                    location: self.get_uniform_location(p, &u.name).map(|l| l.0),
                    name: u.name,
                    gl_type: u.utype,
                    size: u.size,
                })
                .collect()
        }
    }

    fn uniform_block_index(&self, program: GlName, name: &str) -> Option<u32> {
        let p = nz(program)?;
        unsafe { self.get_uniform_block_index(glow::NativeProgram(p), name) }
    }

    fn uniform_block_binding(&self, program: GlName, index: u32, binding: u32) {
        if let Some(p) = nz(program) {
            unsafe { HasContext::uniform_block_binding(self, glow::NativeProgram(p), index, binding) }
        }
    }

    fn bind_buffer(&self, target: u32, buffer: GlName) {
        unsafe { HasContext::bind_buffer(self, target, nz(buffer).map(glow::NativeBuffer)) }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: GlName) {
        unsafe { HasContext::bind_buffer_base(self, target, index, nz(buffer).map(glow::NativeBuffer)) }
    }

    fn buffer_data_size(&self, target: u32, size: usize, usage: u32) {
        unsafe { HasContext::buffer_data_size(self, target, size as i32, usage) }
    }

    fn buffer_data(&self, target: u32, bytes: &[u8], usage: u32) {
        unsafe { self.buffer_data_u8_slice(target, bytes, usage) }
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, bytes: &[u8]) {
        unsafe { self.buffer_sub_data_u8_slice(target, offset as i32, bytes) }
    }

    fn bind_vertex_array(&self, vao: GlName) {
        unsafe { HasContext::bind_vertex_array(self, nz(vao).map(glow::NativeVertexArray)) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { HasContext::enable_vertex_attrib_array(self, index) }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        components: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            HasContext::vertex_attrib_pointer_f32(self, index, components, data_type, normalized, stride, offset)
        }
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, components: i32, data_type: u32, stride: i32, offset: i32) {
        unsafe { HasContext::vertex_attrib_pointer_i32(self, index, components, data_type, stride, offset) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { HasContext::active_texture(self, unit) }
    }

    fn bind_texture(&self, texture: GlName) {
        unsafe { HasContext::bind_texture(self, glow::TEXTURE_2D, nz(texture).map(glow::NativeTexture)) }
    }

    fn tex_image_2d_rgba8(&self, width: u32, height: u32) {
        unsafe {
            self.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            )
        }
    }

    fn tex_parameter_i32(&self, pname: u32, value: i32) {
        unsafe { HasContext::tex_parameter_i32(self, glow::TEXTURE_2D, pname, value) }
    }

    fn bind_sampler(&self, unit: u32, sampler: GlName) {
        unsafe { HasContext::bind_sampler(self, unit, nz(sampler).map(glow::NativeSampler)) }
    }

    fn sampler_parameter_i32(&self, sampler: GlName, pname: u32, value: i32) {
        if let Some(s) = nz(sampler) {
            unsafe { HasContext::sampler_parameter_i32(self, glow::NativeSampler(s), pname, value) }
        }
    }

    fn sampler_parameter_f32(&self, sampler: GlName, pname: u32, value: f32) {
        if let Some(s) = nz(sampler) {
            unsafe { HasContext::sampler_parameter_f32(self, glow::NativeSampler(s), pname, value) }
        }
    }

    fn uniform_1_i32(&self, location: u32, value: i32) {
        let location = glow::NativeUniformLocation(location);
        unsafe { HasContext::uniform_1_i32(self, Some(&location), value) }
    }

    // glow 0.13 takes a non-null texture here, so binding name 0 cannot be expressed and is
    // skipped. The unit keeps its previous image until something else is bound to it.
    fn bind_image_texture(&self, unit: u32, texture: GlName, access: u32, format: u32) {
        if let Some(t) = nz(texture) {
            unsafe {
                HasContext::bind_image_texture(self, unit, glow::NativeTexture(t), 0, false, 0, access, format)
            }
        }
    }

    fn copy_image_sub_data(&self, src: GlName, dst: GlName, width: u32, height: u32) {
        if let (Some(s), Some(d)) = (nz(src), nz(dst)) {
            unsafe {
                HasContext::copy_image_sub_data(
                    self,
                    glow::NativeTexture(s),
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    0,
                    glow::NativeTexture(d),
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    1,
                )
            }
        }
    }

    fn bind_framebuffer(&self, framebuffer: GlName) {
        unsafe {
            HasContext::bind_framebuffer(self, glow::FRAMEBUFFER, nz(framebuffer).map(glow::NativeFramebuffer))
        }
    }

    fn framebuffer_texture_2d(&self, texture: GlName) {
        unsafe {
            HasContext::framebuffer_texture_2d(
                self,
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                nz(texture).map(glow::NativeTexture),
                0,
            )
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { HasContext::viewport(self, x, y, width, height) }
    }

    fn blend_color(&self, [r, g, b, a]: [f32; 4]) {
        unsafe { HasContext::blend_color(self, r, g, b, a) }
    }

    fn blend_equation_separate(&self, color: u32, alpha: u32) {
        unsafe { HasContext::blend_equation_separate(self, color, alpha) }
    }

    fn blend_func_separate(&self, src_color: u32, dst_color: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe { HasContext::blend_func_separate(self, src_color, dst_color, src_alpha, dst_alpha) }
    }

    fn color_mask(&self, [r, g, b, a]: [bool; 4]) {
        unsafe { HasContext::color_mask(self, r, g, b, a) }
    }

    fn depth_mask(&self, write: bool) {
        unsafe { HasContext::depth_mask(self, write) }
    }

    fn depth_func(&self, func: u32) {
        unsafe { HasContext::depth_func(self, func) }
    }

    fn stencil_mask(&self, mask: u32) {
        unsafe { HasContext::stencil_mask(self, mask) }
    }

    fn stencil_func(&self, func: u32, reference: i32, mask: u32) {
        unsafe { HasContext::stencil_func(self, func, reference, mask) }
    }

    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32) {
        unsafe { HasContext::stencil_op(self, fail, depth_fail, pass) }
    }

    fn cull_face(&self, face: u32) {
        unsafe { HasContext::cull_face(self, face) }
    }

    fn polygon_mode(&self, mode: u32) {
        unsafe { HasContext::polygon_mode(self, glow::FRONT_AND_BACK, mode) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { HasContext::draw_arrays(self, mode, first, count) }
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        unsafe { HasContext::dispatch_compute(self, x, y, z) }
    }

    fn memory_barrier(&self, barriers: u32) {
        unsafe { HasContext::memory_barrier(self, barriers) }
    }
}
