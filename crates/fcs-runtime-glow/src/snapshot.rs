//! Host GL state captured at Begin and put back at End.

use crate::device::{GlDevice, GlName};

/// Binding points a material touches beyond the fixed-function state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingFootprint {
    /// Texture units `0..texture_units` (unit 0 holds the draw source).
    pub texture_units: u32,
    /// Indexed `UNIFORM_BUFFER` binding points.
    pub uniform_slots: Vec<u32>,
}

impl Default for BindingFootprint {
    fn default() -> Self {
        Self {
            texture_units: 1,
            uniform_slots: Vec::new(),
        }
    }
}

/// Image unit binding as `glGetIntegeri_v` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBinding {
    pub texture: GlName,
    pub access: u32,
    pub format: u32,
}

/// Everything the driver may disturb while drawing.
///
/// Texture units, their samplers and the uniform-buffer binding points are captured for the
/// footprint of the material bound at Begin. Image unit 0 is captured because the compute pass
/// writes the Shadow through it.
#[derive(Debug, Clone, PartialEq)]
pub struct GlStateSnapshot {
    pub framebuffer: GlName,
    pub vertex_array: GlName,
    pub array_buffer: GlName,
    pub program: GlName,
    pub viewport: [i32; 4],
    pub blend: bool,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub cull_face: bool,
    pub scissor_test: bool,
    pub depth_mask: bool,
    pub depth_func: u32,
    pub color_mask: [bool; 4],
    /// `[src_rgb, dst_rgb, src_alpha, dst_alpha]`.
    pub blend_func: [u32; 4],
    /// `[rgb, alpha]`.
    pub blend_equation: [u32; 2],
    pub blend_color: [f32; 4],
    pub stencil_func: u32,
    pub stencil_ref: i32,
    pub stencil_value_mask: u32,
    pub stencil_write_mask: u32,
    /// `[fail, depth_fail, pass]`.
    pub stencil_ops: [u32; 3],
    pub cull_face_mode: u32,
    pub polygon_mode: u32,
    pub active_texture: u32,
    /// `(texture, sampler)` per unit, starting at unit 0.
    pub units: Vec<(GlName, GlName)>,
    /// Generic `UNIFORM_BUFFER` binding.
    pub uniform_buffer: GlName,
    /// `(slot, buffer)` per indexed binding point.
    pub uniform_bindings: Vec<(u32, GlName)>,
    pub image0: ImageBinding,
}

impl GlStateSnapshot {
    pub fn capture<D: GlDevice + ?Sized>(gl: &D, footprint: &BindingFootprint) -> Self {
        let name = |pname| gl.get_integer(pname) as GlName;
        let enum_ = |pname| gl.get_integer(pname) as u32;

        let mut viewport = [0i32; 4];
        gl.get_integer_v(glow::VIEWPORT, &mut viewport);
        let mut mask = [1i32; 4];
        gl.get_integer_v(glow::COLOR_WRITEMASK, &mut mask);
        let mut polygon = [glow::FILL as i32; 2];
        gl.get_integer_v(glow::POLYGON_MODE, &mut polygon);
        let mut blend_color = [0f32; 4];
        gl.get_float_v(glow::BLEND_COLOR, &mut blend_color);

        let active_texture = enum_(glow::ACTIVE_TEXTURE);
        let units = (0..footprint.texture_units.max(1))
            .map(|unit| {
                gl.active_texture(glow::TEXTURE0 + unit);
                (name(glow::TEXTURE_BINDING_2D), name(glow::SAMPLER_BINDING))
            })
            .collect();
        gl.active_texture(active_texture);

        let uniform_bindings = footprint
            .uniform_slots
            .iter()
            .map(|&slot| (slot, gl.get_integer_indexed(glow::UNIFORM_BUFFER_BINDING, slot) as GlName))
            .collect();
        let image0 = ImageBinding {
            texture: gl.get_integer_indexed(glow::IMAGE_BINDING_NAME, 0) as GlName,
            access: gl.get_integer_indexed(glow::IMAGE_BINDING_ACCESS, 0) as u32,
            format: gl.get_integer_indexed(glow::IMAGE_BINDING_FORMAT, 0) as u32,
        };

        Self {
            framebuffer: name(glow::DRAW_FRAMEBUFFER_BINDING),
            vertex_array: name(glow::VERTEX_ARRAY_BINDING),
            array_buffer: name(glow::ARRAY_BUFFER_BINDING),
            program: name(glow::CURRENT_PROGRAM),
            viewport,
            blend: gl.is_enabled(glow::BLEND),
            depth_test: gl.is_enabled(glow::DEPTH_TEST),
            stencil_test: gl.is_enabled(glow::STENCIL_TEST),
            cull_face: gl.is_enabled(glow::CULL_FACE),
            scissor_test: gl.is_enabled(glow::SCISSOR_TEST),
            depth_mask: gl.get_integer(glow::DEPTH_WRITEMASK) != 0,
            depth_func: enum_(glow::DEPTH_FUNC),
            color_mask: mask.map(|c| c != 0),
            blend_func: [
                enum_(glow::BLEND_SRC_RGB),
                enum_(glow::BLEND_DST_RGB),
                enum_(glow::BLEND_SRC_ALPHA),
                enum_(glow::BLEND_DST_ALPHA),
            ],
            blend_equation: [enum_(glow::BLEND_EQUATION_RGB), enum_(glow::BLEND_EQUATION_ALPHA)],
            blend_color,
            stencil_func: enum_(glow::STENCIL_FUNC),
            stencil_ref: gl.get_integer(glow::STENCIL_REF),
            stencil_value_mask: enum_(glow::STENCIL_VALUE_MASK),
            stencil_write_mask: enum_(glow::STENCIL_WRITEMASK),
            stencil_ops: [
                enum_(glow::STENCIL_FAIL),
                enum_(glow::STENCIL_PASS_DEPTH_FAIL),
                enum_(glow::STENCIL_PASS_DEPTH_PASS),
            ],
            cull_face_mode: enum_(glow::CULL_FACE_MODE),
            polygon_mode: polygon[0] as u32,
            active_texture,
            units,
            uniform_buffer: name(glow::UNIFORM_BUFFER_BINDING),
            uniform_bindings,
            image0,
        }
    }

    pub fn restore<D: GlDevice + ?Sized>(&self, gl: &D) {
        gl.bind_framebuffer(self.framebuffer);
        gl.bind_vertex_array(self.vertex_array);
        gl.bind_buffer(glow::ARRAY_BUFFER, self.array_buffer);
        gl.use_program(self.program);
        let [x, y, w, h] = self.viewport;
        gl.viewport(x, y, w, h);

        gl.set_enabled(glow::BLEND, self.blend);
        gl.set_enabled(glow::DEPTH_TEST, self.depth_test);
        gl.set_enabled(glow::STENCIL_TEST, self.stencil_test);
        gl.set_enabled(glow::CULL_FACE, self.cull_face);
        gl.set_enabled(glow::SCISSOR_TEST, self.scissor_test);

        gl.depth_mask(self.depth_mask);
        gl.depth_func(self.depth_func);
        gl.color_mask(self.color_mask);
        let [sc, dc, sa, da] = self.blend_func;
        gl.blend_func_separate(sc, dc, sa, da);
        gl.blend_equation_separate(self.blend_equation[0], self.blend_equation[1]);
        gl.blend_color(self.blend_color);
        gl.stencil_func(self.stencil_func, self.stencil_ref, self.stencil_value_mask);
        let [fail, depth_fail, pass] = self.stencil_ops;
        gl.stencil_op(fail, depth_fail, pass);
        gl.stencil_mask(self.stencil_write_mask);
        gl.cull_face(self.cull_face_mode);
        gl.polygon_mode(self.polygon_mode);

        for (unit, &(texture, sampler)) in (0u32..).zip(&self.units) {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(texture);
            gl.bind_sampler(unit, sampler);
        }
        gl.active_texture(self.active_texture);

        // Indexed binds also move the generic binding, so it goes last.
        for &(slot, buffer) in &self.uniform_bindings {
            gl.bind_buffer_base(glow::UNIFORM_BUFFER, slot, buffer);
        }
        gl.bind_buffer(glow::UNIFORM_BUFFER, self.uniform_buffer);

        let ImageBinding { texture, access, format } = self.image0;
        gl.bind_image_texture(0, texture, access, format);
    }
}
