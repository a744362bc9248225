//! Descriptor → GL enum tables and the fixed-function apply helpers.

use fcs_runtime::layout::VertexElementFormat;
use fcs_runtime::state::{
    Blend, BlendFunction, BlendState, ColorWriteChannels, CompareFunction, CullMode, DepthStencilState,
    FillMode, RasterizerState, SamplerState, StencilOperation, TextureAddressMode, TextureFilter,
};

use crate::device::{GlDevice, GlName};

pub fn blend_factor(blend: Blend) -> u32 {
    match blend {
        Blend::Zero => glow::ZERO,
        Blend::One => glow::ONE,
        Blend::SourceColor => glow::SRC_COLOR,
        Blend::InverseSourceColor => glow::ONE_MINUS_SRC_COLOR,
        Blend::SourceAlpha => glow::SRC_ALPHA,
        Blend::InverseSourceAlpha => glow::ONE_MINUS_SRC_ALPHA,
        Blend::DestinationColor => glow::DST_COLOR,
        Blend::InverseDestinationColor => glow::ONE_MINUS_DST_COLOR,
        Blend::DestinationAlpha => glow::DST_ALPHA,
        Blend::InverseDestinationAlpha => glow::ONE_MINUS_DST_ALPHA,
        Blend::BlendFactor => glow::CONSTANT_COLOR,
        Blend::InverseBlendFactor => glow::ONE_MINUS_CONSTANT_COLOR,
        Blend::SourceAlphaSaturation => glow::SRC_ALPHA_SATURATE,
    }
}

/// `SourceAlphaSaturation` is not a legal destination factor; it falls back to `ONE`.
pub fn blend_destination_factor(blend: Blend) -> u32 {
    match blend {
        Blend::SourceAlphaSaturation => glow::ONE,
        other => blend_factor(other),
    }
}

pub fn blend_equation(func: BlendFunction) -> u32 {
    match func {
        BlendFunction::Add => glow::FUNC_ADD,
        BlendFunction::Subtract => glow::FUNC_SUBTRACT,
        BlendFunction::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendFunction::Min => glow::MIN,
        BlendFunction::Max => glow::MAX,
    }
}

pub fn compare_function(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Always => glow::ALWAYS,
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
    }
}

pub fn stencil_operation(op: StencilOperation) -> u32 {
    match op {
        StencilOperation::Keep => glow::KEEP,
        StencilOperation::Zero => glow::ZERO,
        StencilOperation::Replace => glow::REPLACE,
        StencilOperation::Increment => glow::INCR_WRAP,
        StencilOperation::Decrement => glow::DECR_WRAP,
        StencilOperation::IncrementSaturation => glow::INCR,
        StencilOperation::DecrementSaturation => glow::DECR,
        StencilOperation::Invert => glow::INVERT,
    }
}

pub fn color_mask(channels: ColorWriteChannels) -> [bool; 4] {
    [
        channels.contains(ColorWriteChannels::RED),
        channels.contains(ColorWriteChannels::GREEN),
        channels.contains(ColorWriteChannels::BLUE),
        channels.contains(ColorWriteChannels::ALPHA),
    ]
}

/// `(min, mag)` filters.
pub fn texture_filter(filter: TextureFilter) -> (u32, u32) {
    match filter {
        TextureFilter::Linear | TextureFilter::Anisotropic => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        TextureFilter::Point => (glow::NEAREST_MIPMAP_NEAREST, glow::NEAREST),
        TextureFilter::LinearMipPoint => (glow::LINEAR_MIPMAP_NEAREST, glow::LINEAR),
        TextureFilter::PointMipLinear => (glow::NEAREST_MIPMAP_LINEAR, glow::NEAREST),
    }
}

pub fn address_mode(mode: TextureAddressMode) -> u32 {
    match mode {
        TextureAddressMode::Wrap => glow::REPEAT,
        TextureAddressMode::Clamp => glow::CLAMP_TO_EDGE,
        TextureAddressMode::Mirror => glow::MIRRORED_REPEAT,
    }
}

/// How a vertex element is fed to `glVertexAttrib*Pointer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribFormat {
    pub data_type: u32,
    pub normalized: bool,
    /// Integer formats go through `glVertexAttribIPointer`.
    pub integer: bool,
}

pub fn attrib_format(format: VertexElementFormat) -> AttribFormat {
    use VertexElementFormat as F;
    let (data_type, normalized, integer) = match format {
        F::Float | F::Float2 | F::Float3 | F::Float4 => (glow::FLOAT, false, false),
        F::Color => (glow::UNSIGNED_BYTE, true, false),
        F::UInt | F::UInt2 | F::UInt3 | F::UInt4 => (glow::UNSIGNED_INT, false, true),
        F::Int | F::Int2 | F::Int3 | F::Int4 => (glow::INT, false, true),
        F::Short2 | F::Short4 => (glow::SHORT, true, false),
        F::HalfFloat2 | F::HalfFloat4 => (glow::HALF_FLOAT, false, false),
    };
    AttribFormat {
        data_type,
        normalized,
        integer,
    }
}

/// Active-attribute type → element format. Unknown types read as `Float4`.
pub fn format_from_attrib_type(gl_type: u32) -> VertexElementFormat {
    use VertexElementFormat as F;
    match gl_type {
        glow::FLOAT => F::Float,
        glow::FLOAT_VEC2 => F::Float2,
        glow::FLOAT_VEC3 => F::Float3,
        glow::FLOAT_VEC4 => F::Float4,
        glow::INT => F::Int,
        glow::INT_VEC2 => F::Int2,
        glow::INT_VEC3 => F::Int3,
        glow::INT_VEC4 => F::Int4,
        glow::UNSIGNED_INT => F::UInt,
        glow::UNSIGNED_INT_VEC2 => F::UInt2,
        glow::UNSIGNED_INT_VEC3 => F::UInt3,
        glow::UNSIGNED_INT_VEC4 => F::UInt4,
        _ => F::Float4,
    }
}

// -------------------------------------------------------------------------------------------------
// Apply
// -------------------------------------------------------------------------------------------------

pub fn apply_blend<D: GlDevice + ?Sized>(gl: &D, blend: &BlendState) {
    if blend.is_opaque() {
        gl.set_enabled(glow::BLEND, false);
    } else {
        gl.set_enabled(glow::BLEND, true);
        gl.blend_color(blend.blend_factor.to_vec4());
        gl.blend_equation_separate(blend_equation(blend.color_function), blend_equation(blend.alpha_function));
        gl.blend_func_separate(
            blend_factor(blend.color_source),
            blend_destination_factor(blend.color_destination),
            blend_factor(blend.alpha_source),
            blend_destination_factor(blend.alpha_destination),
        );
    }
    gl.color_mask(color_mask(blend.color_write));
}

pub fn apply_depth_stencil<D: GlDevice + ?Sized>(gl: &D, depth: &DepthStencilState) {
    gl.set_enabled(glow::DEPTH_TEST, depth.depth_enable);
    if depth.depth_enable {
        gl.depth_mask(depth.depth_write);
        gl.depth_func(compare_function(depth.depth_function));
    }

    gl.set_enabled(glow::STENCIL_TEST, depth.stencil_enable);
    if depth.stencil_enable {
        gl.stencil_mask(depth.stencil_write_mask);
        gl.stencil_func(
            compare_function(depth.stencil_function),
            depth.reference_stencil,
            depth.stencil_mask,
        );
        gl.stencil_op(
            stencil_operation(depth.stencil_fail),
            stencil_operation(depth.stencil_depth_fail),
            stencil_operation(depth.stencil_pass),
        );
    }
}

pub fn apply_rasterizer<D: GlDevice + ?Sized>(gl: &D, raster: &RasterizerState) {
    match raster.cull_mode {
        CullMode::None => gl.set_enabled(glow::CULL_FACE, false),
        mode => {
            gl.set_enabled(glow::CULL_FACE, true);
            gl.cull_face(if mode == CullMode::CullClockwiseFace {
                glow::FRONT
            } else {
                glow::BACK
            });
        }
    }
    gl.polygon_mode(match raster.fill_mode {
        FillMode::WireFrame => glow::LINE,
        FillMode::Solid => glow::FILL,
    });
    gl.set_enabled(glow::SCISSOR_TEST, raster.scissor_test);
}

/// Creates a sampler object carrying `state`.
pub fn create_sampler<D: GlDevice + ?Sized>(gl: &D, state: &SamplerState) -> Result<GlName, String> {
    let sampler = gl.create_sampler()?;
    let (min, mag) = texture_filter(state.filter);
    gl.sampler_parameter_i32(sampler, glow::TEXTURE_MIN_FILTER, min as i32);
    gl.sampler_parameter_i32(sampler, glow::TEXTURE_MAG_FILTER, mag as i32);
    gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_S, address_mode(state.address_u) as i32);
    gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_T, address_mode(state.address_v) as i32);
    gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_R, address_mode(state.address_w) as i32);
    gl.sampler_parameter_f32(sampler, glow::TEXTURE_LOD_BIAS, state.mip_lod_bias);
    gl.sampler_parameter_f32(sampler, glow::TEXTURE_MIN_LOD, state.max_mip_level as f32);
    if state.filter == TextureFilter::Anisotropic {
        gl.sampler_parameter_f32(sampler, glow::TEXTURE_MAX_ANISOTROPY_EXT, state.max_anisotropy as f32);
    }
    Ok(sampler)
}
