//! Descriptor → D3D11 tables, DXGI format mapping and the state-object cache.

use fcs_runtime::layout::VertexElementFormat;
use fcs_runtime::state::{
    Blend, BlendFunction, BlendState, CompareFunction, CullMode, DepthStencilState, FillMode, RasterizerState,
    SamplerState, StencilOperation, TextureAddressMode, TextureFilter,
};

use crate::desc::{self, ComponentType, DxgiFormat, Handle};
use crate::device::D3D11Device;

pub fn blend(blend: Blend) -> desc::Blend {
    match blend {
        Blend::Zero => desc::Blend::Zero,
        Blend::One => desc::Blend::One,
        Blend::SourceColor => desc::Blend::SrcColor,
        Blend::InverseSourceColor => desc::Blend::InvSrcColor,
        Blend::SourceAlpha => desc::Blend::SrcAlpha,
        Blend::InverseSourceAlpha => desc::Blend::InvSrcAlpha,
        Blend::DestinationColor => desc::Blend::DestColor,
        Blend::InverseDestinationColor => desc::Blend::InvDestColor,
        Blend::DestinationAlpha => desc::Blend::DestAlpha,
        Blend::InverseDestinationAlpha => desc::Blend::InvDestAlpha,
        Blend::BlendFactor => desc::Blend::BlendFactor,
        Blend::InverseBlendFactor => desc::Blend::InvBlendFactor,
        Blend::SourceAlphaSaturation => desc::Blend::SrcAlphaSat,
    }
}

/// `SrcAlphaSat` is rejected as a destination blend; it falls back to `One`.
pub fn destination_blend(b: Blend) -> desc::Blend {
    match b {
        Blend::SourceAlphaSaturation => desc::Blend::One,
        other => blend(other),
    }
}

pub fn blend_op(func: BlendFunction) -> desc::BlendOp {
    match func {
        BlendFunction::Add => desc::BlendOp::Add,
        BlendFunction::Subtract => desc::BlendOp::Subtract,
        BlendFunction::ReverseSubtract => desc::BlendOp::RevSubtract,
        BlendFunction::Min => desc::BlendOp::Min,
        BlendFunction::Max => desc::BlendOp::Max,
    }
}

pub fn comparison(func: CompareFunction) -> desc::ComparisonFunc {
    match func {
        CompareFunction::Always => desc::ComparisonFunc::Always,
        CompareFunction::Never => desc::ComparisonFunc::Never,
        CompareFunction::Less => desc::ComparisonFunc::Less,
        CompareFunction::LessEqual => desc::ComparisonFunc::LessEqual,
        CompareFunction::Equal => desc::ComparisonFunc::Equal,
        CompareFunction::GreaterEqual => desc::ComparisonFunc::GreaterEqual,
        CompareFunction::Greater => desc::ComparisonFunc::Greater,
        CompareFunction::NotEqual => desc::ComparisonFunc::NotEqual,
    }
}

pub fn stencil_op(op: StencilOperation) -> desc::StencilOp {
    match op {
        StencilOperation::Keep => desc::StencilOp::Keep,
        StencilOperation::Zero => desc::StencilOp::Zero,
        StencilOperation::Replace => desc::StencilOp::Replace,
        StencilOperation::Increment => desc::StencilOp::Incr,
        StencilOperation::Decrement => desc::StencilOp::Decr,
        StencilOperation::IncrementSaturation => desc::StencilOp::IncrSat,
        StencilOperation::DecrementSaturation => desc::StencilOp::DecrSat,
        StencilOperation::Invert => desc::StencilOp::Invert,
    }
}

pub fn filter(filter: TextureFilter) -> desc::Filter {
    match filter {
        TextureFilter::Linear => desc::Filter::MinMagMipLinear,
        TextureFilter::Point => desc::Filter::MinMagMipPoint,
        TextureFilter::Anisotropic => desc::Filter::Anisotropic,
        TextureFilter::LinearMipPoint => desc::Filter::MinMagLinearMipPoint,
        TextureFilter::PointMipLinear => desc::Filter::MinMagPointMipLinear,
    }
}

pub fn address_mode(mode: TextureAddressMode) -> desc::TextureAddressMode {
    match mode {
        TextureAddressMode::Wrap => desc::TextureAddressMode::Wrap,
        TextureAddressMode::Clamp => desc::TextureAddressMode::Clamp,
        TextureAddressMode::Mirror => desc::TextureAddressMode::Mirror,
    }
}

pub fn blend_desc(state: &BlendState) -> desc::BlendDesc {
    desc::BlendDesc {
        blend_enable: !state.is_opaque(),
        src_blend: blend(state.color_source),
        dest_blend: destination_blend(state.color_destination),
        blend_op: blend_op(state.color_function),
        src_blend_alpha: blend(state.alpha_source),
        dest_blend_alpha: destination_blend(state.alpha_destination),
        blend_op_alpha: blend_op(state.alpha_function),
        render_target_write_mask: state.color_write.bits(),
    }
}

pub fn depth_stencil_desc(state: &DepthStencilState) -> desc::DepthStencilDesc {
    let face = desc::StencilOpDesc {
        fail_op: stencil_op(state.stencil_fail),
        depth_fail_op: stencil_op(state.stencil_depth_fail),
        pass_op: stencil_op(state.stencil_pass),
        func: comparison(state.stencil_function),
    };
    desc::DepthStencilDesc {
        depth_enable: state.depth_enable,
        depth_write: state.depth_write,
        depth_func: comparison(state.depth_function),
        stencil_enable: state.stencil_enable,
        stencil_read_mask: (state.stencil_mask & 0xff) as u8,
        stencil_write_mask: (state.stencil_write_mask & 0xff) as u8,
        front_face: face,
        back_face: face,
    }
}

/// Front faces wind clockwise, so culling counter-clockwise faces is `Back`.
pub fn rasterizer_desc(state: &RasterizerState) -> desc::RasterizerDesc {
    desc::RasterizerDesc {
        fill_mode: match state.fill_mode {
            FillMode::Solid => desc::FillMode::Solid,
            FillMode::WireFrame => desc::FillMode::Wireframe,
        },
        cull_mode: match state.cull_mode {
            CullMode::None => desc::CullMode::None,
            CullMode::CullClockwiseFace => desc::CullMode::Front,
            CullMode::CullCounterClockwiseFace => desc::CullMode::Back,
        },
        front_counter_clockwise: false,
        depth_bias: state.depth_bias as i32,
        slope_scaled_depth_bias: state.slope_scale_depth_bias,
        depth_clip_enable: true,
        scissor_enable: state.scissor_test,
        multisample_enable: state.multisample,
    }
}

pub fn sampler_desc(state: &SamplerState) -> desc::SamplerDesc {
    desc::SamplerDesc {
        filter: filter(state.filter),
        address_u: address_mode(state.address_u),
        address_v: address_mode(state.address_v),
        address_w: address_mode(state.address_w),
        mip_lod_bias: state.mip_lod_bias,
        max_anisotropy: state.max_anisotropy.clamp(1, 16),
        min_lod: state.max_mip_level as f32,
        max_lod: f32::MAX,
    }
}

// -------------------------------------------------------------------------------------------------
// Formats
// -------------------------------------------------------------------------------------------------

pub fn dxgi_format(format: VertexElementFormat) -> DxgiFormat {
    use VertexElementFormat as F;
    match format {
        F::Float => DxgiFormat::R32_Float,
        F::Float2 => DxgiFormat::R32G32_Float,
        F::Float3 => DxgiFormat::R32G32B32_Float,
        F::Float4 => DxgiFormat::R32G32B32A32_Float,
        F::Color => DxgiFormat::R8G8B8A8_UNorm,
        F::UInt => DxgiFormat::R32_UInt,
        F::UInt2 => DxgiFormat::R32G32_UInt,
        F::UInt3 => DxgiFormat::R32G32B32_UInt,
        F::UInt4 => DxgiFormat::R32G32B32A32_UInt,
        F::Int => DxgiFormat::R32_SInt,
        F::Int2 => DxgiFormat::R32G32_SInt,
        F::Int3 => DxgiFormat::R32G32B32_SInt,
        F::Int4 => DxgiFormat::R32G32B32A32_SInt,
        F::Short2 => DxgiFormat::R16G16_SNorm,
        F::Short4 => DxgiFormat::R16G16B16A16_SNorm,
        F::HalfFloat2 => DxgiFormat::R16G16_Float,
        F::HalfFloat4 => DxgiFormat::R16G16B16A16_Float,
    }
}

/// Element format of a reflected input: component type plus the number of used components.
/// Unknown types read as floats.
pub fn format_from_signature(component: ComponentType, mask: u8) -> VertexElementFormat {
    use VertexElementFormat as F;
    let components = (mask & 0x0f).count_ones().max(1);
    match (component, components) {
        (ComponentType::UInt32, 1) => F::UInt,
        (ComponentType::UInt32, 2) => F::UInt2,
        (ComponentType::UInt32, 3) => F::UInt3,
        (ComponentType::UInt32, _) => F::UInt4,
        (ComponentType::SInt32, 1) => F::Int,
        (ComponentType::SInt32, 2) => F::Int2,
        (ComponentType::SInt32, 3) => F::Int3,
        (ComponentType::SInt32, _) => F::Int4,
        (_, 1) => F::Float,
        (_, 2) => F::Float2,
        (_, 3) => F::Float3,
        (_, _) => F::Float4,
    }
}

// -------------------------------------------------------------------------------------------------
// State objects
// -------------------------------------------------------------------------------------------------

/// Immutable state objects created once per distinct descriptor and kept until dispose.
#[derive(Debug, Default)]
pub struct StateObjects {
    blend: Vec<(desc::BlendDesc, Handle)>,
    depth: Vec<(desc::DepthStencilDesc, Handle)>,
    raster: Vec<(desc::RasterizerDesc, Handle)>,
    samplers: Vec<(desc::SamplerDesc, Handle)>,
}

fn cached<K: PartialEq + Copy>(
    entries: &mut Vec<(K, Handle)>,
    key: K,
    create: impl FnOnce(&K) -> Result<Handle, String>,
) -> Result<Handle, String> {
    if let Some(&(_, h)) = entries.iter().find(|(k, _)| *k == key) {
        return Ok(h);
    }
    let h = create(&key)?;
    entries.push((key, h));
    Ok(h)
}

impl StateObjects {
    pub fn blend<D: D3D11Device + ?Sized>(&mut self, device: &D, state: &BlendState) -> Result<Handle, String> {
        cached(&mut self.blend, blend_desc(state), |d| device.create_blend_state(d))
    }

    pub fn depth_stencil<D: D3D11Device + ?Sized>(
        &mut self,
        device: &D,
        state: &DepthStencilState,
    ) -> Result<Handle, String> {
        cached(&mut self.depth, depth_stencil_desc(state), |d| device.create_depth_stencil_state(d))
    }

    pub fn rasterizer<D: D3D11Device + ?Sized>(
        &mut self,
        device: &D,
        state: &RasterizerState,
    ) -> Result<Handle, String> {
        cached(&mut self.raster, rasterizer_desc(state), |d| device.create_rasterizer_state(d))
    }

    pub fn sampler<D: D3D11Device + ?Sized>(&mut self, device: &D, state: &SamplerState) -> Result<Handle, String> {
        cached(&mut self.samplers, sampler_desc(state), |d| device.create_sampler_state(d))
    }

    pub fn len(&self) -> usize {
        self.blend.len() + self.depth.len() + self.raster.len() + self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn release_all<D: D3D11Device + ?Sized>(&mut self, device: &D) {
        let handles = self
            .blend
            .drain(..)
            .map(|(_, h)| h)
            .chain(self.depth.drain(..).map(|(_, h)| h))
            .chain(self.raster.drain(..).map(|(_, h)| h))
            .chain(self.samplers.drain(..).map(|(_, h)| h));
        for h in handles {
            device.release(h);
        }
    }
}
