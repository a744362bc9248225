//! Fixed-function state descriptors supplied at Begin.
//!
//! Backend-neutral; each driver crate converts them into its own device values.

use std::ops::BitOr;

use crate::geometry::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SourceColor,
    InverseSourceColor,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationColor,
    InverseDestinationColor,
    DestinationAlpha,
    InverseDestinationAlpha,
    BlendFactor,
    InverseBlendFactor,
    /// Source factor only.
    SourceAlphaSaturation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFunction {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorWriteChannels(u8);

impl ColorWriteChannels {
    pub const NONE: ColorWriteChannels = ColorWriteChannels(0);
    pub const RED: ColorWriteChannels = ColorWriteChannels(1);
    pub const GREEN: ColorWriteChannels = ColorWriteChannels(2);
    pub const BLUE: ColorWriteChannels = ColorWriteChannels(4);
    pub const ALPHA: ColorWriteChannels = ColorWriteChannels(8);
    pub const ALL: ColorWriteChannels = ColorWriteChannels(15);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: ColorWriteChannels) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ColorWriteChannels {
    type Output = ColorWriteChannels;

    fn bitor(self, rhs: Self) -> Self {
        ColorWriteChannels(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color_source: Blend,
    pub color_destination: Blend,
    pub color_function: BlendFunction,
    pub alpha_source: Blend,
    pub alpha_destination: Blend,
    pub alpha_function: BlendFunction,
    pub blend_factor: Color,
    pub color_write: ColorWriteChannels,
}

impl BlendState {
    const fn new(source: Blend, destination: Blend) -> Self {
        Self {
            color_source: source,
            color_destination: destination,
            color_function: BlendFunction::Add,
            alpha_source: source,
            alpha_destination: destination,
            alpha_function: BlendFunction::Add,
            blend_factor: Color::WHITE,
            color_write: ColorWriteChannels::ALL,
        }
    }

    pub const OPAQUE: BlendState = BlendState::new(Blend::One, Blend::Zero);
    pub const ALPHA_BLEND: BlendState = BlendState::new(Blend::One, Blend::InverseSourceAlpha);
    pub const ADDITIVE: BlendState = BlendState::new(Blend::SourceAlpha, Blend::One);
    pub const NON_PREMULTIPLIED: BlendState =
        BlendState::new(Blend::SourceAlpha, Blend::InverseSourceAlpha);

    /// One/Zero with additive functions: blending can be switched off entirely.
    pub fn is_opaque(&self) -> bool {
        self.color_function == BlendFunction::Add
            && self.alpha_function == BlendFunction::Add
            && self.color_source == Blend::One
            && self.color_destination == Blend::Zero
            && self.alpha_source == Blend::One
            && self.alpha_destination == Blend::Zero
    }
}

impl Default for BlendState {
    fn default() -> Self {
        BlendState::OPAQUE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always,
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    /// Wraps to zero past the maximum.
    Increment,
    Decrement,
    /// Clamps at the maximum.
    IncrementSaturation,
    DecrementSaturation,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_function: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_function: CompareFunction,
    pub stencil_pass: StencilOperation,
    pub stencil_fail: StencilOperation,
    pub stencil_depth_fail: StencilOperation,
    pub reference_stencil: i32,
    pub stencil_mask: u32,
    pub stencil_write_mask: u32,
}

impl DepthStencilState {
    const fn new(depth_enable: bool, depth_write: bool) -> Self {
        Self {
            depth_enable,
            depth_write,
            depth_function: CompareFunction::LessEqual,
            stencil_enable: false,
            stencil_function: CompareFunction::Always,
            stencil_pass: StencilOperation::Keep,
            stencil_fail: StencilOperation::Keep,
            stencil_depth_fail: StencilOperation::Keep,
            reference_stencil: 0,
            stencil_mask: u32::MAX,
            stencil_write_mask: u32::MAX,
        }
    }

    pub const DEFAULT: DepthStencilState = DepthStencilState::new(true, true);
    pub const DEPTH_READ: DepthStencilState = DepthStencilState::new(true, false);
    pub const NONE: DepthStencilState = DepthStencilState::new(false, false);
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    CullClockwiseFace,
    CullCounterClockwiseFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    WireFrame,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub scissor_test: bool,
    pub depth_bias: f32,
    pub slope_scale_depth_bias: f32,
    pub multisample: bool,
}

impl RasterizerState {
    const fn new(cull_mode: CullMode) -> Self {
        Self {
            cull_mode,
            fill_mode: FillMode::Solid,
            scissor_test: false,
            depth_bias: 0.0,
            slope_scale_depth_bias: 0.0,
            multisample: true,
        }
    }

    pub const CULL_NONE: RasterizerState = RasterizerState::new(CullMode::None);
    pub const CULL_CLOCKWISE: RasterizerState = RasterizerState::new(CullMode::CullClockwiseFace);
    pub const CULL_COUNTER_CLOCKWISE: RasterizerState =
        RasterizerState::new(CullMode::CullCounterClockwiseFace);
}

impl Default for RasterizerState {
    fn default() -> Self {
        RasterizerState::CULL_COUNTER_CLOCKWISE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Linear,
    Point,
    Anisotropic,
    LinearMipPoint,
    PointMipLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub filter: TextureFilter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub max_anisotropy: u32,
    pub max_mip_level: u32,
    pub mip_lod_bias: f32,
}

impl SamplerState {
    const fn new(filter: TextureFilter, address: TextureAddressMode) -> Self {
        Self {
            filter,
            address_u: address,
            address_v: address,
            address_w: address,
            max_anisotropy: 4,
            max_mip_level: 0,
            mip_lod_bias: 0.0,
        }
    }

    pub const POINT_CLAMP: SamplerState = SamplerState::new(TextureFilter::Point, TextureAddressMode::Clamp);
    pub const POINT_WRAP: SamplerState = SamplerState::new(TextureFilter::Point, TextureAddressMode::Wrap);
    pub const LINEAR_CLAMP: SamplerState = SamplerState::new(TextureFilter::Linear, TextureAddressMode::Clamp);
    pub const LINEAR_WRAP: SamplerState = SamplerState::new(TextureFilter::Linear, TextureAddressMode::Wrap);
    pub const ANISOTROPIC_CLAMP: SamplerState =
        SamplerState::new(TextureFilter::Anisotropic, TextureAddressMode::Clamp);
    pub const ANISOTROPIC_WRAP: SamplerState =
        SamplerState::new(TextureFilter::Anisotropic, TextureAddressMode::Wrap);
}

impl Default for SamplerState {
    fn default() -> Self {
        SamplerState::LINEAR_CLAMP
    }
}
