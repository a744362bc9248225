//! Direct3D 11 vocabulary: object handles, enum values and creation descriptors.
//!
//! Enum discriminants are the numeric values from `d3d11.h` / `dxgiformat.h`, so a host can
//! cast them straight into the native structs.

use std::fmt;

/// Opaque reference to a device object (an interface pointer on a real device).
///
/// `Option<Handle>` stands in for a null binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Programmable stage a binding applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Pixel,
    Compute,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Vertex, Stage::Pixel, Stage::Compute];

    pub fn index(self) -> usize {
        match self {
            Stage::Vertex => 0,
            Stage::Pixel => 1,
            Stage::Compute => 2,
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DxgiFormat {
    Unknown = 0,
    R32G32B32A32_Float = 2,
    R32G32B32A32_UInt = 3,
    R32G32B32A32_SInt = 4,
    R32G32B32_Float = 6,
    R32G32B32_UInt = 7,
    R32G32B32_SInt = 8,
    R16G16B16A16_Float = 10,
    R16G16B16A16_SNorm = 13,
    R32G32_Float = 16,
    R32G32_UInt = 17,
    R32G32_SInt = 18,
    R8G8B8A8_UNorm = 28,
    R16G16_Float = 34,
    R16G16_SNorm = 37,
    R32_Float = 41,
    R32_UInt = 42,
    R32_SInt = 43,
    R16_UInt = 57,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimitiveTopology {
    Undefined = 0,
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleStrip = 5,
}

// -------------------------------------------------------------------------------------------------
// Fixed-function enums
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Blend {
    Zero = 1,
    One = 2,
    SrcColor = 3,
    InvSrcColor = 4,
    SrcAlpha = 5,
    InvSrcAlpha = 6,
    DestAlpha = 7,
    InvDestAlpha = 8,
    DestColor = 9,
    InvDestColor = 10,
    SrcAlphaSat = 11,
    BlendFactor = 14,
    InvBlendFactor = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendOp {
    Add = 1,
    Subtract = 2,
    RevSubtract = 3,
    Min = 4,
    Max = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ComparisonFunc {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StencilOp {
    Keep = 1,
    Zero = 2,
    Replace = 3,
    IncrSat = 4,
    DecrSat = 5,
    Invert = 6,
    Incr = 7,
    Decr = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CullMode {
    None = 1,
    Front = 2,
    Back = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FillMode {
    Wireframe = 2,
    Solid = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Filter {
    MinMagMipPoint = 0x00,
    MinMagPointMipLinear = 0x01,
    MinMagLinearMipPoint = 0x14,
    MinMagMipLinear = 0x15,
    Anisotropic = 0x55,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureAddressMode {
    Wrap = 1,
    Mirror = 2,
    Clamp = 3,
}

// -------------------------------------------------------------------------------------------------
// Descriptors
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    /// `D3D11_COLOR_WRITE_ENABLE` bits.
    pub render_target_write_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: ComparisonFunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    /// `D3D11_DEPTH_WRITE_MASK_ALL` when set, `ZERO` otherwise.
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub min_lod: f32,
    pub max_lod: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    Default,
    Dynamic,
}

/// `D3D11_BIND_*` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindFlags(pub u32);

impl BindFlags {
    pub const VERTEX_BUFFER: BindFlags = BindFlags(0x1);
    pub const CONSTANT_BUFFER: BindFlags = BindFlags(0x4);
    pub const SHADER_RESOURCE: BindFlags = BindFlags(0x8);
    pub const RENDER_TARGET: BindFlags = BindFlags(0x20);
    pub const UNORDERED_ACCESS: BindFlags = BindFlags(0x80);

    pub fn contains(self, other: BindFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BindFlags {
    type Output = BindFlags;

    fn bitor(self, rhs: Self) -> Self {
        BindFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub byte_width: u32,
    pub usage: Usage,
    pub bind: BindFlags,
    /// `D3D11_CPU_ACCESS_WRITE`; required for `Usage::Dynamic`.
    pub cpu_write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture2DDesc {
    pub width: u32,
    pub height: u32,
    pub format: DxgiFormat,
    pub bind: BindFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElementDesc {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: DxgiFormat,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
}

/// Component type of a reflected shader input (`D3D_REGISTER_COMPONENT_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Unknown,
    UInt32,
    SInt32,
    Float32,
}

/// One entry of a vertex shader's input signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureParameter {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub component_type: ComponentType,
    /// Used-component mask (`x = 1 .. w = 8`).
    pub mask: u8,
    /// System values (`SV_VertexID`, ...) are not fed from the vertex buffer.
    pub system_value: bool,
}

// -------------------------------------------------------------------------------------------------
// Bindings the snapshot reads back
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn of_size(width: u32, height: u32) -> Self {
        Self {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: Option<Handle>,
    pub stride: u32,
    pub offset: u32,
}

impl VertexBufferBinding {
    pub const NONE: VertexBufferBinding = VertexBufferBinding {
        buffer: None,
        stride: 0,
        offset: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    pub buffer: Option<Handle>,
    pub format: DxgiFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendBinding {
    pub state: Option<Handle>,
    pub factor: [f32; 4],
    pub sample_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilBinding {
    pub state: Option<Handle>,
    pub stencil_ref: u32,
}

/// Render target slot 0 plus the depth-stencil view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBinding {
    pub color: Option<Handle>,
    pub depth: Option<Handle>,
}
