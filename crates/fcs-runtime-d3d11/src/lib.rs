//! fcs runtime (Direct3D 11 backend)
//
// This crate contains only the D3D11 half of the shader pipeline:
// - create the DXBC stages of a container and its input layout
// - mirror material constant buffers into default-usage buffers
// - run compute passes into a per-material Shadow texture (UAV + SRV)
// - batch and draw between Begin/End, restoring the immediate context afterwards
//
// It does NOT own a device. The host implements `D3D11Device` over its own
// `ID3D11Device` / `ID3D11DeviceContext`.
#![deny(missing_debug_implementations)]

pub mod desc;
pub mod device;
pub mod driver;
pub mod effect;
pub mod factory;
pub mod material;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod mock;

pub use fcs_core::EngineError;

pub use desc::{DxgiFormat, Handle, Stage};
pub use device::D3D11Device;
pub use driver::D3D11Driver;
pub use effect::D3D11Effect;
pub use factory::D3D11ShaderFactory;
pub use material::{D3D11Material, D3D11Texture, ShadowBuffer};
pub use snapshot::D3D11StateSnapshot;
