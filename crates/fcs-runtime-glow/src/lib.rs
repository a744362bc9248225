//! fcs runtime (glow/OpenGL backend)
//
// This crate contains only the GL half of the shader pipeline:
// - compile/link the GLSL stages of a container
// - mirror material constant buffers into uniform buffers
// - run compute passes into a per-material Shadow texture
// - batch and draw between Begin/End, restoring host GL state afterwards
//
// It does NOT own a context, a window, or any host textures.
#![deny(missing_debug_implementations)]

pub mod device;
pub mod driver;
pub mod effect;
pub mod factory;
pub mod material;
pub mod program;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod mock;

pub use fcs_core::EngineError;

pub use device::{GlDevice, GlName};
pub use driver::GlDriver;
pub use effect::GlEffect;
pub use factory::GlShaderFactory;
pub use material::{GlMaterial, GlTexture};
pub use snapshot::{BindingFootprint, GlStateSnapshot};
