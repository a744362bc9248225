#![forbid(unsafe_code)]

//! Backend-agnostic half of the shader pipeline.
//!
//! This crate decodes shader containers, packs sprite quads into vertex bytes, batches draw
//! commands and defines the driver contract. Backend crates (`fcs-runtime-glow`,
//! `fcs-runtime-d3d11`) implement [`driver::RenderDriver`] on top of it.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod arena;
pub mod batch;
pub mod container;
pub mod context;
pub mod driver;
pub mod effect_cache;
pub mod geometry;
pub mod index;
pub mod layout;
pub mod material;
pub mod packer;
pub mod state;

pub use fcs_core::{EngineError, PipelineConfig};

pub use arena::{ArenaKind, ArenaPool, ArenaSpan, NativeArena};
pub use batch::{DrawCommand, GpuBatch, SortMode};
pub use container::{Container, Metadata};
pub use context::RenderContext;
pub use driver::{BackendKind, BatchCycle, BeginParams, HostSurface, HostTexture, RenderDriver};
pub use effect_cache::EffectCache;
pub use geometry::{Color, Rect, SpriteEffects, Vec2};
pub use layout::{VertexElementFormat, VertexLayout};
pub use material::{MaterialCore, ParamValue};
pub use packer::{QuadGeometry, QuadRequest, VertexWriter, WriterCache};
