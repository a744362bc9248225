//! Driver contract shared by every backend, plus the Begin/Draw/End bookkeeping they share.
//!
//! A driver owns device state and the batch protocol; the arenas it packs into are lent by the
//! render context per call.

use std::cell::RefCell;
use std::rc::Rc;

use fcs_core::EngineError;

use crate::arena::{ArenaPool, ArenaSpan};
use crate::batch::{compact_and_merge, sort_commands, CompactStats, DrawCommand, GpuBatch, SortMode};
use crate::packer::{DepthBias, QuadRequest};
use crate::state::{BlendState, DepthStencilState, RasterizerState, SamplerState};

// -------------------------------------------------------------------------------------------------
// Host seams
// -------------------------------------------------------------------------------------------------

/// A host texture as the pipeline sees it.
pub trait HostTexture {
    /// Stable identity used for sorting and batching (GL name, SRV address, ...).
    fn sort_handle(&self) -> u64;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Host-side render target queries.
pub trait HostSurface {
    type Texture;

    fn backbuffer_size(&self) -> (u32, u32);

    /// The render target the host currently draws into, `None` for the backbuffer.
    fn current_target(&self) -> Option<Self::Texture>;
}

/// Renderer reported by the host (raw values follow the host's enumeration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenGl,
    Vulkan,
    D3D11,
    Metal,
    SdlGpu,
}

impl BackendKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => BackendKind::OpenGl,
            1 => BackendKind::Vulkan,
            2 => BackendKind::D3D11,
            3 => BackendKind::Metal,
            4 => BackendKind::SdlGpu,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            BackendKind::OpenGl => 0,
            BackendKind::Vulkan => 1,
            BackendKind::D3D11 => 2,
            BackendKind::Metal => 3,
            BackendKind::SdlGpu => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::OpenGl => "OpenGL",
            BackendKind::Vulkan => "Vulkan",
            BackendKind::D3D11 => "D3D11",
            BackendKind::Metal => "Metal",
            BackendKind::SdlGpu => "SDL_GPU",
        }
    }

    pub fn is_implemented(self) -> bool {
        matches!(self, BackendKind::OpenGl | BackendKind::D3D11)
    }
}

/// Maps the host's raw renderer type to a backend this workspace implements.
pub fn select_backend(raw: u32) -> Result<BackendKind, EngineError> {
    match BackendKind::from_raw(raw) {
        Some(kind) if kind.is_implemented() => {
            tracing::debug!(backend = kind.name(), "backend selected");
            Ok(kind)
        }
        Some(kind) => Err(EngineError::BackendUnimplemented(kind.name().to_string())),
        None => Err(EngineError::BackendUnimplemented(format!("renderer type {raw}"))),
    }
}

// -------------------------------------------------------------------------------------------------
// Driver trait
// -------------------------------------------------------------------------------------------------

/// Everything Begin accepts. `None` descriptors resolve to the backend defaults
/// (opaque blend, default depth, counter-clockwise culling, linear clamp sampling).
#[derive(Debug, Clone)]
pub struct BeginParams<T> {
    pub destination: Option<T>,
    pub sort_mode: SortMode,
    pub blend: Option<BlendState>,
    pub sampler: Option<SamplerState>,
    pub depth_stencil: Option<DepthStencilState>,
    pub rasterizer: Option<RasterizerState>,
    /// Stored for the cycle; vertex positions are already in clip space, so it is not applied.
    pub transform: Option<[f32; 16]>,
}

impl<T> Default for BeginParams<T> {
    fn default() -> Self {
        Self {
            destination: None,
            sort_mode: SortMode::Deferred,
            blend: None,
            sampler: None,
            depth_stencil: None,
            rasterizer: None,
            transform: None,
        }
    }
}

impl<T> BeginParams<T> {
    pub fn with_destination(mut self, destination: T) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_sort_mode(mut self, mode: SortMode) -> Self {
        self.sort_mode = mode;
        self
    }

    pub fn blend_or_default(&self) -> BlendState {
        self.blend.unwrap_or_default()
    }

    pub fn sampler_or_default(&self) -> SamplerState {
        self.sampler.unwrap_or_default()
    }

    pub fn depth_stencil_or_default(&self) -> DepthStencilState {
        self.depth_stencil.unwrap_or_default()
    }

    pub fn rasterizer_or_default(&self) -> RasterizerState {
        self.rasterizer.unwrap_or_default()
    }
}

/// Begin/Draw/End over one backend.
///
/// Protocol: `Idle -> begin -> Active -> draw* -> end -> Idle`. Calling `draw`/`end` while idle or
/// `begin` while active is a [`EngineError::State`].
pub trait RenderDriver {
    type Texture: HostTexture + Clone;
    type Material;

    fn begin(
        &mut self,
        arenas: &mut ArenaPool,
        params: BeginParams<Self::Texture>,
        material: Option<Rc<RefCell<Self::Material>>>,
    ) -> Result<(), EngineError>;

    /// `vertices` is a span of the raw vertex arena; `None` is a vertexless draw.
    fn draw(
        &mut self,
        arenas: &mut ArenaPool,
        texture: &Self::Texture,
        vertices: Option<ArenaSpan>,
        stride: usize,
        count: u32,
        depth: f32,
    ) -> Result<(), EngineError>;

    /// Runs batching (unless immediate) and restores the device state captured at `begin`.
    /// Restoration happens even when batching fails.
    fn end(&mut self, arenas: &mut ArenaPool) -> Result<(), EngineError>;

    /// Packs one quad for the current material. `Ok(None)` when the material has no vertex
    /// layout (the caller then issues a vertexless draw).
    fn create_vertex_data(
        &mut self,
        arenas: &mut ArenaPool,
        quad: &QuadRequest,
    ) -> Result<Option<ArenaSpan>, EngineError>;

    /// Stride of the current material's layout, 0 when there is none.
    fn vertex_stride(&self) -> usize;

    fn is_active(&self) -> bool;

    fn sort_mode(&self) -> SortMode;

    /// Releases driver-owned device objects.
    fn dispose(&mut self);
}

// -------------------------------------------------------------------------------------------------
// Shared cycle bookkeeping
// -------------------------------------------------------------------------------------------------

/// Per-cycle state every driver keeps: protocol flag, Begin parameters, the bound material,
/// recorded commands, merged batches and the depth bias.
#[derive(Debug)]
pub struct BatchCycle<T, M> {
    active: bool,
    params: BeginParams<T>,
    material: Option<Rc<RefCell<M>>>,
    commands: Vec<DrawCommand<T>>,
    batches: Vec<GpuBatch<T>>,
    depth_bias: DepthBias,
}

impl<T: Clone, M> BatchCycle<T, M> {
    pub fn new(depth_epsilon_step: f32) -> Self {
        Self {
            active: false,
            params: BeginParams::default(),
            material: None,
            commands: Vec::with_capacity(2048),
            batches: Vec::with_capacity(128),
            depth_bias: DepthBias::new(depth_epsilon_step),
        }
    }

    pub fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.active {
            return Err(EngineError::state("begin called while a batch is active; call end first"));
        }
        Ok(())
    }

    pub fn ensure_active(&self, op: &str) -> Result<(), EngineError> {
        if !self.active {
            return Err(EngineError::state(format!("{op} called without begin")));
        }
        Ok(())
    }

    /// Enters the Active state. Callers capture device state before this.
    pub fn start(
        &mut self,
        arenas: &mut ArenaPool,
        params: BeginParams<T>,
        material: Option<Rc<RefCell<M>>>,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.params = params;
        self.material = material;
        self.commands.clear();
        self.batches.clear();
        self.depth_bias.reset();
        arenas.reset_all();
        self.active = true;
        Ok(())
    }

    /// Back to Idle: arenas rewound, queues cleared, material dropped.
    pub fn finish(&mut self, arenas: &mut ArenaPool) {
        self.active = false;
        self.commands.clear();
        self.batches.clear();
        self.material = None;
        self.params = BeginParams::default();
        arenas.reset_all();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &BeginParams<T> {
        &self.params
    }

    pub fn sort_mode(&self) -> SortMode {
        self.params.sort_mode
    }

    pub fn material(&self) -> Option<&Rc<RefCell<M>>> {
        self.material.as_ref()
    }

    pub fn record(&mut self, command: DrawCommand<T>) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand<T>] {
        &self.commands
    }

    pub fn biased_depth(&mut self, depth: f32) -> f32 {
        self.depth_bias.apply(depth)
    }

    /// Sort, compact and merge the recorded commands.
    pub fn prepare(
        &mut self,
        arenas: &mut ArenaPool,
        stride: usize,
        copy_vertices: bool,
    ) -> Result<CompactStats, EngineError> {
        sort_commands(&mut self.commands, self.params.sort_mode);
        let stats = compact_and_merge(
            &self.commands,
            stride,
            &arenas.raw_vertices,
            &mut arenas.sorted_vertices,
            copy_vertices,
            &mut self.batches,
        )?;
        tracing::debug!(
            commands = self.commands.len(),
            batches = self.batches.len(),
            vertices = stats.total_vertices,
            bytes = stats.total_bytes,
            "batches prepared"
        );
        Ok(stats)
    }

    /// Moves the merged batches out so the caller can walk them while touching the device.
    pub fn take_batches(&mut self) -> Vec<GpuBatch<T>> {
        std::mem::take(&mut self.batches)
    }
}
