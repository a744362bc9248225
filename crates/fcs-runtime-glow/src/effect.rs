//! Compiled GL programs for one container, shared between materials.

use fcs_core::EngineError;
use fcs_runtime::container::{Container, Metadata};
use fcs_runtime::layout::{resolve_layout, LayoutSource, MetadataLayout, VertexLayout};

use crate::device::{GlDevice, GlName};
use crate::program::{compile_compute, compile_program};
use crate::state::format_from_attrib_type;

/// A `sampler2D` uniform and the texture unit it reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerBinding {
    pub location: u32,
    pub unit: u32,
}

#[derive(Debug)]
pub struct GlEffect {
    metadata: Metadata,
    program: Option<GlName>,
    compute: Option<GlName>,
    layout: Option<VertexLayout>,
    samplers: Vec<SamplerBinding>,
}

impl GlEffect {
    /// Compiles whichever GLSL stages the container carries. Vertex + fragment make the graphics
    /// program (and imply a vertex layout); compute stands alone.
    pub fn new<D: GlDevice + ?Sized>(gl: &D, container: &Container) -> Result<Self, EngineError> {
        fn stage(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|src| !src.trim().is_empty())
        }
        let (vs, fs, cs) = (
            stage(&container.glsl_vertex),
            stage(&container.glsl_pixel),
            stage(&container.glsl_compute),
        );
        if (vs.is_none() || fs.is_none()) && cs.is_none() {
            return Err(EngineError::other("container holds no GLSL program stages"));
        }

        let program = match (vs, fs) {
            (Some(vs), Some(fs)) => Some(compile_program(gl, vs, fs)?),
            _ => None,
        };

        let compute = match cs.map(|cs| compile_compute(gl, cs)).transpose() {
            Ok(cs) => cs,
            Err(e) => {
                if let Some(p) = program {
                    gl.delete_program(p);
                }
                return Err(e);
            }
        };

        let metadata = container.metadata.clone();
        let mut layout = None;
        let mut samplers = Vec::new();
        if let Some(p) = program {
            let built = resolve_layout(
                &ProgramAttributes { gl, program: p },
                &MetadataLayout(&metadata.input_elements),
            );
            layout = match built {
                Ok(l) => l,
                Err(e) => {
                    gl.delete_program(p);
                    if let Some(cs) = compute {
                        gl.delete_program(cs);
                    }
                    return Err(e);
                }
            };
            samplers = sampler_bindings(gl, p);
        }

        for prog in program.iter().chain(compute.iter()) {
            bind_uniform_blocks(gl, *prog, &metadata);
        }

        tracing::debug!(
            graphics = program.is_some(),
            compute = compute.is_some(),
            stride = layout.as_ref().map_or(0, VertexLayout::stride),
            samplers = samplers.len(),
            "gl effect created"
        );

        Ok(Self {
            metadata,
            program,
            compute,
            layout,
            samplers,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Vertex + fragment program, if the container had both stages.
    pub fn program(&self) -> Option<GlName> {
        self.program
    }

    pub fn compute_program(&self) -> Option<GlName> {
        self.compute
    }

    pub fn vertex_layout(&self) -> Option<&VertexLayout> {
        self.layout.as_ref()
    }

    /// Sampler uniforms in declaration order, unit `n` for the `n`-th.
    pub fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }

    /// Deletes the programs. The effect must not be used afterwards.
    pub fn destroy<D: GlDevice + ?Sized>(&self, gl: &D) {
        if let Some(p) = self.program {
            gl.delete_program(p);
        }
        if let Some(cs) = self.compute {
            gl.delete_program(cs);
        }
    }
}

/// Binds each declared constant buffer's uniform block to its slot.
fn bind_uniform_blocks<D: GlDevice + ?Sized>(gl: &D, program: GlName, metadata: &Metadata) {
    for buffer in &metadata.buffers {
        match gl.uniform_block_index(program, &buffer.name) {
            Some(index) => gl.uniform_block_binding(program, index, buffer.slot),
            None => tracing::trace!(block = %buffer.name, program, "uniform block not active"),
        }
    }
}

fn sampler_bindings<D: GlDevice + ?Sized>(gl: &D, program: GlName) -> Vec<SamplerBinding> {
    gl.active_uniforms(program)
        .into_iter()
        .filter(|u| u.gl_type == glow::SAMPLER_2D)
        .filter_map(|u| u.location)
        .enumerate()
        .map(|(unit, location)| SamplerBinding {
            location,
            unit: unit as u32,
        })
        .collect()
}

// -------------------------------------------------------------------------------------------------
// Reflection
// -------------------------------------------------------------------------------------------------

/// Vertex layout read back from a linked program's active attributes.
///
/// Attributes are packed tightly in location order, so this is only authoritative when the
/// shader's inputs are tightly packed too.
struct ProgramAttributes<'a, D: ?Sized> {
    gl: &'a D,
    program: GlName,
}

impl<D: GlDevice + ?Sized> LayoutSource for ProgramAttributes<'_, D> {
    fn describe(&self) -> &'static str {
        "program reflection"
    }

    fn vertex_layout(&self) -> Result<Option<VertexLayout>, EngineError> {
        let mut attributes: Vec<_> = self
            .gl
            .active_attributes(self.program)
            .into_iter()
            .filter(|a| !a.name.starts_with("gl_"))
            .filter_map(|a| a.location.map(|loc| (loc, a)))
            .collect();
        if attributes.is_empty() {
            return Ok(None);
        }
        attributes.sort_by_key(|(loc, _)| *loc);

        let mut layout = VertexLayout::new();
        for (_, a) in attributes {
            let (semantic, index) = parse_semantic(&a.name);
            layout.push_auto(&semantic, index, format_from_attrib_type(a.gl_type))?;
        }
        Ok(Some(layout))
    }
}

/// `vs_POSITION0` → `("POSITION", 0)`, `in_uv1` → `("TEXCOORD", 1)`.
pub fn parse_semantic(name: &str) -> (String, u32) {
    let mut base = name;
    for prefix in ["vs_", "ps_", "in_", "a_"] {
        if let Some(rest) = base.strip_prefix(prefix) {
            base = rest;
            break;
        }
    }

    let digits = base.len() - base.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (stem, index) = base.split_at(base.len() - digits);
    let index = index.parse().unwrap_or(0);

    let upper = stem.to_ascii_uppercase();
    let semantic = match upper.as_str() {
        "POSITION" | "POS" => "POSITION",
        "TEXCOORD" | "UV" => "TEXCOORD",
        "COLOR" | "COL" => "COLOR",
        "NORMAL" | "NORM" => "NORMAL",
        "TANGENT" | "TAN" => "TANGENT",
        other => other,
    };
    (semantic.to_string(), index)
}
