//! GLSL compile/link helpers.

use fcs_core::EngineError;

use crate::device::{GlDevice, GlName};

fn compile_shader<D: GlDevice + ?Sized>(
    gl: &D,
    kind: u32,
    source: &str,
    stage: &str,
) -> Result<GlName, EngineError> {
    let shader = gl
        .create_shader(kind)
        .map_err(|e| EngineError::GlCreate(format!("create_shader({stage}) failed: {e:?}")))?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        tracing::error!(stage, %log, "shader compile failed");
        return Err(match kind {
            glow::VERTEX_SHADER => EngineError::VertexCompile(log),
            glow::FRAGMENT_SHADER => EngineError::FragmentCompile(log),
            _ => EngineError::ComputeCompile(log),
        });
    }
    Ok(shader)
}

fn link<D: GlDevice + ?Sized>(gl: &D, shaders: &[GlName]) -> Result<GlName, EngineError> {
    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            for &s in shaders {
                gl.delete_shader(s);
            }
            return Err(EngineError::GlCreate(format!("create_program failed: {e:?}")));
        }
    };
    for &s in shaders {
        gl.attach_shader(program, s);
    }
    gl.link_program(program);

    for &s in shaders {
        gl.detach_shader(program, s);
        gl.delete_shader(s);
    }

    if !gl.program_link_status(program) {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        tracing::error!(%log, "program link failed");
        return Err(EngineError::Link(log));
    }
    Ok(program)
}

/// Vertex + fragment program.
pub fn compile_program<D: GlDevice + ?Sized>(
    gl: &D,
    vert_src: &str,
    frag_src: &str,
) -> Result<GlName, EngineError> {
    let vs = compile_shader(gl, glow::VERTEX_SHADER, vert_src, "VS")?;
    let fs = match compile_shader(gl, glow::FRAGMENT_SHADER, frag_src, "FS") {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(e);
        }
    };
    link(gl, &[vs, fs])
}

/// Compute-only program.
pub fn compile_compute<D: GlDevice + ?Sized>(gl: &D, comp_src: &str) -> Result<GlName, EngineError> {
    let cs = compile_shader(gl, glow::COMPUTE_SHADER, comp_src, "CS")?;
    link(gl, &[cs])
}
