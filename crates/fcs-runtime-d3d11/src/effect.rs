//! D3D11 shader objects for one container, shared between materials.

use fcs_core::EngineError;
use fcs_runtime::container::{Container, Metadata};
use fcs_runtime::layout::{resolve_layout, LayoutSource, MetadataLayout, VertexLayout};

use crate::desc::{Handle, InputElementDesc};
use crate::device::D3D11Device;
use crate::state::{dxgi_format, format_from_signature};

/// `"DXBC"` read as a little-endian `u32`.
pub const DXBC_MAGIC: u32 = 0x4342_5844;

#[derive(Debug)]
pub struct D3D11Effect {
    metadata: Metadata,
    vertex_shader: Option<Handle>,
    pixel_shader: Option<Handle>,
    compute_shader: Option<Handle>,
    input_layout: Option<Handle>,
    layout: Option<VertexLayout>,
}

/// Handles created so far; released if construction bails out.
struct Created<'a, D: D3D11Device + ?Sized> {
    device: &'a D,
    handles: Vec<Handle>,
}

impl<D: D3D11Device + ?Sized> Created<'_, D> {
    fn push(&mut self, h: Handle) -> Handle {
        self.handles.push(h);
        h
    }

    fn release_all(self) {
        for h in self.handles {
            self.device.release(h);
        }
    }
}

impl D3D11Effect {
    /// Creates whichever DXBC stages the container carries. Vertex + pixel make the graphics
    /// pipeline (and imply a vertex layout); compute stands alone.
    pub fn new<D: D3D11Device + ?Sized>(device: &D, container: &Container) -> Result<Self, EngineError> {
        fn stage(b: &Option<Vec<u8>>) -> Option<&[u8]> {
            b.as_deref().filter(|code| !code.is_empty())
        }
        let (vs, ps, cs) = (
            stage(&container.dxbc_vertex),
            stage(&container.dxbc_pixel),
            stage(&container.dxbc_compute),
        );
        if (vs.is_none() || ps.is_none()) && cs.is_none() {
            return Err(EngineError::other("container holds no DXBC program stages"));
        }

        let mut created = Created {
            device,
            handles: Vec::new(),
        };
        match Self::build(&mut created, &container.metadata, vs, ps, cs) {
            Ok(effect) => Ok(effect),
            Err(e) => {
                created.release_all();
                Err(e)
            }
        }
    }

    fn build<D: D3D11Device + ?Sized>(
        created: &mut Created<'_, D>,
        metadata: &Metadata,
        vs: Option<&[u8]>,
        ps: Option<&[u8]>,
        cs: Option<&[u8]>,
    ) -> Result<Self, EngineError> {
        let device = created.device;
        let mut vertex_shader = None;
        let mut pixel_shader = None;
        let mut input_layout = None;
        let mut layout = None;

        if let (Some(vs), Some(ps)) = (vs, ps) {
            check_magic("vertex", vs);
            check_magic("pixel", ps);
            let v = device
                .create_vertex_shader(vs)
                .map_err(|e| EngineError::VertexCompile(format!("CreateVertexShader: {e}")))?;
            vertex_shader = Some(created.push(v));
            let p = device
                .create_pixel_shader(ps)
                .map_err(|e| EngineError::FragmentCompile(format!("CreatePixelShader: {e}")))?;
            pixel_shader = Some(created.push(p));

            layout = resolve_layout(
                &InputSignature { device, bytecode: vs },
                &MetadataLayout(&metadata.input_elements),
            )?;
            if let Some(l) = &layout {
                let elements = input_elements(l);
                let il = device
                    .create_input_layout(&elements, vs)
                    .map_err(|e| EngineError::DeviceCreate(format!("input layout: {e}")))?;
                input_layout = Some(created.push(il));
            }
        }

        let compute_shader = match cs {
            Some(cs) => {
                check_magic("compute", cs);
                let c = device
                    .create_compute_shader(cs)
                    .map_err(|e| EngineError::ComputeCompile(format!("CreateComputeShader: {e}")))?;
                Some(created.push(c))
            }
            None => None,
        };

        tracing::debug!(
            graphics = vertex_shader.is_some(),
            compute = compute_shader.is_some(),
            stride = layout.as_ref().map_or(0, VertexLayout::stride),
            "d3d11 effect created"
        );

        Ok(Self {
            metadata: metadata.clone(),
            vertex_shader,
            pixel_shader,
            compute_shader,
            input_layout,
            layout,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn vertex_shader(&self) -> Option<Handle> {
        self.vertex_shader
    }

    pub fn pixel_shader(&self) -> Option<Handle> {
        self.pixel_shader
    }

    pub fn compute_shader(&self) -> Option<Handle> {
        self.compute_shader
    }

    pub fn input_layout(&self) -> Option<Handle> {
        self.input_layout
    }

    pub fn has_graphics(&self) -> bool {
        self.vertex_shader.is_some() && self.pixel_shader.is_some()
    }

    pub fn vertex_layout(&self) -> Option<&VertexLayout> {
        self.layout.as_ref()
    }

    /// Releases the shader objects. The effect must not be used afterwards.
    pub fn destroy<D: D3D11Device + ?Sized>(&self, device: &D) {
        let handles = [self.vertex_shader, self.pixel_shader, self.compute_shader, self.input_layout];
        for h in handles.into_iter().flatten() {
            device.release(h);
        }
    }
}

/// A blob without the `DXBC` header is passed through; the runtime has the final word.
fn check_magic(stage: &'static str, bytecode: &[u8]) {
    let magic = bytecode
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    if magic != Some(DXBC_MAGIC) {
        tracing::warn!(stage, magic = ?magic, "shader blob does not start with DXBC");
    }
}

pub fn input_elements(layout: &VertexLayout) -> Vec<InputElementDesc> {
    layout
        .elements()
        .iter()
        .map(|e| InputElementDesc {
            semantic_name: e.semantic.clone(),
            semantic_index: e.semantic_index,
            format: dxgi_format(e.format),
            input_slot: 0,
            aligned_byte_offset: e.offset as u32,
        })
        .collect()
}

/// Vertex layout read from the vertex shader's input signature, packed in declaration order.
struct InputSignature<'a, D: ?Sized> {
    device: &'a D,
    bytecode: &'a [u8],
}

impl<D: D3D11Device + ?Sized> LayoutSource for InputSignature<'_, D> {
    fn describe(&self) -> &'static str {
        "shader reflection"
    }

    fn vertex_layout(&self) -> Result<Option<VertexLayout>, EngineError> {
        let params = self
            .device
            .reflect_input_signature(self.bytecode)
            .map_err(|e| EngineError::other(format!("input signature: {e}")))?;

        let mut layout = VertexLayout::new();
        for p in params.iter().filter(|p| !p.system_value) {
            layout.push_auto(
                &p.semantic_name,
                p.semantic_index,
                format_from_signature(p.component_type, p.mask),
            )?;
        }
        Ok(if layout.is_empty() { None } else { Some(layout) })
    }
}
