//! Vertex element formats and input layouts.

use std::fmt;

use fcs_core::EngineError;

use crate::container::InputElementMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    Float,
    Float2,
    Float3,
    Float4,
    /// Four normalized bytes packed into one `u32`.
    Color,
    UInt,
    UInt2,
    UInt3,
    UInt4,
    Int,
    Int2,
    Int3,
    Int4,
    Short2,
    Short4,
    HalfFloat2,
    HalfFloat4,
}

impl VertexElementFormat {
    pub fn size(self) -> usize {
        use VertexElementFormat::*;
        match self {
            Float | Color | UInt | Int | Short2 | HalfFloat2 => 4,
            Float2 | UInt2 | Int2 | Short4 | HalfFloat4 => 8,
            Float3 | UInt3 | Int3 => 12,
            Float4 | UInt4 | Int4 => 16,
        }
    }

    pub fn component_count(self) -> usize {
        use VertexElementFormat::*;
        match self {
            Float | UInt | Int => 1,
            Float2 | UInt2 | Int2 | Short2 | HalfFloat2 => 2,
            Float3 | UInt3 | Int3 => 3,
            Float4 | UInt4 | Int4 | Short4 | HalfFloat4 | Color => 4,
        }
    }

    /// Strict name lookup (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        use VertexElementFormat::*;
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "float" | "float1" => Float,
            "float2" => Float2,
            "float3" => Float3,
            "float4" => Float4,
            "color" | "byte4" | "rgba8" => Color,
            "uint" | "uint1" => UInt,
            "uint2" => UInt2,
            "uint3" => UInt3,
            "uint4" => UInt4,
            "int" | "int1" => Int,
            "int2" => Int2,
            "int3" => Int3,
            "int4" => Int4,
            "short2" => Short2,
            "short4" => Short4,
            "half2" | "halffloat2" => HalfFloat2,
            "half4" | "halffloat4" => HalfFloat4,
            _ => return None,
        })
    }

    /// Like [`VertexElementFormat::parse`], but unknown names become `Float4`.
    pub fn from_name_lossy(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::debug!(format = name, "unknown vertex format, assuming float4");
            VertexElementFormat::Float4
        })
    }

    pub fn name(self) -> &'static str {
        use VertexElementFormat::*;
        match self {
            Float => "float",
            Float2 => "float2",
            Float3 => "float3",
            Float4 => "float4",
            Color => "color",
            UInt => "uint",
            UInt2 => "uint2",
            UInt3 => "uint3",
            UInt4 => "uint4",
            Int => "int",
            Int2 => "int2",
            Int3 => "int3",
            Int4 => "int4",
            Short2 => "short2",
            Short4 => "short4",
            HalfFloat2 => "half2",
            HalfFloat4 => "half4",
        }
    }

    /// `Float`..`Float4` only.
    pub fn float_components(self) -> Option<usize> {
        use VertexElementFormat::*;
        match self {
            Float => Some(1),
            Float2 => Some(2),
            Float3 => Some(3),
            Float4 => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for VertexElementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: String,
    pub semantic_index: u32,
    pub format: VertexElementFormat,
    pub offset: usize,
}

impl VertexElement {
    pub fn size(&self) -> usize {
        self.format.size()
    }

    pub fn end(&self) -> usize {
        self.offset + self.size()
    }
}

/// Ordered vertex elements plus stride. Equality and hashing cover both, so a layout can key a
/// cache directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    elements: Vec<VertexElement>,
    stride: usize,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a layout from container metadata. Unknown formats fall back to `Float4`.
    pub fn from_metadata(elements: &[InputElementMeta]) -> Result<Self, EngineError> {
        let mut layout = Self::new();
        for e in elements {
            layout.push(
                &e.semantic_name,
                e.semantic_index,
                VertexElementFormat::from_name_lossy(&e.format),
                e.aligned_byte_offset,
            )?;
        }
        Ok(layout)
    }

    /// Appends an element at an explicit offset.
    pub fn push(
        &mut self,
        semantic: &str,
        semantic_index: u32,
        format: VertexElementFormat,
        offset: usize,
    ) -> Result<(), EngineError> {
        if self.element(semantic, semantic_index).is_some() {
            return Err(EngineError::other(format!(
                "duplicate vertex element {semantic}{semantic_index}"
            )));
        }
        let element = VertexElement {
            semantic: semantic.to_string(),
            semantic_index,
            format,
            offset,
        };
        self.stride = self.stride.max(element.end());
        self.elements.push(element);
        Ok(())
    }

    /// Appends an element right after the current stride.
    pub fn push_auto(
        &mut self,
        semantic: &str,
        semantic_index: u32,
        format: VertexElementFormat,
    ) -> Result<(), EngineError> {
        let offset = self.stride;
        self.push(semantic, semantic_index, format, offset)
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, semantic: &str, semantic_index: u32) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.semantic_index == semantic_index && e.semantic.eq_ignore_ascii_case(semantic))
    }

    pub fn has_semantic(&self, semantic: &str) -> bool {
        self.elements
            .iter()
            .any(|e| e.semantic.eq_ignore_ascii_case(semantic))
    }
}

/// Somewhere a vertex layout can be discovered from.
pub trait LayoutSource {
    fn describe(&self) -> &'static str;

    /// `Ok(None)` when this source has nothing to say.
    fn vertex_layout(&self) -> Result<Option<VertexLayout>, EngineError>;
}

/// Layout declared in container metadata.
#[derive(Debug, Clone, Copy)]
pub struct MetadataLayout<'a>(pub &'a [InputElementMeta]);

impl LayoutSource for MetadataLayout<'_> {
    fn describe(&self) -> &'static str {
        "metadata"
    }

    fn vertex_layout(&self) -> Result<Option<VertexLayout>, EngineError> {
        if self.0.is_empty() {
            return Ok(None);
        }
        VertexLayout::from_metadata(self.0).map(Some)
    }
}

/// Reflection first, metadata as the fallback. A failing primary source is logged and skipped.
pub fn resolve_layout(
    primary: &dyn LayoutSource,
    fallback: &dyn LayoutSource,
) -> Result<Option<VertexLayout>, EngineError> {
    match primary.vertex_layout() {
        Ok(Some(layout)) if !layout.is_empty() => {
            tracing::debug!(source = primary.describe(), stride = layout.stride(), "vertex layout resolved");
            return Ok(Some(layout));
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(source = primary.describe(), error = %e, "layout discovery failed; falling back");
        }
    }
    let layout = fallback.vertex_layout()?;
    if let Some(l) = &layout {
        tracing::debug!(source = fallback.describe(), stride = l.stride(), "vertex layout resolved");
    }
    Ok(layout)
}
