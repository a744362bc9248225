//! FCS shader container decoding.
//!
//! Layout (little-endian):
//! - optional `0x5A` byte: the remainder is a Brotli stream
//! - `"FCSC"` magic, `i32` version
//! - records `(i32 type, i32 len, [u8; len])` while at least 8 bytes remain
//!
//! A record whose length is negative or runs past the end stops the walk. Everything decoded
//! up to that point is kept and the truncation offset is reported through `tracing`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use fcs_core::ContainerError;
use fcs_core::EngineError;

pub const COMPRESSION_MARKER: u8 = 0x5A;
pub const MAGIC: &[u8; 4] = b"FCSC";

const RECORD_HEADER_LEN: usize = 8;
const BROTLI_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    AlignedSource,
    DxbcVertex,
    DxbcPixel,
    DxbcCompute,
    GlslVertex,
    GlslPixel,
    GlslCompute,
    SpirvVertex,
    SpirvPixel,
    SpirvCompute,
    Metadata,
}

impl BlockType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => BlockType::AlignedSource,
            2 => BlockType::DxbcVertex,
            3 => BlockType::DxbcPixel,
            4 => BlockType::DxbcCompute,
            30 => BlockType::GlslVertex,
            31 => BlockType::GlslPixel,
            32 => BlockType::GlslCompute,
            40 => BlockType::SpirvVertex,
            41 => BlockType::SpirvPixel,
            42 => BlockType::SpirvCompute,
            100 => BlockType::Metadata,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            BlockType::AlignedSource => 1,
            BlockType::DxbcVertex => 2,
            BlockType::DxbcPixel => 3,
            BlockType::DxbcCompute => 4,
            BlockType::GlslVertex => 30,
            BlockType::GlslPixel => 31,
            BlockType::GlslCompute => 32,
            BlockType::SpirvVertex => 40,
            BlockType::SpirvPixel => 41,
            BlockType::SpirvCompute => 42,
            BlockType::Metadata => 100,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Reflection metadata (block 100)
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableMeta {
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CBufferMeta {
    #[serde(default)]
    pub name: String,
    pub slot: u32,
    pub total_size: usize,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputElementMeta {
    pub semantic_name: String,
    #[serde(default)]
    pub semantic_index: u32,
    pub format: String,
    #[serde(default)]
    pub aligned_byte_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextureMeta {
    #[serde(default)]
    pub name: String,
    pub slot: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    #[serde(default)]
    pub buffers: Vec<CBufferMeta>,
    #[serde(default)]
    pub input_elements: Vec<InputElementMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ps_entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cs_entry: Option<String>,
    #[serde(default)]
    pub textures: Vec<TextureMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_y: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_z: Option<u32>,
}

impl Metadata {
    /// Compute thread-group size, falling back per axis to `default`.
    pub fn thread_group(&self, default: [u32; 3]) -> [u32; 3] {
        let pick = |v: Option<u32>, d: u32| v.filter(|&t| t > 0).unwrap_or(d);
        [
            pick(self.thread_x, default[0]),
            pick(self.thread_y, default[1]),
            pick(self.thread_z, default[2]),
        ]
    }

    /// Number of texture slots a material needs (`max slot + 1`, at least 1 for the main texture).
    pub fn texture_slot_count(&self) -> usize {
        self.textures
            .iter()
            .map(|t| t.slot as usize + 1)
            .max()
            .unwrap_or(1)
            .max(1)
    }

    pub fn buffer(&self, slot: u32) -> Option<&CBufferMeta> {
        self.buffers.iter().find(|b| b.slot == slot)
    }
}

// -------------------------------------------------------------------------------------------------
// Container
// -------------------------------------------------------------------------------------------------

/// Decoded shader container. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub version: i32,
    pub aligned_source: Option<Vec<u8>>,
    pub dxbc_vertex: Option<Vec<u8>>,
    pub dxbc_pixel: Option<Vec<u8>>,
    pub dxbc_compute: Option<Vec<u8>>,
    pub glsl_vertex: Option<String>,
    pub glsl_pixel: Option<String>,
    pub glsl_compute: Option<String>,
    pub spirv_vertex: Option<Vec<u8>>,
    pub spirv_pixel: Option<Vec<u8>>,
    pub spirv_compute: Option<Vec<u8>>,
    pub metadata: Metadata,
    /// Byte offset of the record that stopped parsing early, if any.
    pub truncated_at: Option<usize>,
}

impl Container {
    /// Reads and decodes a container file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&path.display().to_string(), &bytes)
    }

    /// Decodes an in-memory container. `origin` labels logs and errors.
    pub fn from_bytes(origin: &str, bytes: &[u8]) -> Result<Self, EngineError> {
        Self::parse_labeled(origin, bytes).map_err(|e| EngineError::format(origin, e))
    }

    /// Decodes an in-memory container without an origin label.
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        Self::parse_labeled("<memory>", bytes)
    }

    fn parse_labeled(origin: &str, bytes: &[u8]) -> Result<Self, ContainerError> {
        let inflated;
        let data: &[u8] = if bytes.first() == Some(&COMPRESSION_MARKER) {
            let mut out = Vec::new();
            brotli::Decompressor::new(&bytes[1..], BROTLI_BUFFER)
                .read_to_end(&mut out)
                .map_err(ContainerError::Decompress)?;
            inflated = out;
            &inflated
        } else {
            bytes
        };

        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(ContainerError::BadMagic {
                found: data.iter().take(MAGIC.len()).copied().collect(),
            });
        }
        if data.len() < RECORD_HEADER_LEN {
            return Err(ContainerError::Header { len: data.len() });
        }

        let mut out = Container {
            version: read_i32(data, 4),
            ..Container::default()
        };

        let mut pos = RECORD_HEADER_LEN;
        while data.len() - pos >= RECORD_HEADER_LEN {
            let code = read_i32(data, pos);
            let len = read_i32(data, pos + 4);
            let body_start = pos + RECORD_HEADER_LEN;

            let body_end = usize::try_from(len)
                .ok()
                .and_then(|l| body_start.checked_add(l))
                .filter(|&end| end <= data.len());
            let Some(body_end) = body_end else {
                tracing::warn!(
                    origin,
                    block_type = code,
                    offset = pos,
                    len,
                    "container record overruns the stream; keeping blocks parsed so far"
                );
                out.truncated_at = Some(pos);
                break;
            };

            out.store(code, &data[body_start..body_end])?;
            pos = body_end;
        }

        tracing::debug!(
            origin,
            version = out.version,
            truncated = out.truncated_at.is_some(),
            "container decoded"
        );
        Ok(out)
    }

    fn store(&mut self, code: i32, body: &[u8]) -> Result<(), ContainerError> {
        let Some(kind) = BlockType::from_code(code) else {
            tracing::debug!(block_type = code, len = body.len(), "skipping unknown container block");
            return Ok(());
        };
        let text = || String::from_utf8_lossy(body).into_owned();
        match kind {
            BlockType::AlignedSource => self.aligned_source = Some(body.to_vec()),
            BlockType::DxbcVertex => self.dxbc_vertex = Some(body.to_vec()),
            BlockType::DxbcPixel => self.dxbc_pixel = Some(body.to_vec()),
            BlockType::DxbcCompute => self.dxbc_compute = Some(body.to_vec()),
            BlockType::GlslVertex => self.glsl_vertex = Some(text()),
            BlockType::GlslPixel => self.glsl_pixel = Some(text()),
            BlockType::GlslCompute => self.glsl_compute = Some(text()),
            BlockType::SpirvVertex => self.spirv_vertex = Some(body.to_vec()),
            BlockType::SpirvPixel => self.spirv_pixel = Some(body.to_vec()),
            BlockType::SpirvCompute => self.spirv_compute = Some(body.to_vec()),
            BlockType::Metadata => self.metadata = serde_json::from_slice(body)?,
        }
        Ok(())
    }
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[at..at + 4]);
    i32::from_le_bytes(b)
}

// -------------------------------------------------------------------------------------------------
// Writer
// -------------------------------------------------------------------------------------------------

/// Assembles container bytes. Used by tooling and tests.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    version: i32,
    records: Vec<(i32, Vec<u8>)>,
}

impl ContainerBuilder {
    pub fn new(version: i32) -> Self {
        Self {
            version,
            records: Vec::new(),
        }
    }

    pub fn block(mut self, kind: BlockType, body: impl Into<Vec<u8>>) -> Self {
        self.records.push((kind.code(), body.into()));
        self
    }

    /// Appends a record with an arbitrary type code (unknown codes are skipped by the reader).
    pub fn raw_block(mut self, code: i32, body: impl Into<Vec<u8>>) -> Self {
        self.records.push((code, body.into()));
        self
    }

    pub fn metadata(self, meta: &Metadata) -> Result<Self, ContainerError> {
        let json = serde_json::to_vec(meta)?;
        Ok(self.block(BlockType::Metadata, json))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            RECORD_HEADER_LEN
                + self
                    .records
                    .iter()
                    .map(|(_, b)| b.len() + RECORD_HEADER_LEN)
                    .sum::<usize>(),
        );
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        for (code, body) in &self.records {
            out.extend_from_slice(&code.to_le_bytes());
            out.extend_from_slice(&(body.len() as i32).to_le_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    /// Same as [`ContainerBuilder::build`], Brotli-compressed behind the marker byte.
    pub fn build_compressed(&self, quality: u32) -> Result<Vec<u8>, ContainerError> {
        let raw = self.build();
        let mut out = vec![COMPRESSION_MARKER];
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, BROTLI_BUFFER, quality, 22);
            writer.write_all(&raw).map_err(ContainerError::Decompress)?;
            writer.flush().map_err(ContainerError::Decompress)?;
        }
        Ok(out)
    }
}
