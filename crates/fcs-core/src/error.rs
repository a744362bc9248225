use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while decoding a shader container.
///
/// Truncated block records are not an error: the parser keeps what it decoded and logs the
/// offset instead.
#[derive(thiserror::Error, Debug)]
pub enum ContainerError {
    #[error("bad magic {found:02x?} (expected \"FCSC\")")]
    BadMagic { found: Vec<u8> },

    #[error("container header truncated: {len} bytes")]
    Header { len: usize },

    #[error("brotli decompression failed: {0}")]
    Decompress(#[source] io::Error),

    #[error("metadata block is not valid JSON: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Engine-level errors used across fcs crates.
///
/// Contract rule: this type lives in `fcs-core` and is re-exported by runtimes.
#[derive(Debug)]
pub enum EngineError {
    // ---- Core / config (SDK-level) ----
    Io {
        path: PathBuf,
        source: io::Error,
    },

    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    InvalidConfig {
        path: PathBuf,
        msg: String,
    },

    // ---- Container / pipeline ----
    /// Container could not be decoded. `origin` is the path or label it was loaded from.
    Format {
        origin: String,
        source: ContainerError,
    },

    /// Begin/Draw/End protocol violated (programmer error).
    State(String),

    /// An arena could not grow far enough.
    Capacity {
        arena: &'static str,
        requested: usize,
        limit: usize,
    },

    /// A vertex attribute declares a format the packer cannot encode.
    UnsupportedFormat {
        semantic: String,
        format: String,
    },

    BackendUnimplemented(String),

    /// Parameter write outside the declared constant buffer.
    ParameterBounds {
        slot: u32,
        offset: usize,
        size: usize,
        capacity: usize,
    },

    UnknownParameter(String),

    // ---- Runtime-facing (backend) ----
    VertexCompile(String),
    FragmentCompile(String),
    ComputeCompile(String),
    Link(String),
    GlCreate(String),
    DeviceCreate(String),

    // ---- Fallback ----
    Other(String),
}

impl EngineError {
    pub fn other<T: Into<String>>(s: T) -> Self {
        EngineError::Other(s.into())
    }

    pub fn state<T: Into<String>>(s: T) -> Self {
        EngineError::State(s.into())
    }

    pub fn format(origin: impl Into<String>, source: ContainerError) -> Self {
        EngineError::Format {
            origin: origin.into(),
            source,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io { path, source } => {
                write!(f, "io error at {}: {}", path.display(), source)
            }
            EngineError::Json { path, source } => {
                write!(f, "json parse error at {}: {}", path.display(), source)
            }
            EngineError::InvalidConfig { path, msg } => {
                write!(f, "invalid config at {}: {}", path.display(), msg)
            }

            EngineError::Format { origin, source } => {
                write!(f, "invalid shader container {origin}: {source}")
            }
            EngineError::State(msg) => write!(f, "invalid state: {msg}"),
            EngineError::Capacity {
                arena,
                requested,
                limit,
            } => write!(
                f,
                "{arena} arena cannot hold {requested} bytes (limit {limit})"
            ),
            EngineError::UnsupportedFormat { semantic, format } => {
                write!(f, "unsupported vertex format '{format}' for semantic {semantic}")
            }
            EngineError::BackendUnimplemented(name) => {
                write!(f, "{name}: backend not implemented")
            }
            EngineError::ParameterBounds {
                slot,
                offset,
                size,
                capacity,
            } => write!(
                f,
                "parameter write out of bounds: slot {slot}, offset {offset} + size {size} > {capacity}"
            ),
            EngineError::UnknownParameter(name) => write!(f, "unknown parameter '{name}'"),

            EngineError::VertexCompile(msg) => write!(f, "vertex shader compile error: {msg}"),
            EngineError::FragmentCompile(msg) => write!(f, "fragment shader compile error: {msg}"),
            EngineError::ComputeCompile(msg) => write!(f, "compute shader compile error: {msg}"),
            EngineError::Link(msg) => write!(f, "program link error: {msg}"),
            EngineError::GlCreate(msg) => write!(f, "backend object creation failed: {msg}"),
            EngineError::DeviceCreate(msg) => write!(f, "device object creation failed: {msg}"),

            EngineError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io { source, .. } => Some(source),
            EngineError::Json { source, .. } => Some(source),
            EngineError::Format { source, .. } => Some(source),
            _ => None,
        }
    }
}
