use crate::av::CodecId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by byte sources, sessions, decoders and transform stages.
///
/// Flow-control outcomes (`Busy`, `NeedsMoreInput`, end of stream) are not
/// errors; they are reported through [`crate::codec::SendStatus`],
/// [`crate::codec::ReceiveStatus`] and [`crate::format::ReadStatus`].
#[derive(Error, Debug)]
pub enum AvError {
    /// Read or seek failure of the underlying byte source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure attributed to a named resource (file path, directory).
    #[error("io error on {}: {source}", .resource.display())]
    ResourceIo {
        /// The resource that failed.
        resource: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Container could not be identified or is malformed.
    #[error("format error: {0}")]
    Format(String),

    /// No decoder implementation is registered for the codec.
    #[error("no decoder available for codec {0}")]
    UnsupportedCodec(CodecId),

    /// Pixel/sample/image format that is known but not handled.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed payload handed to a decoder.
    #[error("codec error: {0}")]
    Codec(String),

    /// Caller misuse: double close, seek on a sequential source,
    /// geometry/buffer mismatch. Not meant to be recovered from.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Image encode/decode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AvError {
    /// Builds a [`AvError::ResourceIo`] for `resource`.
    pub fn resource_io(resource: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AvError::ResourceIo {
            resource: resource.into(),
            source,
        }
    }

    /// Builds a [`AvError::ContractViolation`].
    pub fn contract(message: impl Into<String>) -> Self {
        AvError::ContractViolation(message.into())
    }

    /// Builds a [`AvError::Format`].
    pub fn format(message: impl Into<String>) -> Self {
        AvError::Format(message.into())
    }

    /// Returns true for byte-source failures.
    pub fn is_io(&self) -> bool {
        matches!(self, AvError::Io(_) | AvError::ResourceIo { .. })
    }

    /// Returns true for caller misuse.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, AvError::ContractViolation(_))
    }

    /// Attaches a resource name to a bare I/O error; other errors pass through.
    pub(crate) fn with_resource(self, resource: &str) -> Self {
        match self {
            AvError::Io(source) => AvError::resource_io(resource, source),
            AvError::Format(message) => AvError::Format(format!("{resource}: {message}")),
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AvError>;
