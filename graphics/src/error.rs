//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics system.
///
/// Nothing in the recording core is designed to be retried: every variant
/// returned from [`GraphicsContext::end`](crate::GraphicsContext::end) or from
/// resource creation means either a development-time bug or a device that
/// cannot keep rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource or cached native object.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// An enum value reached backend translation that has no native mapping.
    UnsupportedEnumValue {
        /// What kind of value was being translated (e.g. `"vk::Format"`).
        kind: &'static str,
        /// The offending numeric value.
        value: i64,
    },
    /// A cache entry was erased that does not exist.
    ObjectNotFound(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::UnsupportedEnumValue { kind, value } => {
                write!(f, "unsupported {kind} value: {value}")
            }
            Self::ObjectNotFound(msg) => write!(f, "object not found: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
