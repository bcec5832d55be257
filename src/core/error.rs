//! Error types for Gneiss.
//!
//! Uses thiserror for structured errors with context. Errors are split by
//! where they surface:
//! - [`ImageError`] is raised per image and always ends up inside a
//!   [`WorkResult`](crate::core::batch::WorkResult), never out of a batch
//! - [`BatchError`] is raised before dispatch, when the batch itself is unusable
//! - [`ConfigError`] comes from loading [`Settings`](crate::config::Settings)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Gneiss.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum GneissError {
    /// A single image failed.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// A batch could not start.
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a per-image failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input could not be decoded (corrupt or truncated data).
    Decode,
    /// Input or output format is not supported.
    UnsupportedFormat,
    /// Permission, missing file or directory, disk full.
    Filesystem,
    /// Invalid operation parameter, e.g. crop rectangle out of bounds.
    Operation,
    /// Batch-level stop was triggered before the item ran.
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Decode => "decode",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Operation => "operation",
            ErrorKind::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading, transforming or saving one image.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The input exists but its contents are not a valid image.
    #[error("Failed to decode {path}: {message}")]
    Decode {
        /// Input file.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// No codec for the format.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format name or offending extension.
        format: String,
    },

    /// Reading or writing a file failed.
    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline step or encoder rejected the image.
    #[error("Operation '{operation}' failed: {message}")]
    Operation {
        /// Step name, e.g. `crop` or `encode`.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// The batch stopped before this item ran.
    #[error("Batch aborted before this item ran")]
    Aborted,
}

impl ImageError {
    /// Create an operation error.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ImageError::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a filesystem error for a path.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Get the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::Decode { .. } => ErrorKind::Decode,
            ImageError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ImageError::Filesystem { .. } => ErrorKind::Filesystem,
            ImageError::Operation { .. } => ErrorKind::Operation,
            ImageError::Aborted => ErrorKind::Aborted,
        }
    }

    /// Translate a decoder error from the `image` crate, attributing it to
    /// the input `path`.
    pub fn from_decoder(path: &std::path::Path, error: image::ImageError) -> Self {
        match error {
            image::ImageError::IoError(source) => ImageError::filesystem(path, source),
            image::ImageError::Unsupported(e) => ImageError::UnsupportedFormat {
                format: e.to_string(),
            },
            other => ImageError::Decode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        }
    }

    /// Translate an encoder error from the `image` crate, attributing it to
    /// the output `path`.
    ///
    /// Only errors coming from the operating system count as filesystem
    /// failures. Encoders also report rejected images (zero size, too large)
    /// through `io::Error`; those are operation failures.
    pub fn from_encoder(path: &std::path::Path, error: image::ImageError) -> Self {
        match error {
            image::ImageError::IoError(source) if is_os_failure(&source) => {
                ImageError::filesystem(path, source)
            }
            image::ImageError::Unsupported(e) => ImageError::UnsupportedFormat {
                format: e.to_string(),
            },
            other => ImageError::operation("encode", format!("{}: {}", path.display(), other)),
        }
    }
}

fn is_os_failure(error: &std::io::Error) -> bool {
    use std::io::ErrorKind as Io;

    error.raw_os_error().is_some()
        || matches!(
            error.kind(),
            Io::NotFound | Io::PermissionDenied | Io::AlreadyExists | Io::WriteZero
        )
}

/// Errors that stop a batch before any item is dispatched.
#[derive(Error, Debug)]
pub enum BatchError {
    /// `max_workers` (or a pool size) of zero.
    #[error("max_workers must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// `error_limit` of zero.
    #[error("error_limit must be at least 1, got {0}")]
    InvalidErrorLimit(usize),

    /// An output directory could not be created.
    #[error("Cannot create output directory {path}: {source}")]
    OutputDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The rayon pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    /// A glob pattern matched nothing.
    #[error("No input files found matching pattern: {pattern}")]
    NoInputsFound {
        /// The pattern as given.
        pattern: String,
    },

    /// A glob pattern could not be parsed.
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Parser message.
        message: String,
    },
}

/// Errors from loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`](crate::config::Settings).
    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A format name no codec handles.
    #[error("Unknown image format '{0}'")]
    UnknownFormat(String),

    /// A value is out of range or malformed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Settings key, e.g. `rotate.fill`.
        key: String,
        /// What was wrong.
        message: String,
    },
}

/// Result type alias for Gneiss operations.
pub type GneissResult<T> = Result<T, GneissError>;

/// Result type alias for per-image operations.
pub type ImageResult<T> = Result<T, ImageError>;
