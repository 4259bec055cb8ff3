//! Error types for the driver translation layer.

use std::io;
use thiserror::Error;

use crate::native::{LobHandle, NativeError};

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for driver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An argument value has no native mapping.
    #[error("argument {index}: unsupported bind type {type_name}")]
    UnsupportedBindType { index: usize, type_name: String },

    /// Array arguments of a batch have differing lengths.
    #[error("batch arguments have differing lengths (min {min}, max {max})")]
    BatchShapeMismatch { min: usize, max: usize },

    /// An array argument exceeds the batch ceiling.
    #[error("array argument of length {len} exceeds maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A native call failed.
    #[error("{context}: {source}")]
    Native {
        context: String,
        #[source]
        source: NativeError,
    },

    /// A result column has a type this crate cannot materialize.
    #[error("column {index}: unsupported column type {type_num}")]
    UnsupportedColumnType { index: usize, type_num: u32 },

    /// A fetched value could not be converted.
    #[error("Type conversion error: {message}")]
    TypeConversion { message: String },

    /// The LOB did not grow by the number of bytes written.
    #[error("{lob}: size {size} after write does not match offset {offset}")]
    LobSizeMismatch { lob: LobHandle, size: u64, offset: u64 },

    /// The operation was cancelled before it started.
    #[error("operation cancelled")]
    Cancelled,

    /// The statement was closed.
    #[error("statement is closed")]
    StatementClosed,

    /// I/O error from a LOB stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A blocking task panicked or was aborted.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wrap a native diagnostic with a description of the failed call.
    pub fn native(source: NativeError, context: impl Into<String>) -> Self {
        Self::Native {
            context: context.into(),
            source,
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported_bind(index: usize, type_name: impl Into<String>) -> Self {
        Self::UnsupportedBindType {
            index,
            type_name: type_name.into(),
        }
    }

    /// Prefix the context of a native error with the argument position.
    pub(crate) fn at_argument(self, index: usize) -> Self {
        match self {
            Error::Native { context, source } => Error::Native {
                context: format!("argument {}: {}", index, context),
                source,
            },
            other => other,
        }
    }

    /// Native error code, if this error came from the native layer.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Native { source, .. } => Some(source.code),
            _ => None,
        }
    }
}

/// Attach call context to native results.
pub(crate) trait NativeContext<T> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T>;
}

impl<T> NativeContext<T> for std::result::Result<T, NativeError> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|e| Error::native(e, context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let err = Error::native(
            NativeError::new(942, "ORA-00942: table or view does not exist"),
            "execute(mode=DEFAULT, batch=0)",
        );
        assert_eq!(
            err.to_string(),
            "execute(mode=DEFAULT, batch=0): ORA-00942: table or view does not exist"
        );
        assert_eq!(err.native_code(), Some(942));
    }

    #[test]
    fn test_shape_error_names_bounds() {
        let err = Error::BatchShapeMismatch { min: 2, max: 3 };
        let msg = err.to_string();
        assert!(msg.contains("min 2"));
        assert!(msg.contains("max 3"));
        assert_eq!(err.native_code(), None);
    }

    #[test]
    fn test_context_only_evaluated_on_error() {
        let ok: std::result::Result<u32, NativeError> = Ok(1);
        let value = ok.context(|| -> String { panic!("context built for Ok") }).unwrap();
        assert_eq!(value, 1);

        let err: std::result::Result<u32, NativeError> =
            Err(NativeError::new(1, "ORA-00001: unique constraint violated"));
        let err = err.context(|| format!("bind argument {}", 2)).unwrap_err();
        assert!(err.to_string().starts_with("bind argument 2"));
    }
}
