// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::ValueType;

/// Error during (de)serialization of a chunk or meta snapshot.
#[derive(Debug)]
pub enum CodecError {
    /// `bincode` failed to encode or decode a value.
    Bincode(bincode::Error),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CodecError({})",
            match self {
                Self::Bincode(e) => e.to_string(),
            }
        )
    }
}

impl std::error::Error for CodecError {}

impl From<bincode::Error> for CodecError {
    fn from(value: bincode::Error) -> Self {
        Self::Bincode(value)
    }
}

/// Represents errors that can occur in the storage engine.
///
/// Generic over `E`, the backing [`crate::store::BlobStore`]'s own error type, since the
/// core never assumes a concrete store implementation.
#[derive(Debug)]
pub enum Error<E> {
    /// The backing blob store failed a `get` or `set`.
    Store(E),

    /// A chunk or meta snapshot could not be encoded or decoded.
    Codec(CodecError),

    /// A row passed to [`crate::table::Table::insert`] did not contain the order key.
    MissingOrderKey,

    /// A row value was neither a number nor a string.
    UnsupportedColumnType,

    /// A table's configured order value type does not match the type found while
    /// rehydrating from a meta snapshot.
    OrderTypeMismatch {
        /// The type recorded in the table's configuration.
        expected: ValueType,
        /// The type recorded in the meta snapshot being loaded.
        found: ValueType,
    },

}

impl<E: std::fmt::Display> std::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "blob store error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::MissingOrderKey => write!(f, "row is missing the order key"),
            Self::UnsupportedColumnType => {
                write!(f, "column value is neither a number nor a string")
            }
            Self::OrderTypeMismatch { expected, found } => write!(
                f,
                "order value type mismatch: configured as {expected:?}, found {found:?} in meta snapshot"
            ),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for Error<E> {}

impl<E> From<CodecError> for Error<E> {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

impl<E> From<bincode::Error> for Error<E> {
    fn from(value: bincode::Error) -> Self {
        Self::Codec(CodecError::Bincode(value))
    }
}

/// Storage engine result.
pub type Result<T, E> = std::result::Result<T, Error<E>>;
