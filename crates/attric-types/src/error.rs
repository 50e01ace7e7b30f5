//! Errors raised while encoding, decoding or validating containers.
//!
//! These are the type-system-level errors; stores wrap them
//! into their own `StoreError` rather than leaking them across the store
//! contract boundary.

use crate::container_type::ContainerType;

/// Errors raised by the schema registry, the serializer or the compressor.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// The container type is not declared in the schema registry.
    #[error("unsupported container type: {0}")]
    UnsupportedContainerType(String),

    /// Encoding or decoding a container's fields failed.
    #[error("failed to serialize container: {0}")]
    SerializationError(String),

    /// A reference field held an identifier of the wrong backend kind, or
    /// was missing where one was required.
    #[error("unsupported identifier for {container_type}.{field}")]
    UnsupportedIdentifier {
        /// Container type the field belongs to.
        container_type: ContainerType,
        /// Runtime field name.
        field: &'static str,
    },
}
