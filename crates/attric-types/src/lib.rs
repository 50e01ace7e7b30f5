#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **attric-types** – Container types, schema registry, serializer and
//! compressor for the attribute-container storage engine.
//!
//! This crate is dependency-light and sits at the bottom of the crate
//! graph: `attric-store-core` and the concrete backends depend on it, never
//! the other way around. It makes no assumptions about how containers are
//! persisted — that is the store crates' job.

/// Store-assigned surrogate keys ([`Identifier`]).
pub mod identifier;

/// Container type tags and the session/task storage partition.
pub mod container_type;

/// On-disk format version policy and metadata enums.
pub mod format;

/// Errors raised while encoding, decoding or validating containers.
pub mod error;

/// Optional zlib wrap/unwrap for the legacy opaque-blob column.
pub mod compressor;

/// The process-wide schema and reference-map registry.
pub mod schema;

/// The `Container` enum, per-type field structs, and row/blob codecs.
pub mod container;

pub use container::{Container, FieldValue};
pub use container_type::{ContainerType, StorageType};
pub use error::ContainerError;
pub use format::{CompressionFormat, SerializationFormat};
pub use identifier::Identifier;

/// Re-exports the common set of types a store crate needs.
pub mod prelude {
    pub use crate::compressor;
    pub use crate::container::{
        decode_legacy_value, decode_schema_row, encode_legacy_value, encode_schema_row,
    };
    pub use crate::container_type::{ALL_CONTAINER_TYPES, SESSION_STORE_ONLY, TASK_STORE_ONLY};
    pub use crate::format::{
        APPEND_COMPATIBLE_FORMAT_VERSION, CURRENT_FORMAT_VERSION, READ_COMPATIBLE_FORMAT_VERSION,
        UPGRADE_COMPATIBLE_FORMAT_VERSION, WITH_SCHEMA_FORMAT_VERSION, WITH_YARA_MATCH_FORMAT_VERSION,
    };
    pub use crate::schema::{self, ColumnType, FieldSchema, ReferenceField, SemanticType, StorageShape};
    pub use crate::{CompressionFormat, Container, ContainerError, ContainerType, FieldValue, Identifier, SerializationFormat, StorageType};
}
