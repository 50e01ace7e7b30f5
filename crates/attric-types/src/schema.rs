//! The process-wide schema and reference-map registry.

use crate::container_type::ContainerType;

/// Semantic type of a declared container field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `str`
    Str,
    /// `timestamp` (microseconds since the Unix epoch, stored as an integer).
    Timestamp,
    /// `list<str>`
    ListStr,
    /// `AttributeContainerIdentifier` — a reference field.
    Identifier,
    /// Anything else: serialized to its textual representation.
    Opaque,
}

/// Storage column type a [`SemanticType`] maps to in the durable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// SQLite `INTEGER`.
    Integer,
    /// SQLite `TEXT`.
    Text,
    /// SQLite `BIGINT`.
    BigInt,
}

impl ColumnType {
    /// The literal SQL type name used in `CREATE TABLE`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::BigInt => "BIGINT",
        }
    }
}

/// Maps a scalar [`SemanticType`] to its storage column type. Non-scalar
/// types (`ListStr`, `Opaque`) are not covered here: callers fall back to
/// `TEXT`, matching `_CONTAINER_SCHEMA_TO_SQLITE_TYPE_MAPPINGS` in the
/// original engine.
pub fn column_type(semantic_type: SemanticType) -> ColumnType {
    match semantic_type {
        SemanticType::Bool => ColumnType::Integer,
        SemanticType::Int => ColumnType::Integer,
        SemanticType::Identifier => ColumnType::Integer,
        SemanticType::Timestamp => ColumnType::BigInt,
        SemanticType::Str => ColumnType::Text,
        SemanticType::ListStr | SemanticType::Opaque => ColumnType::Text,
    }
}

/// One declared field: runtime name, semantic type, and the format version
/// at which it was introduced (older readers treat it as absent, not an
/// error).
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    /// Field name as it appears in the runtime container and, for scalar
    /// fields, as the literal column name.
    pub name: &'static str,
    /// Declared semantic type.
    pub semantic_type: SemanticType,
    /// Minimum on-disk format version at which this field is populated.
    pub since_format_version: u32,
}

/// One reference field declaration: the field holds an [`Identifier`] of
/// `referenced_type`, stored under `serialized_name` on disk.
///
/// [`Identifier`]: crate::identifier::Identifier
#[derive(Debug, Clone, Copy)]
pub struct ReferenceField {
    /// Container type the identifier refers to.
    pub referenced_type: ContainerType,
    /// Runtime field name (holds an `Identifier`).
    pub runtime_name: &'static str,
    /// On-disk field name (holds the bare `u64` sequence number).
    pub serialized_name: &'static str,
}

/// Whether a container type's rows are stored as typed columns ("schema
/// path") or as a single serialized/compressed blob column ("legacy path").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageShape {
    /// One column per declared field.
    Schema,
    /// Single `_data` column holding the serialized (optionally compressed)
    /// container.
    Legacy,
}

/// Returns the declared fields for `container_type`, in schema order
/// (the order columns are created in and, sorted by name, the order they
/// are written/read in).
pub fn fields(container_type: ContainerType) -> &'static [FieldSchema] {
    use ContainerType::*;
    use SemanticType::*;

    const V: u32 = crate::format::WITH_SCHEMA_FORMAT_VERSION;

    match container_type {
        AnalysisWarning => &[
            FieldSchema { name: "message", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "plugin_name", semantic_type: Str, since_format_version: V },
        ],
        Event => &[
            FieldSchema {
                name: "_event_data_row_identifier",
                semantic_type: Identifier,
                since_format_version: V,
            },
            FieldSchema { name: "timestamp", semantic_type: Timestamp, since_format_version: V },
            FieldSchema { name: "timestamp_desc", semantic_type: Str, since_format_version: V },
        ],
        EventDataStream => &[
            FieldSchema { name: "file_entropy", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "md5_hash", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "path_spec", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "sha1_hash", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "sha256_hash", semantic_type: Str, since_format_version: V },
            FieldSchema {
                name: "yara_match",
                semantic_type: Str,
                since_format_version: crate::format::WITH_YARA_MATCH_FORMAT_VERSION,
            },
        ],
        EventSource => &[
            FieldSchema { name: "data_type", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "file_entry_type", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "path_spec", semantic_type: Str, since_format_version: V },
        ],
        EventTag => &[
            FieldSchema {
                name: "_event_row_identifier",
                semantic_type: Identifier,
                since_format_version: V,
            },
            FieldSchema { name: "labels", semantic_type: ListStr, since_format_version: V },
        ],
        ExtractionWarning => &[
            FieldSchema { name: "message", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "parser_chain", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "path_spec", semantic_type: Str, since_format_version: V },
        ],
        PreprocessingWarning => &[
            FieldSchema { name: "message", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "path_spec", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "plugin_name", semantic_type: Str, since_format_version: V },
        ],
        RecoveryWarning => &[
            FieldSchema { name: "message", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "parser_chain", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "path_spec", semantic_type: Str, since_format_version: V },
        ],
        WindowsEventlogProvider => &[
            FieldSchema {
                name: "category_message_files",
                semantic_type: ListStr,
                since_format_version: V,
            },
            FieldSchema {
                name: "event_message_files",
                semantic_type: ListStr,
                since_format_version: V,
            },
            FieldSchema { name: "log_source", semantic_type: Str, since_format_version: V },
            FieldSchema { name: "log_type", semantic_type: Str, since_format_version: V },
            FieldSchema {
                name: "parameter_message_files",
                semantic_type: ListStr,
                since_format_version: V,
            },
        ],
        // Legacy-path types carry no declared column schema: the whole
        // container is serialized into the `_data` blob column.
        EventData | SessionStart | SessionCompletion | SessionConfiguration
        | SystemConfiguration | TaskStart | TaskCompletion => &[],
    }
}

/// Returns the declared reference fields for `container_type`.
pub fn references(container_type: ContainerType) -> &'static [ReferenceField] {
    use ContainerType::*;

    match container_type {
        Event => &[ReferenceField {
            referenced_type: EventData,
            runtime_name: "event_data_identifier",
            serialized_name: "_event_data_row_identifier",
        }],
        EventTag => &[ReferenceField {
            referenced_type: Event,
            runtime_name: "event_identifier",
            serialized_name: "_event_row_identifier",
        }],
        EventData => &[ReferenceField {
            referenced_type: EventDataStream,
            runtime_name: "event_data_stream_identifier",
            serialized_name: "_event_data_stream_row_identifier",
        }],
        _ => &[],
    }
}

/// Whether `container_type` is written as typed columns or as an opaque
/// blob.
pub fn storage_shape(container_type: ContainerType) -> StorageShape {
    if fields(container_type).is_empty() {
        StorageShape::Legacy
    } else {
        StorageShape::Schema
    }
}
