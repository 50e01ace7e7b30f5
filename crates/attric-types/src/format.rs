//! On-disk format version policy and metadata enums.
//!
//! Values are numeric (`YYYYMMDD`-shaped) so they stay monotonic and dense
//! enough to encode a calendar date, per the original storage engine this
//! crate is modeled on.

use std::fmt;

/// Value written by a freshly created store.
pub const CURRENT_FORMAT_VERSION: u32 = 20_230_214;

/// Lowest on-disk format version whose container tables carry a typed
/// column schema rather than a single opaque blob column.
pub const WITH_SCHEMA_FORMAT_VERSION: u32 = 20_210_621;

/// Format version at which `event_data_stream.yara_match` was added to the
/// schema-path column set. Tables created before this version lack the
/// column; opening one for write adds it via `ALTER TABLE`, and reading it
/// back before the column is added yields an absent field rather than an
/// error.
pub const WITH_YARA_MATCH_FORMAT_VERSION: u32 = 20_230_214;

/// Lowest format version this engine will rewrite to [`CURRENT_FORMAT_VERSION`]
/// on open-for-write.
pub const UPGRADE_COMPATIBLE_FORMAT_VERSION: u32 = 20_210_621;

/// Lowest format version this engine can append to.
pub const APPEND_COMPATIBLE_FORMAT_VERSION: u32 = 20_190_309;

/// Lowest format version this engine can read.
pub const READ_COMPATIBLE_FORMAT_VERSION: u32 = 20_190_309;

/// Compression applied to legacy-path (opaque blob) container rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression.
    None,
    /// DEFLATE/zlib compression.
    Zlib,
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionFormat::None => "none",
            CompressionFormat::Zlib => "zlib",
        })
    }
}

impl std::str::FromStr for CompressionFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionFormat::None),
            "zlib" => Ok(CompressionFormat::Zlib),
            _ => Err(()),
        }
    }
}

/// Serialization format used for legacy-path rows and non-scalar fields.
/// Only `json` is currently supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFormat {
    /// JSON text encoding.
    Json,
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SerializationFormat::Json => "json",
        })
    }
}

impl std::str::FromStr for SerializationFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(SerializationFormat::Json),
            _ => Err(()),
        }
    }
}
