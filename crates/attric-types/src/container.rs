//! The `Container` enum: one struct per attribute container type.
//!
//! Dynamic attribute access in the original engine (`setattr`/`getattr` by
//! field name) is replaced here by a tagged variant plus the schema
//! registry. Reference fields hold a typed [`Identifier`] at runtime and
//! never appear in the serialized JSON form directly; the rewrite to/from
//! their on-disk integer form is done explicitly by
//! [`encode_schema_row`]/[`decode_schema_row`] and
//! [`encode_legacy_value`]/[`decode_legacy_value`], never inside `Serialize`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::container_type::ContainerType;
use crate::error::ContainerError;
use crate::identifier::Identifier;
use crate::schema::{self, SemanticType};

/// A decoded/encoded value for one column or blob-embedded field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `bool` semantic type.
    Bool(bool),
    /// `int` semantic type.
    Int(i64),
    /// `str` semantic type.
    Str(String),
    /// `timestamp` semantic type (microseconds since the Unix epoch).
    Timestamp(i64),
    /// `list<str>` semantic type.
    ListStr(Vec<String>),
    /// A rewritten reference field: the referenced container's sequence
    /// number, never the identifier object itself.
    RowRef(u64),
    /// Anything else, carried as its JSON representation.
    Opaque(Value),
}

impl FieldValue {
    /// Convert to the JSON representation stored for non-scalar/legacy use.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => json!(b),
            FieldValue::Int(i) => json!(i),
            FieldValue::Str(s) => json!(s),
            FieldValue::Timestamp(t) => json!(t),
            FieldValue::ListStr(v) => json!(v),
            FieldValue::RowRef(n) => json!(n),
            FieldValue::Opaque(v) => v.clone(),
        }
    }

    /// Interpret `value` as a [`FieldValue`] of the given semantic type.
    /// Returns `None` for JSON `null` or a type mismatch (treated as an
    /// absent field, per the additive-schema-evolution tolerance).
    pub fn from_json(value: &Value, semantic_type: SemanticType) -> Option<FieldValue> {
        if value.is_null() {
            return None;
        }
        match semantic_type {
            SemanticType::Bool => value.as_bool().map(FieldValue::Bool),
            SemanticType::Int => value.as_i64().map(FieldValue::Int),
            SemanticType::Timestamp => value.as_i64().map(FieldValue::Timestamp),
            SemanticType::Str => value.as_str().map(|s| FieldValue::Str(s.to_string())),
            SemanticType::ListStr => value.as_array().map(|arr| {
                FieldValue::ListStr(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            }),
            SemanticType::Identifier => None,
            SemanticType::Opaque => Some(FieldValue::Opaque(value.clone())),
        }
    }
}

macro_rules! container_enum {
    ($($variant:ident),+ $(,)?) => {
        /// A typed attribute container.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Container {
            $(
                #[allow(missing_docs)]
                $variant($variant),
            )+
        }

        impl Container {
            /// The container's type tag.
            pub fn container_type(&self) -> ContainerType {
                match self {
                    $(Container::$variant(_) => ContainerType::$variant,)+
                }
            }

            /// The container's assigned identifier, if any.
            pub fn identifier(&self) -> Option<Identifier> {
                match self {
                    $(Container::$variant(c) => c.identifier,)+
                }
            }

            /// Assigns an identifier to the container.
            pub fn set_identifier(&mut self, id: Identifier) {
                match self {
                    $(Container::$variant(c) => c.identifier = Some(id),)+
                }
            }
        }
    };
}

container_enum!(
    AnalysisWarning,
    Event,
    EventData,
    EventDataStream,
    EventSource,
    EventTag,
    ExtractionWarning,
    PreprocessingWarning,
    RecoveryWarning,
    WindowsEventlogProvider,
    SessionStart,
    SessionCompletion,
    SessionConfiguration,
    SystemConfiguration,
    TaskStart,
    TaskCompletion,
);

impl Container {
    /// Reads a declared reference field by its runtime name.
    pub fn get_reference(&self, runtime_name: &str) -> Option<Identifier> {
        match self {
            Container::Event(c) if runtime_name == "event_data_identifier" => c.event_data_identifier,
            Container::EventTag(c) if runtime_name == "event_identifier" => c.event_identifier,
            Container::EventData(c) if runtime_name == "event_data_stream_identifier" => {
                c.event_data_stream_identifier
            }
            _ => None,
        }
    }

    /// Writes a declared reference field by its runtime name.
    pub fn set_reference(&mut self, runtime_name: &str, id: Identifier) {
        match self {
            Container::Event(c) if runtime_name == "event_data_identifier" => {
                c.event_data_identifier = Some(id)
            }
            Container::EventTag(c) if runtime_name == "event_identifier" => {
                c.event_identifier = Some(id)
            }
            Container::EventData(c) if runtime_name == "event_data_stream_identifier" => {
                c.event_data_stream_identifier = Some(id)
            }
            _ => (),
        }
    }

    /// The non-reference, non-identifier fields of the container, as a
    /// JSON object. This is the input to the serializer and to schema-path
    /// column encoding.
    pub fn fields_as_json(&self) -> Value {
        match self {
            Container::AnalysisWarning(c) => serde_json::to_value(c),
            Container::Event(c) => serde_json::to_value(c),
            Container::EventData(c) => serde_json::to_value(c),
            Container::EventDataStream(c) => serde_json::to_value(c),
            Container::EventSource(c) => serde_json::to_value(c),
            Container::EventTag(c) => serde_json::to_value(c),
            Container::ExtractionWarning(c) => serde_json::to_value(c),
            Container::PreprocessingWarning(c) => serde_json::to_value(c),
            Container::RecoveryWarning(c) => serde_json::to_value(c),
            Container::WindowsEventlogProvider(c) => serde_json::to_value(c),
            Container::SessionStart(c) => serde_json::to_value(c),
            Container::SessionCompletion(c) => serde_json::to_value(c),
            Container::SessionConfiguration(c) => serde_json::to_value(c),
            Container::SystemConfiguration(c) => serde_json::to_value(c),
            Container::TaskStart(c) => serde_json::to_value(c),
            Container::TaskCompletion(c) => serde_json::to_value(c),
        }
        .expect("container field structs always serialize")
    }

    /// Rebuilds a container of `container_type` from its non-reference
    /// fields. Reference fields are left unset; callers apply
    /// [`Container::set_reference`] afterwards.
    pub fn from_fields_json(
        container_type: ContainerType,
        value: Value,
    ) -> Result<Container, ContainerError> {
        let map_err = |e: serde_json::Error| ContainerError::SerializationError(e.to_string());
        use ContainerType::*;
        Ok(match container_type {
            AnalysisWarning => Container::AnalysisWarning(serde_json::from_value(value).map_err(map_err)?),
            Event => Container::Event(serde_json::from_value(value).map_err(map_err)?),
            EventData => Container::EventData(serde_json::from_value(value).map_err(map_err)?),
            EventDataStream => {
                Container::EventDataStream(serde_json::from_value(value).map_err(map_err)?)
            }
            EventSource => Container::EventSource(serde_json::from_value(value).map_err(map_err)?),
            EventTag => Container::EventTag(serde_json::from_value(value).map_err(map_err)?),
            ExtractionWarning => {
                Container::ExtractionWarning(serde_json::from_value(value).map_err(map_err)?)
            }
            PreprocessingWarning => {
                Container::PreprocessingWarning(serde_json::from_value(value).map_err(map_err)?)
            }
            RecoveryWarning => Container::RecoveryWarning(serde_json::from_value(value).map_err(map_err)?),
            WindowsEventlogProvider => {
                Container::WindowsEventlogProvider(serde_json::from_value(value).map_err(map_err)?)
            }
            SessionStart => Container::SessionStart(serde_json::from_value(value).map_err(map_err)?),
            SessionCompletion => {
                Container::SessionCompletion(serde_json::from_value(value).map_err(map_err)?)
            }
            SessionConfiguration => {
                Container::SessionConfiguration(serde_json::from_value(value).map_err(map_err)?)
            }
            SystemConfiguration => {
                Container::SystemConfiguration(serde_json::from_value(value).map_err(map_err)?)
            }
            TaskStart => Container::TaskStart(serde_json::from_value(value).map_err(map_err)?),
            TaskCompletion => Container::TaskCompletion(serde_json::from_value(value).map_err(map_err)?),
        })
    }
}

/// Builds the typed-column row for a schema-path container type.
///
/// `resolve_ref` converts a runtime reference field's [`Identifier`] into
/// the bare sequence number stored on disk; it is given the referenced
/// container type and the runtime field name so a backend can check the
/// identifier is of its own kind. Declared reference fields are mandatory
/// for schema-path types (missing ones are a write-time error), matching
/// the original engine's `event`/`event_tag` behaviour.
pub fn encode_schema_row<E: From<ContainerError>>(
    container: &Container,
    mut resolve_ref: impl FnMut(ContainerType, &'static str, Identifier) -> Result<u64, E>,
) -> Result<Vec<(&'static str, FieldValue)>, E> {
    let container_type = container.container_type();
    let value = container.fields_as_json();
    let refs = schema::references(container_type);
    let mut row = Vec::new();

    for field in schema::fields(container_type) {
        if field.semantic_type == SemanticType::Identifier {
            let rf = refs
                .iter()
                .find(|r| r.serialized_name == field.name)
                .expect("schema declares an Identifier field without a reference mapping");
            let id = container.get_reference(rf.runtime_name).ok_or_else(|| {
                ContainerError::UnsupportedIdentifier {
                    container_type,
                    field: rf.runtime_name,
                }
            })?;
            let seq = resolve_ref(rf.referenced_type, rf.runtime_name, id)?;
            row.push((field.name, FieldValue::RowRef(seq)));
            continue;
        }

        if let Some(v) = value.get(field.name) {
            if let Some(fv) = FieldValue::from_json(v, field.semantic_type) {
                row.push((field.name, fv));
            }
        }
    }

    Ok(row)
}

/// Reconstructs a schema-path container from its typed-column row.
///
/// Missing columns (older on-disk format) are left absent rather than
/// erroring, per the additive-evolution tolerance.
pub fn decode_schema_row(
    container_type: ContainerType,
    row: &[(&str, FieldValue)],
    make_identifier: impl Fn(ContainerType, u64) -> Identifier,
) -> Result<Container, ContainerError> {
    let refs = schema::references(container_type);
    let mut fields = Map::new();
    let mut pending_refs = Vec::new();

    for (name, value) in row {
        if let Some(rf) = refs.iter().find(|r| r.serialized_name == *name) {
            if let FieldValue::RowRef(seq) = value {
                pending_refs.push((rf.runtime_name, make_identifier(rf.referenced_type, *seq)));
            }
            continue;
        }
        fields.insert((*name).to_string(), value.to_json());
    }

    let mut container = Container::from_fields_json(container_type, Value::Object(fields))?;
    for (runtime_name, identifier) in pending_refs {
        container.set_reference(runtime_name, identifier);
    }
    Ok(container)
}

/// Builds the merged JSON value serialized into the legacy `_data` blob.
/// Reference fields are embedded optionally: a container without one
/// simply omits that key, mirroring the original engine's `event_data` →
/// `event_data_stream` special case, which is the only legacy-path type
/// with a declared reference.
pub fn encode_legacy_value<E: From<ContainerError>>(
    container: &Container,
    mut resolve_ref: impl FnMut(ContainerType, &'static str, Identifier) -> Result<u64, E>,
) -> Result<Value, E> {
    let container_type = container.container_type();
    let mut value = container.fields_as_json();
    let refs = schema::references(container_type);

    if let Value::Object(map) = &mut value {
        for rf in refs {
            if let Some(id) = container.get_reference(rf.runtime_name) {
                let seq = resolve_ref(rf.referenced_type, rf.runtime_name, id)?;
                map.insert(rf.serialized_name.to_string(), json!(seq));
            }
        }
    }

    Ok(value)
}

/// Reverses [`encode_legacy_value`].
pub fn decode_legacy_value(
    container_type: ContainerType,
    mut value: Value,
    make_identifier: impl Fn(ContainerType, u64) -> Identifier,
) -> Result<Container, ContainerError> {
    let refs = schema::references(container_type);
    let mut pending_refs = Vec::new();

    if let Value::Object(map) = &mut value {
        for rf in refs {
            if let Some(raw) = map.remove(rf.serialized_name) {
                if let Some(seq) = raw.as_u64() {
                    pending_refs.push((rf.runtime_name, make_identifier(rf.referenced_type, seq)));
                }
            }
        }
    }

    let mut container = Container::from_fields_json(container_type, value)?;
    for (runtime_name, identifier) in pending_refs {
        container.set_reference(runtime_name, identifier);
    }
    Ok(container)
}

//─────────────────────────────
//  Per-type field structs
//─────────────────────────────

/// `analysis_warning`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisWarning {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub message: String,
    pub plugin_name: String,
}

/// `event`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(skip)]
    pub event_data_identifier: Option<Identifier>,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    pub timestamp_desc: String,
}

/// `event_data`. Parser-specific attributes beyond the handful declared
/// here are carried in `attributes` (the `opaque` semantic type).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(skip)]
    pub event_data_stream_identifier: Option<Identifier>,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

/// `event_data_stream`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventDataStream {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_entropy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    pub path_spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yara_match: Option<String>,
}

/// `event_source`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventSource {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_entry_type: Option<String>,
    pub path_spec: String,
}

/// `event_tag`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventTag {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(skip)]
    pub event_identifier: Option<Identifier>,
    pub labels: Vec<String>,
}

/// `extraction_warning`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionWarning {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub message: String,
    pub parser_chain: String,
    pub path_spec: String,
}

/// `preprocessing_warning`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreprocessingWarning {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub message: String,
    pub path_spec: String,
    pub plugin_name: String,
}

/// `recovery_warning`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecoveryWarning {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub message: String,
    pub parser_chain: String,
    pub path_spec: String,
}

/// `windows_eventlog_provider`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowsEventlogProvider {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(default)]
    pub category_message_files: Vec<String>,
    #[serde(default)]
    pub event_message_files: Vec<String>,
    pub log_source: String,
    pub log_type: String,
    #[serde(default)]
    pub parameter_message_files: Vec<String>,
}

/// `session_start` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionStart {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub session_identifier: String,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// `session_completion` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionCompletion {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub session_identifier: String,
    pub end_time: i64,
}

/// `session_configuration` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionConfiguration {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub session_identifier: String,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub artifact_filters: Vec<String>,
}

/// `system_configuration` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemConfiguration {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// `task_start` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskStart {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub task_identifier: String,
    pub start_time: i64,
}

/// `task_completion` (legacy/opaque path).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskCompletion {
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub task_identifier: String,
    pub end_time: i64,
}
