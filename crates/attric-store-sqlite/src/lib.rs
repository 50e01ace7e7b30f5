#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **attric-store-sqlite** – durable, relational backend for the
//! attribute-container storage engine.
//!
//! Container rows are stored two ways depending on
//! [`attric_types::schema::storage_shape`]: schema-path types get one typed
//! column per declared field, legacy-path types get a single compressed
//! `_data` blob column. A `metadata` table carries the on-disk format
//! version and compression/serialization choice; [`SqliteStore::open`]
//! validates and, where compatible, upgrades it. A bounded LRU cache sits in
//! front of [`SqliteStore::get_by_index`]/[`SqliteStore::get_by_identifier`].

use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use lru::LruCache;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use attric_store_core::{BaseStore, StoreError, TimeRange};
use attric_types::container::{decode_legacy_value, decode_schema_row, encode_legacy_value, encode_schema_row};
use attric_types::container_type::{StorageType, ALL_CONTAINER_TYPES};
use attric_types::format::{
    APPEND_COMPATIBLE_FORMAT_VERSION, CURRENT_FORMAT_VERSION, READ_COMPATIBLE_FORMAT_VERSION,
    UPGRADE_COMPATIBLE_FORMAT_VERSION,
};
use attric_types::schema::{self, SemanticType, StorageShape};
use attric_types::{compressor, CompressionFormat, Container, ContainerType, FieldValue, Identifier, SerializationFormat};

/// Number of decoded containers the LRU cache holds across all types.
pub const MAX_CACHED_CONTAINERS: usize = 32 * 1024;

type SqlxQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

struct Metadata {
    format_version: u32,
    compression_format: CompressionFormat,
    #[allow(dead_code)]
    serialization_format: SerializationFormat,
    storage_type: StorageType,
}

/// A durable, SQLite-backed attribute-container store.
pub struct SqliteStore {
    pool: SqlitePool,
    is_open: bool,
    read_only: bool,
    storage_type: StorageType,
    compression_format: CompressionFormat,
    cache: Mutex<LruCache<(ContainerType, u64), Container>>,
}

impl SqliteStore {
    /// Opens (creating if absent and writable) the store at `path`.
    /// Fails [`StoreError::NotFound`] if the file does not exist and
    /// `read_only` is set.
    pub async fn open(
        path: impl AsRef<Path>,
        read_only: bool,
        storage_type: StorageType,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if read_only && !path.exists() {
            return Err(StoreError::NotFound);
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(!read_only)
            .read_only(read_only);
        let pool = SqlitePoolOptions::new()
            .max_connections(if read_only { 4 } else { 1 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        Self::from_pool(pool, read_only, storage_type).await
    }

    /// Opens a transient, writable in-memory store.
    pub async fn in_memory(storage_type: StorageType) -> Result<Self, StoreError> {
        Self::in_memory_with_cache_capacity(storage_type, MAX_CACHED_CONTAINERS).await
    }

    /// Like [`SqliteStore::in_memory`], with an explicit LRU cache capacity.
    /// Exists for tests that need to observe eviction without allocating
    /// tens of thousands of rows.
    pub async fn in_memory_with_cache_capacity(
        storage_type: StorageType,
        cache_capacity: usize,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        Self::from_pool_with_cache_capacity(pool, false, storage_type, cache_capacity).await
    }

    async fn from_pool(
        pool: SqlitePool,
        read_only: bool,
        storage_type: StorageType,
    ) -> Result<Self, StoreError> {
        Self::from_pool_with_cache_capacity(pool, read_only, storage_type, MAX_CACHED_CONTAINERS).await
    }

    async fn from_pool_with_cache_capacity(
        pool: SqlitePool,
        read_only: bool,
        storage_type: StorageType,
        cache_capacity: usize,
    ) -> Result<Self, StoreError> {
        let metadata = Self::initialize(&pool, read_only, storage_type).await?;
        if storage_type == StorageType::Session {
            let starts = Self::row_count(&pool, ContainerType::SessionStart).await?;
            let completions = Self::row_count(&pool, ContainerType::SessionCompletion).await?;
            if starts != completions {
                tracing::warn!(starts, completions, "unclosed processing session detected on open");
            }
        }
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Ok(Self {
            pool,
            is_open: true,
            read_only,
            storage_type,
            compression_format: metadata.compression_format,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    async fn initialize(
        pool: &SqlitePool,
        read_only: bool,
        storage_type: StorageType,
    ) -> Result<Metadata, StoreError> {
        match Self::read_metadata(pool).await? {
            None => {
                if read_only {
                    return Err(StoreError::InvalidFormat("store has no metadata table".to_string()));
                }
                let metadata = Metadata {
                    format_version: CURRENT_FORMAT_VERSION,
                    compression_format: CompressionFormat::Zlib,
                    serialization_format: SerializationFormat::Json,
                    storage_type,
                };
                tracing::debug!(format_version = metadata.format_version, "bootstrapping new store");
                Self::write_metadata(pool, &metadata).await?;
                Self::create_tables(pool, storage_type).await?;
                Ok(metadata)
            }
            Some(mut metadata) => {
                if metadata.storage_type != storage_type {
                    return Err(StoreError::UnsupportedFormat(format!(
                        "store was created as {}, opened as {storage_type}",
                        metadata.storage_type
                    )));
                }
                if !(READ_COMPATIBLE_FORMAT_VERSION..=CURRENT_FORMAT_VERSION).contains(&metadata.format_version) {
                    return Err(StoreError::UnsupportedFormat(format!(
                        "format_version {} is outside the readable window [{READ_COMPATIBLE_FORMAT_VERSION}, {CURRENT_FORMAT_VERSION}]",
                        metadata.format_version
                    )));
                }
                if !read_only {
                    if metadata.format_version < APPEND_COMPATIBLE_FORMAT_VERSION {
                        return Err(StoreError::UnsupportedFormat(format!(
                            "format_version {} cannot be appended to",
                            metadata.format_version
                        )));
                    }
                    if metadata.format_version >= UPGRADE_COMPATIBLE_FORMAT_VERSION
                        && metadata.format_version < CURRENT_FORMAT_VERSION
                    {
                        tracing::debug!(
                            from = metadata.format_version,
                            to = CURRENT_FORMAT_VERSION,
                            "upgrading store format_version"
                        );
                        metadata.format_version = CURRENT_FORMAT_VERSION;
                        Self::write_metadata(pool, &metadata).await?;
                    }
                    Self::create_tables(pool, storage_type).await?;
                }
                Ok(metadata)
            }
        }
    }

    async fn read_metadata(pool: &SqlitePool) -> Result<Option<Metadata>, StoreError> {
        let table_exists: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
        )
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::BackendError(e.to_string()))?;
        if table_exists == 0 {
            return Ok(None);
        }

        let rows = sqlx::query("SELECT key, value FROM metadata")
            .fetch_all(pool)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        let mut format_version = None;
        let mut compression_format = None;
        let mut serialization_format = None;
        let mut storage_type = None;
        for row in rows {
            let key: String = row.try_get("key").map_err(|e| StoreError::BackendError(e.to_string()))?;
            let value: String = row.try_get("value").map_err(|e| StoreError::BackendError(e.to_string()))?;
            match key.as_str() {
                "format_version" => {
                    format_version = Some(value.parse::<u32>().map_err(|_| {
                        StoreError::InvalidFormat("format_version is not an integer".to_string())
                    })?);
                }
                "compression_format" => {
                    compression_format = Some(CompressionFormat::from_str(&value).map_err(|_| {
                        StoreError::UnsupportedFormat(format!("unknown compression_format: {value}"))
                    })?);
                }
                "serialization_format" => {
                    serialization_format = Some(SerializationFormat::from_str(&value).map_err(|_| {
                        StoreError::UnsupportedFormat(format!("unknown serialization_format: {value}"))
                    })?);
                }
                "storage_type" => {
                    storage_type = Some(StorageType::from_str(&value).map_err(|_| {
                        StoreError::InvalidFormat(format!("unknown storage_type: {value}"))
                    })?);
                }
                _ => {}
            }
        }
        Ok(Some(Metadata {
            format_version: format_version
                .ok_or_else(|| StoreError::InvalidFormat("metadata missing format_version".to_string()))?,
            compression_format: compression_format
                .ok_or_else(|| StoreError::InvalidFormat("metadata missing compression_format".to_string()))?,
            serialization_format: serialization_format
                .ok_or_else(|| StoreError::InvalidFormat("metadata missing serialization_format".to_string()))?,
            storage_type: storage_type
                .ok_or_else(|| StoreError::InvalidFormat("metadata missing storage_type".to_string()))?,
        }))
    }

    async fn write_metadata(pool: &SqlitePool, metadata: &Metadata) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL) STRICT",
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::BackendError(e.to_string()))?;
        let entries = [
            ("format_version", metadata.format_version.to_string()),
            ("compression_format", metadata.compression_format.to_string()),
            ("serialization_format", metadata.serialization_format.to_string()),
            ("storage_type", metadata.storage_type.to_string()),
        ];
        for (key, value) in entries {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(pool)
                .await
                .map_err(|e| StoreError::BackendError(e.to_string()))?;
        }
        Ok(())
    }

    async fn create_tables(pool: &SqlitePool, storage_type: StorageType) -> Result<(), StoreError> {
        for container_type in ALL_CONTAINER_TYPES.iter().copied().filter(|t| storage_type.allows(*t)) {
            sqlx::query(&Self::table_ddl(container_type))
                .execute(pool)
                .await
                .map_err(|e| StoreError::BackendError(e.to_string()))?;
            Self::migrate_columns(pool, container_type).await?;
        }
        Ok(())
    }

    /// Adds any schema-path column declared in the registry but absent from
    /// the physical table, so a store created under an earlier
    /// `since_format_version` can be written to under the current schema.
    async fn migrate_columns(pool: &SqlitePool, container_type: ContainerType) -> Result<(), StoreError> {
        if schema::storage_shape(container_type) != StorageShape::Schema {
            return Ok(());
        }
        let table = container_type.as_str();
        let existing = Self::existing_columns(pool, table).await?;
        for field in schema::fields(container_type) {
            if !existing.iter().any(|c| c == field.name) {
                let column_type = schema::column_type(field.semantic_type).as_sql();
                let sql = format!("ALTER TABLE \"{table}\" ADD COLUMN \"{}\" {column_type}", field.name);
                sqlx::query(&sql).execute(pool).await.map_err(|e| StoreError::BackendError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{table}\")"))
            .fetch_all(pool)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(|e| StoreError::BackendError(e.to_string())))
            .collect()
    }

    fn table_ddl(container_type: ContainerType) -> String {
        let table = container_type.as_str();
        match schema::storage_shape(container_type) {
            StorageShape::Schema => {
                let mut columns = String::new();
                for field in schema::fields(container_type) {
                    let column_type = schema::column_type(field.semantic_type).as_sql();
                    columns.push_str(&format!(", \"{}\" {column_type}", field.name));
                }
                format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (_identifier INTEGER PRIMARY KEY AUTOINCREMENT{columns})"
                )
            }
            StorageShape::Legacy => {
                format!("CREATE TABLE IF NOT EXISTS \"{table}\" (_identifier INTEGER PRIMARY KEY AUTOINCREMENT, _data BLOB)")
            }
        }
    }

    async fn row_count(pool: &SqlitePool, container_type: ContainerType) -> Result<u64, StoreError> {
        let table = container_type.as_str();
        let max_identifier: Option<i64> =
            sqlx::query_scalar(&format!("SELECT MAX(_identifier) FROM \"{table}\""))
                .fetch_one(pool)
                .await
                .map_err(|e| StoreError::BackendError(e.to_string()))?;
        Ok(max_identifier.unwrap_or(0) as u64)
    }

    fn check_readable(&self) -> Result<(), StoreError> {
        if self.is_open {
            Ok(())
        } else {
            Err(StoreError::NotReadable)
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if !self.is_open || self.read_only {
            Err(StoreError::NotWritable)
        } else {
            Ok(())
        }
    }

    fn cache_get(&self, container_type: ContainerType, index: u64) -> Option<Container> {
        self.cache.lock().unwrap().get(&(container_type, index)).cloned()
    }

    fn cache_insert(&self, container_type: ContainerType, index: u64, container: Container) {
        self.cache.lock().unwrap().put((container_type, index), container);
    }

    fn bind_value(query: SqlxQuery<'_>, value: FieldValue) -> SqlxQuery<'_> {
        match value {
            FieldValue::Bool(b) => query.bind(if b { 1i64 } else { 0i64 }),
            FieldValue::Int(i) => query.bind(i),
            FieldValue::Timestamp(t) => query.bind(t),
            FieldValue::Str(s) => query.bind(s),
            FieldValue::ListStr(items) => query.bind(serde_json::to_string(&items).unwrap_or_default()),
            FieldValue::RowRef(n) => query.bind(n as i64),
            FieldValue::Opaque(v) => query.bind(v.to_string()),
        }
    }

    fn field_from_row(row: &SqliteRow, name: &str, semantic_type: SemanticType) -> Option<FieldValue> {
        match semantic_type {
            SemanticType::Bool => row.try_get::<Option<i64>, _>(name).ok().flatten().map(|v| FieldValue::Bool(v != 0)),
            SemanticType::Int => row.try_get::<Option<i64>, _>(name).ok().flatten().map(FieldValue::Int),
            SemanticType::Identifier => row.try_get::<Option<i64>, _>(name).ok().flatten().map(|v| FieldValue::RowRef(v as u64)),
            SemanticType::Timestamp => row.try_get::<Option<i64>, _>(name).ok().flatten().map(FieldValue::Timestamp),
            SemanticType::Str => row.try_get::<Option<String>, _>(name).ok().flatten().map(FieldValue::Str),
            SemanticType::ListStr => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
                .map(FieldValue::ListStr),
            SemanticType::Opaque => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .and_then(|s| serde_json::from_str(&s).ok())
                .map(FieldValue::Opaque),
        }
    }

    fn make_identifier(container_type: ContainerType, sequence_number: u64) -> Identifier {
        Identifier::Row { container_type, sequence_number }
    }

    fn resolve_reference(
        referencing_type: ContainerType,
    ) -> impl FnMut(ContainerType, &'static str, Identifier) -> Result<u64, StoreError> {
        move |referenced_type, field, id| {
            if id.is_row_of(referenced_type) {
                Ok(id.sequence_number())
            } else {
                Err(StoreError::UnsupportedIdentifier { container_type: referencing_type, field })
            }
        }
    }

    fn schema_columns(container: &Container) -> Result<Vec<(&'static str, FieldValue)>, StoreError> {
        encode_schema_row::<StoreError>(container, Self::resolve_reference(container.container_type()))
    }

    fn legacy_bytes(&self, container: &Container) -> Result<Vec<u8>, StoreError> {
        let value = encode_legacy_value::<StoreError>(container, Self::resolve_reference(container.container_type()))?;
        let is_empty = value.as_object().map_or(true, |m| m.is_empty());
        if is_empty {
            return Err(StoreError::SerializationError(
                "container has no encodable content".to_string(),
            ));
        }
        let json = serde_json::to_vec(&value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(compressor::compress(self.compression_format, &json)?)
    }

    async fn insert_row(&self, container: &Container) -> Result<u64, StoreError> {
        let container_type = container.container_type();
        let table = container_type.as_str();
        match schema::storage_shape(container_type) {
            StorageShape::Schema => {
                let fields = Self::schema_columns(container)?;
                let column_list =
                    fields.iter().map(|(n, _)| format!("\"{n}\"")).collect::<Vec<_>>().join(", ");
                let placeholders = vec!["?"; fields.len()].join(", ");
                let sql = format!("INSERT INTO \"{table}\" ({column_list}) VALUES ({placeholders})");
                let mut query = sqlx::query(&sql);
                for (_, value) in fields {
                    query = Self::bind_value(query, value);
                }
                let result = query.execute(&self.pool).await.map_err(|e| StoreError::BackendError(e.to_string()))?;
                Ok(result.last_insert_rowid() as u64)
            }
            StorageShape::Legacy => {
                let bytes = self.legacy_bytes(container)?;
                let sql = format!("INSERT INTO \"{table}\" (_data) VALUES (?)");
                let result = sqlx::query(&sql)
                    .bind(bytes)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
                Ok(result.last_insert_rowid() as u64)
            }
        }
    }

    async fn update_row(&self, container: &Container, row_id: u64) -> Result<(), StoreError> {
        let container_type = container.container_type();
        let table = container_type.as_str();
        match schema::storage_shape(container_type) {
            StorageShape::Schema => {
                let fields = Self::schema_columns(container)?;
                let assignments =
                    fields.iter().map(|(n, _)| format!("\"{n}\" = ?")).collect::<Vec<_>>().join(", ");
                let sql = format!("UPDATE \"{table}\" SET {assignments} WHERE _identifier = ?");
                let mut query = sqlx::query(&sql);
                for (_, value) in fields {
                    query = Self::bind_value(query, value);
                }
                query = query.bind(row_id as i64);
                query.execute(&self.pool).await.map_err(|e| StoreError::BackendError(e.to_string()))?;
            }
            StorageShape::Legacy => {
                let bytes = self.legacy_bytes(container)?;
                let sql = format!("UPDATE \"{table}\" SET _data = ? WHERE _identifier = ?");
                sqlx::query(&sql)
                    .bind(bytes)
                    .bind(row_id as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn fetch_row(&self, container_type: ContainerType, row_id: u64) -> Result<Option<Container>, StoreError> {
        let table = container_type.as_str();
        match schema::storage_shape(container_type) {
            StorageShape::Schema => {
                let fields = schema::fields(container_type);
                let sql = format!("SELECT * FROM \"{table}\" WHERE _identifier = ?");
                let row = sqlx::query(&sql)
                    .bind(row_id as i64)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
                let Some(row) = row else { return Ok(None) };
                let values: Vec<(&str, FieldValue)> = fields
                    .iter()
                    .filter_map(|f| Self::field_from_row(&row, f.name, f.semantic_type).map(|v| (f.name, v)))
                    .collect();
                let container = decode_schema_row(container_type, &values, Self::make_identifier)?;
                Ok(Some(container))
            }
            StorageShape::Legacy => {
                let sql = format!("SELECT _data FROM \"{table}\" WHERE _identifier = ?");
                let row = sqlx::query(&sql)
                    .bind(row_id as i64)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
                let Some(row) = row else { return Ok(None) };
                let container = self.decode_legacy_row(container_type, &row)?;
                Ok(Some(container))
            }
        }
    }

    fn decode_legacy_row(&self, container_type: ContainerType, row: &SqliteRow) -> Result<Container, StoreError> {
        let bytes: Vec<u8> = row.try_get("_data").map_err(|e| StoreError::BackendError(e.to_string()))?;
        let decompressed = compressor::decompress(self.compression_format, &bytes)?;
        let value = serde_json::from_slice(&decompressed).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(decode_legacy_value(container_type, value, Self::make_identifier)?)
    }

    async fn fetch_all_in_insertion_order(&self, container_type: ContainerType) -> Result<Vec<Container>, StoreError> {
        let table = container_type.as_str();
        match schema::storage_shape(container_type) {
            StorageShape::Schema => {
                let fields = schema::fields(container_type);
                let sql = format!("SELECT * FROM \"{table}\" ORDER BY _identifier");
                let rows = sqlx::query(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
                rows.iter()
                    .map(|row| {
                        let values: Vec<(&str, FieldValue)> = fields
                            .iter()
                            .filter_map(|f| Self::field_from_row(row, f.name, f.semantic_type).map(|v| (f.name, v)))
                            .collect();
                        Ok(decode_schema_row(container_type, &values, Self::make_identifier)?)
                    })
                    .collect()
            }
            StorageShape::Legacy => {
                let sql = format!("SELECT _data FROM \"{table}\" ORDER BY _identifier");
                let rows = sqlx::query(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::BackendError(e.to_string()))?;
                rows.iter().map(|row| self.decode_legacy_row(container_type, row)).collect()
            }
        }
    }

    async fn fetch_events_sorted(&self, time_range: Option<TimeRange>) -> Result<Vec<Container>, StoreError> {
        let fields = schema::fields(ContainerType::Event);
        let mut sql = "SELECT * FROM \"event\"".to_string();
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        if let Some(range) = time_range {
            if let Some(start) = range.start {
                conditions.push("timestamp >= ?");
                binds.push(start);
            }
            if let Some(end) = range.end {
                conditions.push("timestamp <= ?");
                binds.push(end);
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp, _identifier");

        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(|e| StoreError::BackendError(e.to_string()))?;
        rows.iter()
            .map(|row| {
                let values: Vec<(&str, FieldValue)> = fields
                    .iter()
                    .filter_map(|f| Self::field_from_row(row, f.name, f.semantic_type).map(|v| (f.name, v)))
                    .collect();
                Ok(decode_schema_row(ContainerType::Event, &values, Self::make_identifier)?)
            })
            .collect()
    }
}

#[async_trait]
impl BaseStore for SqliteStore {
    async fn close(&mut self) -> Result<(), StoreError> {
        if !self.is_open {
            return Err(StoreError::AlreadyClosed);
        }
        self.pool.close().await;
        self.is_open = false;
        Ok(())
    }

    async fn add(&mut self, mut container: Container) -> Result<Identifier, StoreError> {
        self.check_writable()?;
        let container_type = container.container_type();
        if !self.storage_type.allows(container_type) {
            return Err(StoreError::UnsupportedContainerType(container_type.to_string()));
        }
        let row_id = self.insert_row(&container).await?;
        let identifier = Identifier::Row { container_type, sequence_number: row_id };
        container.set_identifier(identifier);
        self.cache_insert(container_type, row_id - 1, container);
        Ok(identifier)
    }

    async fn update(&mut self, mut container: Container) -> Result<(), StoreError> {
        self.check_writable()?;
        let container_type = container.container_type();
        let identifier = container.identifier().ok_or(StoreError::MissingContainer)?;
        if !identifier.is_row_of(container_type) {
            return Err(StoreError::UnsupportedIdentifier { container_type, field: "identifier" });
        }
        let row_id = identifier.sequence_number();
        let table = container_type.as_str();
        let exists: Option<i64> = sqlx::query_scalar(&format!("SELECT 1 FROM \"{table}\" WHERE _identifier = ?"))
            .bind(row_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        if exists.is_none() {
            return Err(StoreError::MissingContainer);
        }
        self.update_row(&container, row_id).await?;
        container.set_identifier(identifier);
        self.cache_insert(container_type, row_id - 1, container);
        Ok(())
    }

    async fn get_by_identifier(
        &self,
        container_type: ContainerType,
        identifier: Identifier,
    ) -> Result<Option<Container>, StoreError> {
        self.check_readable()?;
        if !identifier.is_row_of(container_type) {
            return Err(StoreError::UnsupportedIdentifier { container_type, field: "identifier" });
        }
        let sequence_number = identifier.sequence_number();
        if sequence_number == 0 {
            return Ok(None);
        }
        self.get_by_index(container_type, sequence_number - 1).await
    }

    async fn get_by_index(
        &self,
        container_type: ContainerType,
        index: u64,
    ) -> Result<Option<Container>, StoreError> {
        self.check_readable()?;
        if let Some(container) = self.cache_get(container_type, index) {
            return Ok(Some(container));
        }
        let container = self.fetch_row(container_type, index + 1).await?;
        if let Some(container) = &container {
            self.cache_insert(container_type, index, container.clone());
        }
        Ok(container)
    }

    async fn iterate(
        &self,
        container_type: ContainerType,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError> {
        self.check_readable()?;
        let containers = self.fetch_all_in_insertion_order(container_type).await?;
        Ok(Box::pin(stream::iter(containers.into_iter().map(Ok))))
    }

    async fn count(&self, container_type: ContainerType) -> Result<u64, StoreError> {
        self.check_readable()?;
        Self::row_count(&self.pool, container_type).await
    }

    async fn event_tag_for(&self, event_identifier: Identifier) -> Result<Option<Container>, StoreError> {
        self.check_readable()?;
        if !event_identifier.is_row_of(ContainerType::Event) {
            return Err(StoreError::UnsupportedIdentifier {
                container_type: ContainerType::Event,
                field: "event_identifier",
            });
        }
        let rows = sqlx::query("SELECT * FROM \"event_tag\" WHERE \"_event_row_identifier\" = ?")
            .bind(event_identifier.sequence_number() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::BackendError(e.to_string()))?;
        if rows.len() != 1 {
            return Ok(None);
        }
        let fields = schema::fields(ContainerType::EventTag);
        let values: Vec<(&str, FieldValue)> = fields
            .iter()
            .filter_map(|f| Self::field_from_row(&rows[0], f.name, f.semantic_type).map(|v| (f.name, v)))
            .collect();
        Ok(Some(decode_schema_row(ContainerType::EventTag, &values, Self::make_identifier)?))
    }

    async fn sorted_events(
        &self,
        time_range: Option<TimeRange>,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError> {
        self.check_readable()?;
        let containers = self.fetch_events_sorted(time_range).await?;
        Ok(Box::pin(stream::iter(containers.into_iter().map(Ok))))
    }

    async fn next_system_configuration_identifier(&self) -> Result<Identifier, StoreError> {
        self.check_readable()?;
        let count = Self::row_count(&self.pool, ContainerType::SessionConfiguration).await?;
        Ok(Identifier::Row { container_type: ContainerType::SessionConfiguration, sequence_number: count + 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attric_types::container::{Event, EventData, EventDataStream, EventSource, EventTag};
    use futures::StreamExt;

    async fn open_session(dir: &tempfile::TempDir, read_only: bool) -> SqliteStore {
        SqliteStore::open(dir.path().join("store.db"), read_only, StorageType::Session).await.unwrap()
    }

    #[tokio::test]
    async fn round_trip_session_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_session(&dir, false).await;
            let stream_id = store
                .add(Container::EventDataStream(EventDataStream {
                    identifier: None,
                    file_entropy: None,
                    md5_hash: Some("0".repeat(32)),
                    path_spec: "/a".to_string(),
                    sha1_hash: None,
                    sha256_hash: None,
                    yara_match: None,
                }))
                .await
                .unwrap();
            let data_id = store
                .add(Container::EventData(EventData {
                    identifier: None,
                    event_data_stream_identifier: Some(stream_id),
                    data_type: "os:file".to_string(),
                    attributes: Default::default(),
                }))
                .await
                .unwrap();
            store
                .add(Container::Event(Event {
                    identifier: None,
                    event_data_identifier: Some(data_id),
                    timestamp: 1_700_000_000_000_000,
                    timestamp_desc: "mtime".to_string(),
                }))
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = open_session(&dir, true).await;
        assert_eq!(store.count(ContainerType::Event).await.unwrap(), 1);
        let fetched = store.get_by_index(ContainerType::Event, 0).await.unwrap().unwrap();
        match fetched {
            Container::Event(event) => {
                assert_eq!(event.timestamp, 1_700_000_000_000_000);
                let data = store
                    .get_by_identifier(ContainerType::EventData, event.event_data_identifier.unwrap())
                    .await
                    .unwrap()
                    .unwrap();
                match data {
                    Container::EventData(d) => assert_eq!(d.data_type, "os:file"),
                    _ => panic!("wrong variant"),
                }
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn read_only_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        open_session(&dir, false).await.close().await.unwrap();

        let mut store = open_session(&dir, true).await;
        let result = store
            .add(Container::EventSource(EventSource {
                identifier: None,
                data_type: "os:file".to_string(),
                file_entry_type: None,
                path_spec: "/a".to_string(),
            }))
            .await;
        assert!(matches!(result, Err(StoreError::NotWritable)));
    }

    #[tokio::test]
    async fn read_only_open_never_modifies_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut store = SqliteStore::open(&path, false, StorageType::Session).await.unwrap();
            store
                .add(Container::EventSource(EventSource {
                    identifier: None,
                    data_type: "os:file".to_string(),
                    file_entry_type: None,
                    path_spec: "/a".to_string(),
                }))
                .await
                .unwrap();
            store.close().await.unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        let store = SqliteStore::open(&path, true, StorageType::Session).await.unwrap();
        let _ = store.count(ContainerType::EventSource).await.unwrap();
        drop(store);

        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn lru_cache_misses_still_return_correct_data() {
        let mut store = SqliteStore::in_memory_with_cache_capacity(StorageType::Session, 2).await.unwrap();
        for i in 0..10 {
            store
                .add(Container::EventSource(EventSource {
                    identifier: None,
                    data_type: format!("type-{i}"),
                    file_entry_type: None,
                    path_spec: format!("/p-{i}"),
                }))
                .await
                .unwrap();
        }
        for i in 0..10u64 {
            let fetched = store.get_by_index(ContainerType::EventSource, i).await.unwrap().unwrap();
            match fetched {
                Container::EventSource(s) => assert_eq!(s.data_type, format!("type-{i}")),
                _ => panic!("wrong variant"),
            }
        }
    }

    #[tokio::test]
    async fn index_and_identifier_sequence_numbers_agree() {
        let mut store = SqliteStore::in_memory(StorageType::Session).await.unwrap();
        for i in 0..5 {
            store
                .add(Container::EventSource(EventSource {
                    identifier: None,
                    data_type: format!("t{i}"),
                    file_entry_type: None,
                    path_spec: "/p".to_string(),
                }))
                .await
                .unwrap();
        }
        for i in 0..5u64 {
            let container = store.get_by_index(ContainerType::EventSource, i).await.unwrap().unwrap();
            assert_eq!(container.identifier().unwrap().sequence_number(), i + 1);
        }
    }

    #[tokio::test]
    async fn opening_a_store_with_an_unsupported_format_version_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
            let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
            sqlx::query("CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
                .execute(&pool)
                .await
                .unwrap();
            for (key, value) in [
                ("format_version", "20100101"),
                ("compression_format", "none"),
                ("serialization_format", "json"),
                ("storage_type", "session"),
            ] {
                sqlx::query("INSERT INTO metadata (key, value) VALUES (?, ?)")
                    .bind(key)
                    .bind(value)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
            pool.close().await;
        }

        let result = SqliteStore::open(&path, true, StorageType::Session).await;
        assert!(matches!(result, Err(StoreError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn sorted_events_break_ties_by_insertion_order_and_respect_a_time_range() {
        let mut store = SqliteStore::in_memory(StorageType::Session).await.unwrap();
        for ts in [10, 20, 30, 40, 50] {
            store
                .add(Container::Event(Event {
                    identifier: None,
                    event_data_identifier: None,
                    timestamp: ts,
                    timestamp_desc: "mtime".to_string(),
                }))
                .await
                .unwrap();
        }

        let items: Vec<_> = store
            .sorted_events(Some(TimeRange::new(Some(20), Some(40))))
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        let timestamps: Vec<_> = items
            .into_iter()
            .map(|c| match c {
                Container::Event(e) => e.timestamp,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(timestamps, vec![20, 30, 40]);
    }

    #[tokio::test]
    async fn a_second_tag_for_the_same_event_makes_the_lookup_absent() {
        let mut store = SqliteStore::in_memory(StorageType::Session).await.unwrap();
        let event_id = store
            .add(Container::Event(Event {
                identifier: None,
                event_data_identifier: None,
                timestamp: 1,
                timestamp_desc: "mtime".to_string(),
            }))
            .await
            .unwrap();

        store
            .add(Container::EventTag(EventTag {
                identifier: None,
                event_identifier: Some(event_id),
                labels: vec!["suspicious".to_string()],
            }))
            .await
            .unwrap();
        assert!(store.event_tag_for(event_id).await.unwrap().is_some());

        store
            .add(Container::EventTag(EventTag {
                identifier: None,
                event_identifier: Some(event_id),
                labels: vec!["reviewed".to_string()],
            }))
            .await
            .unwrap();
        assert_eq!(store.event_tag_for(event_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn opening_an_older_shape_table_for_write_adds_missing_columns_and_tolerates_absent_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old_shape.db");
        {
            let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
            let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
            sqlx::query("CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
                .execute(&pool)
                .await
                .unwrap();
            for (key, value) in [
                ("format_version", "20210621"),
                ("compression_format", "zlib"),
                ("serialization_format", "json"),
                ("storage_type", "session"),
            ] {
                sqlx::query("INSERT INTO metadata (key, value) VALUES (?, ?)")
                    .bind(key)
                    .bind(value)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
            // event_data_stream as it existed before yara_match was added.
            sqlx::query(
                "CREATE TABLE \"event_data_stream\" (_identifier INTEGER PRIMARY KEY AUTOINCREMENT, \
                 \"file_entropy\" TEXT, \"md5_hash\" TEXT, \"path_spec\" TEXT, \"sha1_hash\" TEXT, \"sha256_hash\" TEXT)",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query("INSERT INTO \"event_data_stream\" (path_spec) VALUES (?)")
                .bind("/old/path")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let mut store = SqliteStore::open(&path, false, StorageType::Session).await.unwrap();

        let old_row = store.get_by_index(ContainerType::EventDataStream, 0).await.unwrap().unwrap();
        match old_row {
            Container::EventDataStream(s) => {
                assert_eq!(s.path_spec, "/old/path");
                assert_eq!(s.yara_match, None);
            }
            _ => panic!("wrong variant"),
        }

        store
            .add(Container::EventDataStream(EventDataStream {
                identifier: None,
                file_entropy: None,
                md5_hash: None,
                path_spec: "/new/path".to_string(),
                sha1_hash: None,
                sha256_hash: None,
                yara_match: Some("rule_hit".to_string()),
            }))
            .await
            .unwrap();
        let new_row = store.get_by_index(ContainerType::EventDataStream, 1).await.unwrap().unwrap();
        match new_row {
            Container::EventDataStream(s) => assert_eq!(s.yara_match, Some("rule_hit".to_string())),
            _ => panic!("wrong variant"),
        }
    }
}
