#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **attric-store-core** – the base store contract shared by the in-memory
//! and durable backends.
//!
//! This crate defines `BaseStore` and its error kind without providing a
//! concrete implementation. Backend crates (`attric-store-memory`,
//! `attric-store-sqlite`) implement the trait; nothing here depends on
//! either.

use async_trait::async_trait;
use futures::stream::BoxStream;

use attric_types::{Container, ContainerType, Identifier};

/// Per-container-type monotonic sequence counters.
pub mod sequence;

/// Min-heap powering stable time-sorted event iteration.
pub mod event_heap;

/// An inclusive `[start, end]` timestamp filter for [`BaseStore::sorted_events`].
/// Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    /// Inclusive lower bound, in microseconds since the Unix epoch.
    pub start: Option<i64>,
    /// Inclusive upper bound, in microseconds since the Unix epoch.
    pub end: Option<i64>,
}

impl TimeRange {
    /// Builds a range from its optional bounds.
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Whether `timestamp` falls within both bounds.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

/// Errors raised by the base store contract. Backend-specific failures are
/// wrapped as [`StoreError::BackendError`]'s message text; nothing else
/// crosses the contract boundary unconverted.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `open` called on a store that is already open.
    #[error("store is already open")]
    AlreadyOpen,
    /// `close` called on a store that is already closed.
    #[error("store is already closed")]
    AlreadyClosed,
    /// An operation that requires an open store was called on a closed one.
    #[error("store is not open for reading")]
    NotReadable,
    /// A write was attempted on a closed or read-only store.
    #[error("store is not open for writing")]
    NotWritable,
    /// The durable store's file does not exist and the open was read-only.
    #[error("store file not found")]
    NotFound,
    /// The durable store's metadata table is missing or malformed.
    #[error("invalid on-disk format: {0}")]
    InvalidFormat(String),
    /// The on-disk format version, compression, serialization, or storage
    /// type is not supported for the requested open mode.
    #[error("unsupported on-disk format: {0}")]
    UnsupportedFormat(String),
    /// A reference field held an identifier of the wrong backend kind, or
    /// was missing where one was required.
    #[error("unsupported identifier for {container_type}.{field}")]
    UnsupportedIdentifier {
        /// Container type the field belongs to.
        container_type: ContainerType,
        /// Runtime field name.
        field: &'static str,
    },
    /// The container type is not declared in the schema registry.
    #[error("unsupported container type: {0}")]
    UnsupportedContainerType(String),
    /// `update` targeted a row that does not exist.
    #[error("container does not exist for update")]
    MissingContainer,
    /// Encoding or decoding a container failed.
    #[error("failed to serialize container: {0}")]
    SerializationError(String),
    /// The underlying storage backend returned an error; original message
    /// is preserved as text.
    #[error("backend error: {0}")]
    BackendError(String),
}

impl From<attric_types::ContainerError> for StoreError {
    fn from(error: attric_types::ContainerError) -> Self {
        match error {
            attric_types::ContainerError::UnsupportedContainerType(s) => {
                StoreError::UnsupportedContainerType(s)
            }
            attric_types::ContainerError::SerializationError(s) => StoreError::SerializationError(s),
            attric_types::ContainerError::UnsupportedIdentifier { container_type, field } => {
                StoreError::UnsupportedIdentifier { container_type, field }
            }
        }
    }
}

/// Shared contract implemented by the in-memory and durable backends.
///
/// `open` is deliberately not part of the trait: the in-memory backend
/// takes no arguments while the durable backend takes a path, read-only
/// flag and storage type, so each exposes its own inherent `open`/`new`
/// constructor instead.
#[async_trait]
pub trait BaseStore: Send + Sync {
    /// Commits pending writes (durable only) and transitions to closed.
    /// Fails [`StoreError::AlreadyClosed`] if already closed.
    async fn close(&mut self) -> Result<(), StoreError>;

    /// Assigns the container its next sequence number, rewrites its
    /// reference fields to serialized form, and persists it. Fails
    /// [`StoreError::NotWritable`] if the store is closed or read-only.
    async fn add(&mut self, container: Container) -> Result<Identifier, StoreError>;

    /// Updates an existing container in place. `container.identifier()`
    /// must be of the backend's own kind and refer to an existing row.
    /// Fails [`StoreError::MissingContainer`] if absent,
    /// [`StoreError::UnsupportedIdentifier`] if the identifier is the wrong kind.
    async fn update(&mut self, container: Container) -> Result<(), StoreError>;

    /// Looks a container up by its identifier. `None` if absent.
    async fn get_by_identifier(
        &self,
        container_type: ContainerType,
        identifier: Identifier,
    ) -> Result<Option<Container>, StoreError>;

    /// Looks a container up by its 0-based position in insertion order.
    /// `None` if `index` is out of range.
    async fn get_by_index(
        &self,
        container_type: ContainerType,
        index: u64,
    ) -> Result<Option<Container>, StoreError>;

    /// Streams every container of `container_type` in insertion order.
    /// Independent calls use independent cursors.
    async fn iterate(
        &self,
        container_type: ContainerType,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError>;

    /// Number of containers of `container_type` stored so far.
    async fn count(&self, container_type: ContainerType) -> Result<u64, StoreError>;

    /// Whether any container of `container_type` has been stored.
    async fn has(&self, container_type: ContainerType) -> Result<bool, StoreError> {
        Ok(self.count(container_type).await? > 0)
    }

    /// The tag for `event_identifier`, if exactly one exists.
    async fn event_tag_for(
        &self,
        event_identifier: Identifier,
    ) -> Result<Option<Container>, StoreError>;

    /// Streams events in `(timestamp, insertion_index)` order, optionally
    /// filtered to `time_range`.
    async fn sorted_events(
        &self,
        time_range: Option<TimeRange>,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError>;

    /// The identifier the next-written `session_configuration` container
    /// would receive. Does not consume the counter.
    async fn next_system_configuration_identifier(&self) -> Result<Identifier, StoreError>;
}

/// Re-exports the common set of types a caller of a concrete store needs.
pub mod prelude {
    pub use crate::event_heap::EventHeap;
    pub use crate::sequence::SequenceCounters;
    pub use crate::{BaseStore, StoreError, TimeRange};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_bounds_are_inclusive() {
        let range = TimeRange::new(Some(20), Some(40));
        assert!(!range.contains(19));
        assert!(range.contains(20));
        assert!(range.contains(30));
        assert!(range.contains(40));
        assert!(!range.contains(41));
    }

    #[test]
    fn time_range_with_open_bound_is_unbounded_on_that_side() {
        let only_start = TimeRange::new(Some(10), None);
        assert!(!only_start.contains(9));
        assert!(only_start.contains(1_000_000));

        let only_end = TimeRange::new(None, Some(10));
        assert!(only_end.contains(-1_000_000));
        assert!(!only_end.contains(11));
    }

    #[test]
    fn container_error_maps_onto_store_error() {
        let err = attric_types::ContainerError::UnsupportedIdentifier {
            container_type: ContainerType::Event,
            field: "event_data_identifier",
        };
        match StoreError::from(err) {
            StoreError::UnsupportedIdentifier { container_type, field } => {
                assert_eq!(container_type, ContainerType::Event);
                assert_eq!(field, "event_data_identifier");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
