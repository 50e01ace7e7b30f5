#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **attric-store-memory** – ordered-map-per-type in-memory backend.
//!
//! Fixtures and tests want a store with the full `BaseStore` contract but no
//! file, and no persistence guarantees beyond the lifetime of the process.
//! Deep-copy-on-write (via `Container`'s `Clone`) ensures a producer's
//! container can be mutated after `add` without corrupting what was stored,
//! and vice versa.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use indexmap::IndexMap;

use attric_store_core::event_heap::EventHeap;
use attric_store_core::sequence::SequenceCounters;
use attric_store_core::{BaseStore, StoreError, TimeRange};
use attric_types::container_type::StorageType;
use attric_types::{schema, Container, ContainerType, Identifier};

#[derive(Debug)]
enum TagSlot {
    Empty,
    One(Container),
    /// More than one tag has been written for this event; the one-row
    /// invariant is violated, so lookups report absence rather than an
    /// arbitrary winner.
    Ambiguous,
}

/// An in-memory, non-persistent attribute-container store.
///
/// Holds, per container type, an [`IndexMap`] from sequence number to a deep
/// copy of the container — `IndexMap` preserves insertion order, giving
/// `get_by_index` and `iterate` their positional/ordering guarantees for
/// free. A side map from event sequence number to event tag makes
/// `event_tag_for` O(1).
#[derive(Debug)]
pub struct MemoryStore {
    is_open: bool,
    storage_type: StorageType,
    containers: HashMap<ContainerType, IndexMap<u64, Container>>,
    event_tag_by_event: HashMap<u64, TagSlot>,
    sequence: SequenceCounters,
}

impl MemoryStore {
    /// Opens a new, empty store for the given storage type. In-memory
    /// stores have no read-only mode — once open, they accept both reads
    /// and writes until closed.
    pub fn open(storage_type: StorageType) -> Self {
        Self {
            is_open: true,
            storage_type,
            containers: HashMap::new(),
            event_tag_by_event: HashMap::new(),
            sequence: SequenceCounters::new(),
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        // Matches the original engine's `_RaiseIfNotReadable`/
        // `_RaiseIfNotWritable`: both check only whether the store is open,
        // never a separate read-only flag.
        if self.is_open {
            Ok(())
        } else {
            Err(StoreError::NotReadable)
        }
    }

    fn record_tag(&mut self, event_sequence: u64, tag: Container) {
        use TagSlot::*;
        let slot = self.event_tag_by_event.entry(event_sequence).or_insert(Empty);
        *slot = match slot {
            Empty => One(tag),
            One(_) | Ambiguous => Ambiguous,
        };
    }

    /// Like [`Self::record_tag`], but for amending a tag already on disk
    /// rather than adding a new one: if the slot for `event_sequence` holds
    /// exactly this tag (by identifier), the edit is applied in place and
    /// the slot stays `One` instead of flipping to `Ambiguous`.
    fn update_tag(&mut self, event_sequence: u64, tag_sequence: u64, tag: Container) {
        use TagSlot::*;
        match self.event_tag_by_event.get_mut(&event_sequence) {
            Some(One(existing))
                if existing.identifier().map(|id| id.sequence_number()) == Some(tag_sequence) =>
            {
                *existing = tag;
            }
            _ => self.record_tag(event_sequence, tag),
        }
    }
}

#[async_trait]
impl BaseStore for MemoryStore {
    async fn close(&mut self) -> Result<(), StoreError> {
        if !self.is_open {
            return Err(StoreError::AlreadyClosed);
        }
        self.is_open = false;
        Ok(())
    }

    async fn add(&mut self, mut container: Container) -> Result<Identifier, StoreError> {
        self.check_open()?;
        let container_type = container.container_type();
        if !self.storage_type.allows(container_type) {
            return Err(StoreError::UnsupportedContainerType(container_type.to_string()));
        }

        // §4.6: no schema enforcement beyond the identifier-kind check.
        for rf in schema::references(container_type) {
            if let Some(id) = container.get_reference(rf.runtime_name) {
                if !id.is_sequence() {
                    return Err(StoreError::UnsupportedIdentifier {
                        container_type,
                        field: rf.runtime_name,
                    });
                }
            }
        }

        let sequence_number = self.sequence.next(container_type);
        let identifier = Identifier::Sequence(sequence_number);
        container.set_identifier(identifier);

        if container_type == ContainerType::EventTag {
            if let Some(event_id) = container.get_reference("event_identifier") {
                self.record_tag(event_id.sequence_number(), container.clone());
            }
        }

        self.containers
            .entry(container_type)
            .or_default()
            .insert(sequence_number, container);
        Ok(identifier)
    }

    async fn update(&mut self, mut container: Container) -> Result<(), StoreError> {
        self.check_open()?;
        let container_type = container.container_type();
        let identifier = container.identifier().ok_or(StoreError::MissingContainer)?;
        if !identifier.is_sequence() {
            return Err(StoreError::UnsupportedIdentifier { container_type, field: "identifier" });
        }
        let sequence_number = identifier.sequence_number();
        let exists = self
            .containers
            .get(&container_type)
            .is_some_and(|m| m.contains_key(&sequence_number));
        if !exists {
            return Err(StoreError::MissingContainer);
        }

        for rf in schema::references(container_type) {
            if let Some(id) = container.get_reference(rf.runtime_name) {
                if !id.is_sequence() {
                    return Err(StoreError::UnsupportedIdentifier {
                        container_type,
                        field: rf.runtime_name,
                    });
                }
            }
        }

        container.set_identifier(identifier);
        if container_type == ContainerType::EventTag {
            if let Some(event_id) = container.get_reference("event_identifier") {
                self.update_tag(event_id.sequence_number(), sequence_number, container.clone());
            }
        }

        self.containers.get_mut(&container_type).unwrap().insert(sequence_number, container);
        Ok(())
    }

    async fn get_by_identifier(
        &self,
        container_type: ContainerType,
        identifier: Identifier,
    ) -> Result<Option<Container>, StoreError> {
        self.check_open()?;
        if !identifier.is_sequence() {
            return Err(StoreError::UnsupportedIdentifier { container_type, field: "identifier" });
        }
        Ok(self
            .containers
            .get(&container_type)
            .and_then(|m| m.get(&identifier.sequence_number()))
            .cloned())
    }

    async fn get_by_index(
        &self,
        container_type: ContainerType,
        index: u64,
    ) -> Result<Option<Container>, StoreError> {
        self.check_open()?;
        Ok(self
            .containers
            .get(&container_type)
            .and_then(|m| m.get_index(index as usize))
            .map(|(_, container)| container.clone()))
    }

    async fn iterate(
        &self,
        container_type: ContainerType,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError> {
        self.check_open()?;
        let items: Vec<Result<Container, StoreError>> = self
            .containers
            .get(&container_type)
            .map(|m| m.values().cloned().map(Ok).collect())
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn count(&self, container_type: ContainerType) -> Result<u64, StoreError> {
        self.check_open()?;
        Ok(self.containers.get(&container_type).map_or(0, |m| m.len() as u64))
    }

    async fn event_tag_for(
        &self,
        event_identifier: Identifier,
    ) -> Result<Option<Container>, StoreError> {
        self.check_open()?;
        if !event_identifier.is_sequence() {
            return Err(StoreError::UnsupportedIdentifier {
                container_type: ContainerType::Event,
                field: "event_identifier",
            });
        }
        Ok(match self.event_tag_by_event.get(&event_identifier.sequence_number()) {
            Some(TagSlot::One(tag)) => Some(tag.clone()),
            _ => None,
        })
    }

    async fn sorted_events(
        &self,
        time_range: Option<TimeRange>,
    ) -> Result<BoxStream<'_, Result<Container, StoreError>>, StoreError> {
        self.check_open()?;
        let mut heap = EventHeap::new();
        if let Some(events) = self.containers.get(&ContainerType::Event) {
            for (insertion_index, (_, container)) in events.iter().enumerate() {
                if let Container::Event(event) = container {
                    let in_range = time_range.map_or(true, |range| range.contains(event.timestamp));
                    if in_range {
                        heap.push(event.timestamp, insertion_index as u64, container.clone());
                    }
                }
            }
        }
        let items: Vec<Result<Container, StoreError>> = heap.map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn next_system_configuration_identifier(&self) -> Result<Identifier, StoreError> {
        self.check_open()?;
        // Bug-compatible with the original engine: does not consume the counter.
        Ok(Identifier::Sequence(self.sequence.peek(ContainerType::SessionConfiguration)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attric_types::container::{Event, EventData, EventSource, EventTag};
    use futures::StreamExt;

    fn event(timestamp: i64) -> Container {
        Container::Event(Event {
            identifier: None,
            event_data_identifier: None,
            timestamp,
            timestamp_desc: "mtime".to_string(),
        })
    }

    #[tokio::test]
    async fn identifier_round_trip_is_field_wise_equal() {
        let mut store = MemoryStore::open(StorageType::Session);
        let source = Container::EventSource(EventSource {
            identifier: None,
            data_type: "os:file".to_string(),
            file_entry_type: None,
            path_spec: "/a".to_string(),
        });
        let identifier = store.add(source.clone()).await.unwrap();

        let mut expected = source;
        expected.set_identifier(identifier);
        let fetched = store.get_by_identifier(ContainerType::EventSource, identifier).await.unwrap();
        assert_eq!(fetched, Some(expected));
    }

    #[tokio::test]
    async fn reference_round_trips_to_an_existing_container() {
        let mut store = MemoryStore::open(StorageType::Session);
        let data_id = store
            .add(Container::EventData(EventData {
                identifier: None,
                event_data_stream_identifier: None,
                data_type: "os:file".to_string(),
                attributes: Default::default(),
            }))
            .await
            .unwrap();

        let event = Container::Event(Event {
            identifier: None,
            event_data_identifier: Some(data_id),
            timestamp: 1,
            timestamp_desc: "mtime".to_string(),
        });
        store.add(event).await.unwrap();

        let fetched = store.get_by_index(ContainerType::Event, 0).await.unwrap().unwrap();
        if let Container::Event(e) = fetched {
            let referenced = store
                .get_by_identifier(ContainerType::EventData, e.event_data_identifier.unwrap())
                .await
                .unwrap();
            assert!(referenced.is_some());
        } else {
            panic!("wrong variant");
        }
    }

    #[tokio::test]
    async fn iterate_preserves_insertion_order() {
        let mut store = MemoryStore::open(StorageType::Session);
        for i in 0..3 {
            store
                .add(Container::EventSource(EventSource {
                    identifier: None,
                    data_type: format!("type-{i}"),
                    file_entry_type: None,
                    path_spec: format!("/path-{i}"),
                }))
                .await
                .unwrap();
        }

        let items: Vec<_> = store
            .iterate(ContainerType::EventSource)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        let data_types: Vec<_> = items
            .into_iter()
            .map(|c| match c {
                Container::EventSource(s) => s.data_type,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(data_types, vec!["type-0", "type-1", "type-2"]);
    }

    #[tokio::test]
    async fn count_and_has_agree() {
        let mut store = MemoryStore::open(StorageType::Session);
        assert!(!store.has(ContainerType::EventSource).await.unwrap());
        assert_eq!(store.count(ContainerType::EventSource).await.unwrap(), 0);

        store
            .add(Container::EventSource(EventSource {
                identifier: None,
                data_type: "os:file".to_string(),
                file_entry_type: None,
                path_spec: "/a".to_string(),
            }))
            .await
            .unwrap();

        assert!(store.has(ContainerType::EventSource).await.unwrap());
        assert_eq!(store.count(ContainerType::EventSource).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_is_not_idempotent() {
        let mut store = MemoryStore::open(StorageType::Session);
        store.close().await.unwrap();
        assert!(matches!(store.close().await, Err(StoreError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn sorted_events_break_ties_by_insertion_order() {
        let mut store = MemoryStore::open(StorageType::Session);
        for ts in [100, 100, 50, 200] {
            store.add(event(ts)).await.unwrap();
        }

        let items: Vec<_> = store
            .sorted_events(None)
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
        assert_eq!(timestamps, vec![50, 100, 100, 200]);
    }

    #[tokio::test]
    async fn sorted_events_respects_a_time_range() {
        let mut store = MemoryStore::open(StorageType::Session);
        for ts in [10, 20, 30, 40, 50] {
            store.add(event(ts)).await.unwrap();
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
    async fn a_second_tag_for_the_same_event_makes_the_lookup_ambiguous() {
        let mut store = MemoryStore::open(StorageType::Session);
        let event_id = store.add(event(1)).await.unwrap();

        store
            .add(Container::EventTag(EventTag {
                identifier: None,
                event_identifier: Some(event_id),
                labels: vec!["suspicious".to_string()],
            }))
            .await
            .unwrap();
        let tag = store.event_tag_for(event_id).await.unwrap().unwrap();
        assert_eq!(
            match tag {
                Container::EventTag(t) => t.labels,
                _ => unreachable!(),
            },
            vec!["suspicious".to_string()]
        );

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
    async fn updating_the_sole_tag_for_an_event_keeps_it_findable() {
        let mut store = MemoryStore::open(StorageType::Session);
        let event_id = store.add(event(1)).await.unwrap();

        let tag_id = store
            .add(Container::EventTag(EventTag {
                identifier: None,
                event_identifier: Some(event_id),
                labels: vec!["suspicious".to_string()],
            }))
            .await
            .unwrap();

        store
            .update(Container::EventTag(EventTag {
                identifier: Some(tag_id),
                event_identifier: Some(event_id),
                labels: vec!["suspicious".to_string(), "reviewed".to_string()],
            }))
            .await
            .unwrap();

        let tag = store.event_tag_for(event_id).await.unwrap().unwrap();
        assert_eq!(
            match tag {
                Container::EventTag(t) => t.labels,
                _ => unreachable!(),
            },
            vec!["suspicious".to_string(), "reviewed".to_string()]
        );
    }
}
