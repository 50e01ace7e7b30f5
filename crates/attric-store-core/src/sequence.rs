//! Per-container-type monotonic sequence counters.

use std::collections::HashMap;

use attric_types::ContainerType;

/// Holds one monotonically increasing counter per container type.
///
/// The in-memory store uses the counter value itself as the identifier's
/// sequence number; the durable store seeds it from the on-open row count
/// and advances it in lockstep with each insert.
#[derive(Debug, Default)]
pub struct SequenceCounters {
    counters: HashMap<ContainerType, u64>,
}

impl SequenceCounters {
    /// All counters start at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the counter for `container_type` to `value`, e.g. from an
    /// existing row count observed on open.
    pub fn seed(&mut self, container_type: ContainerType, value: u64) {
        self.counters.insert(container_type, value);
    }

    /// The counter's current value, without consuming it.
    pub fn peek(&self, container_type: ContainerType) -> u64 {
        self.counters.get(&container_type).copied().unwrap_or(0)
    }

    /// Returns the current value and advances the counter by one.
    pub fn next(&mut self, container_type: ContainerType) -> u64 {
        let counter = self.counters.entry(container_type).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_advance_independently() {
        let mut counters = SequenceCounters::new();
        assert_eq!(counters.peek(ContainerType::Event), 0);
        assert_eq!(counters.next(ContainerType::Event), 0);
        assert_eq!(counters.next(ContainerType::Event), 1);
        assert_eq!(counters.peek(ContainerType::Event), 2);
        // A different type's counter is unaffected.
        assert_eq!(counters.peek(ContainerType::EventTag), 0);
    }

    #[test]
    fn seed_initializes_from_an_existing_row_count() {
        let mut counters = SequenceCounters::new();
        counters.seed(ContainerType::EventSource, 7);
        assert_eq!(counters.next(ContainerType::EventSource), 7);
        assert_eq!(counters.next(ContainerType::EventSource), 8);
    }

    #[test]
    fn peek_does_not_consume_the_counter() {
        let mut counters = SequenceCounters::new();
        counters.seed(ContainerType::SystemConfiguration, 3);
        assert_eq!(counters.peek(ContainerType::SystemConfiguration), 3);
        assert_eq!(counters.peek(ContainerType::SystemConfiguration), 3);
    }
}
