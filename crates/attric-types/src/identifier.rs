//! Surrogate keys assigned to attribute containers by a store.

use std::fmt;

use crate::container_type::ContainerType;

/// A store-assigned surrogate key referencing exactly one container.
///
/// Two backend-specific variants exist. A store rejects identifiers of the
/// wrong variant with [`crate::ContainerError::UnsupportedIdentifier`];
/// producers otherwise treat identifiers as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Monotonic counter scoped to `(store, container type)`, used by the
    /// in-memory store. The counter starts at zero.
    Sequence(u64),
    /// `(container_type, sequence_number)` where `sequence_number` is the
    /// 1-based row number in the durable table for that type.
    Row {
        /// Container type the row belongs to.
        container_type: ContainerType,
        /// 1-based row number.
        sequence_number: u64,
    },
}

impl Identifier {
    /// The numeric sequence number carried by either variant.
    pub fn sequence_number(&self) -> u64 {
        match self {
            Identifier::Sequence(n) => *n,
            Identifier::Row { sequence_number, .. } => *sequence_number,
        }
    }

    /// True if this is a [`Identifier::Sequence`].
    pub fn is_sequence(&self) -> bool {
        matches!(self, Identifier::Sequence(_))
    }

    /// True if this is a [`Identifier::Row`] for the given container type.
    pub fn is_row_of(&self, container_type: ContainerType) -> bool {
        matches!(self, Identifier::Row { container_type: t, .. } if *t == container_type)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Sequence(n) => write!(f, "{n}"),
            Identifier::Row { container_type, sequence_number } => {
                write!(f, "{container_type}.{sequence_number}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_extraction() {
        assert_eq!(Identifier::Sequence(7).sequence_number(), 7);
        let row = Identifier::Row { container_type: ContainerType::Event, sequence_number: 3 };
        assert_eq!(row.sequence_number(), 3);
    }

    #[test]
    fn display_matches_lookup_key_shape() {
        assert_eq!(Identifier::Sequence(0).to_string(), "0");
        let row = Identifier::Row { container_type: ContainerType::Event, sequence_number: 12 };
        assert_eq!(row.to_string(), "event.12");
    }

    #[test]
    fn variant_checks() {
        assert!(Identifier::Sequence(1).is_sequence());
        let row = Identifier::Row { container_type: ContainerType::Event, sequence_number: 1 };
        assert!(!row.is_sequence());
        assert!(row.is_row_of(ContainerType::Event));
        assert!(!row.is_row_of(ContainerType::EventTag));
    }
}
