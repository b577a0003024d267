//! Type-safe identifier wrappers.
//!
//! Two families of identifiers exist in the economy:
//!
//! - **Names** wrap a [`String`]. Agents, goods, and roles are addressed by
//!   stable human-chosen names so that configuration files and persisted
//!   snapshots stay readable.
//! - **Sequence ids** wrap a [`u64`] handed out by the component that owns
//!   the record. They are strictly increasing and never reused, including
//!   across snapshot/restore.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new name from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

/// Generates a newtype wrapper around a monotonically increasing [`u64`].
macro_rules! define_seq_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The first id handed out by a fresh sequence.
            pub const FIRST: Self = Self(1);

            /// Wrap a raw sequence value.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw sequence value.
            pub const fn value(self) -> u64 {
                self.0
            }

            /// Return the id that follows this one, or `None` if the
            /// sequence is exhausted.
            pub const fn next(self) -> Option<Self> {
                match self.0.checked_add(1) {
                    Some(value) => Some(Self(value)),
                    None => None,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::FIRST
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_name! {
    /// Unique, stable identifier of an economic agent.
    AgentId
}

define_name! {
    /// Name of a tradable good (e.g. `food`).
    GoodName
}

define_name! {
    /// Role tag of an agent (e.g. `producer`, `market`).
    ///
    /// Roles are an open set: the engine only interprets them through
    /// configuration (starting endowments, production, health exemption).
    Role
}

define_seq_id! {
    /// Identifier of a sell offer in the order book.
    OfferId
}

define_seq_id! {
    /// Identifier of a buy request in the order book.
    RequestId
}

define_seq_id! {
    /// Identifier of a worker's labor offer.
    LaborOfferId
}

define_seq_id! {
    /// Identifier of an employer's labor demand.
    LaborDemandId
}

define_seq_id! {
    /// Identifier of a completed labor hire.
    HireId
}

define_seq_id! {
    /// Identifier of a committed transaction in the ledger.
    TransactionId
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn names_serialize_transparently() {
        let id = AgentId::from("producer");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"producer\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn names_order_lexicographically() {
        let mut ids = vec![
            AgentId::from("worker"),
            AgentId::from("consumer"),
            AgentId::from("producer"),
        ];
        ids.sort();
        assert_eq!(ids.first().map(AgentId::as_str), Some("consumer"));
        assert_eq!(ids.last().map(AgentId::as_str), Some("worker"));
    }

    #[test]
    fn sequence_ids_increase() {
        let first = TransactionId::FIRST;
        let second = first.next().unwrap();
        assert!(second > first);
        assert_eq!(second.value(), 2);
    }

    #[test]
    fn sequence_exhaustion_is_reported() {
        assert!(OfferId::new(u64::MAX).next().is_none());
    }

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(GoodName::from("food").to_string(), "food");
        assert_eq!(RequestId::new(42).to_string(), "42");
    }
}
