//! Typed identifiers for drivers and orders.
//!
//! Ids are handed out by an [IdAllocator] owned by the collection that stores
//! the entities, so every run starts counting from zero.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident, $label:literal;) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $label, self.0)
            }
        }
    };
}

typed_id! {
    /// Identifier of a driver in the [crate::fleet::DriverFleet].
    pub struct DriverId, "driver";
}

typed_id! {
    /// Identifier of an order in the [crate::orders::OrderBook].
    pub struct OrderId, "order";
}

/// Monotonic id source.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}
