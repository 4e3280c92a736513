//! Domain newtypes
//!
//! Collection identifiers are 64-bit integers assigned by the server or by the
//! collection store (usually a millisecond timestamp). Wrapping them keeps a
//! deck id from being passed where a note id is expected.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

macro_rules! collection_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[doc = concat!("Create a ", $label, " from an i64 value")]
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the inner i64 value
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().parse::<i64>() {
                    Ok(id) if id > 0 => Ok(Self(id)),
                    Ok(id) => Err(DomainError::InvalidId(format!(
                        "Invalid {}: {id} is not positive",
                        $label
                    ))),
                    Err(e) => Err(DomainError::InvalidId(format!("Invalid {}: {e}", $label))),
                }
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

collection_id!(
    /// Identifier of a deck (stable across renames)
    DeckId,
    "DeckId"
);

collection_id!(
    /// Identifier of a note; a card's public id is its note id
    NoteId,
    "NoteId"
);

collection_id!(
    /// Identifier of a scheduled card row
    CardId,
    "CardId"
);

collection_id!(
    /// Identifier of a note type (model)
    NoteTypeId,
    "NoteTypeId"
);
