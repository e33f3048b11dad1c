use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Raw numeric value.
            #[inline]
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Chat platform user identity.
    UserId(i64)
);

numeric_id!(
    /// Per-user batch sequence number, starts at 1.
    BatchId(u64)
);

numeric_id!(
    /// Per-user task sequence number, starts at 1.
    TaskId(u64)
);

/// Chat the status message lives in.
pub type ChatId = i64;

/// Message identifier inside a chat.
pub type MessageId = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_transparent_in_json() {
        let json = serde_json::to_string(&BatchId(7)).unwrap();
        assert_eq!(json, "7");

        let back: UserId = serde_json::from_str("-42").unwrap();
        assert_eq!(back, UserId(-42));
    }

    #[test]
    fn ids_order_numerically() {
        assert!(TaskId(2) > TaskId(1));
        assert_eq!(TaskId::from(3).get(), 3);
        assert_eq!(BatchId(12).to_string(), "12");
    }
}
