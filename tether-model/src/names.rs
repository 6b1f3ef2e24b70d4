//! Strong types for protocol names
//!
//! Semantic newtypes for the string identifiers the protocol routes by,
//! replacing raw `String` in signatures.

use std::fmt;

/// Macro to define string-backed name types.
///
/// Args:
/// - $name: The name of the struct (e.g., StateId)
/// - $doc: Documentation string
macro_rules! define_name {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new name from anything string-like.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Returns the inner name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        // Standard conversions
        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// --- Type Definitions ---

define_name!(
    StateId,
    "Logical name of one synchronized value, unique per channel"
);

define_name!(
    ChannelId,
    "Named pub/sub topic routing sync messages between processes"
);

define_name!(
    OriginId,
    "Identity of one participating process; its `Ord` is the conflict tie-break"
);
