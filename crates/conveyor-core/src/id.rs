//! Resource identifiers.
//!
//! Records are keyed by database-assigned integers, so every identifier is a
//! thin newtype over `i64` to keep a build id from being passed where a job id
//! is expected.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Display, From,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Get the underlying integer.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_id!(
    /// Identifies a build record.
    BuildId
);
define_id!(
    /// Identifies a job within a pipeline.
    JobId
);
define_id!(
    /// Identifies a resource within a pipeline.
    ResourceId
);
define_id!(
    /// Identifies one discovered version of a resource.
    VersionId
);
