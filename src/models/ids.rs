//! Newtype identifiers for domain entities.
//!
//! Identities are stable integers assigned by the intake/catalog systems.
//! Wrapping them keeps the signatures of the engine honest: a `RoomId`
//! cannot be passed where a `SurgeryId` is expected.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                $name(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Surgery identifier (assigned by intake).
    SurgeryId
);
define_id!(
    /// Operating room identifier.
    RoomId
);
define_id!(
    /// Staff member identifier (surgeons included).
    StaffId
);
define_id!(
    /// Equipment unit identifier.
    EquipmentId
);
define_id!(
    /// Surgery type identifier, used to key the setup-time matrix.
    SurgeryTypeId
);
