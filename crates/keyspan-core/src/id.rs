//! 128-bit identifiers for jobs, messages and client sessions.
//!
//! All three are backed by a [`ferroid::id::ULID`] (48-bit millisecond timestamp,
//! 80 random bits) and rendered as 32 lowercase hex digits. The *short id* is
//! the last eight hex digits, which are drawn from the random component so
//! that ids minted in the same millisecond still have distinct short forms.

use crate::{Error, Result};
use ferroid::id::ULID;
use std::time::SystemTime;

/// Number of hex digits in a short id.
pub const SHORT_ID_LEN: usize = 8;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u128);

        impl $name {
            /// Mints a fresh identifier from the current time and thread-local
            /// randomness.
            #[must_use]
            pub fn new() -> Self {
                Self(ULID::from_datetime(SystemTime::now()).to_raw())
            }

            pub const fn from_raw(raw: u128) -> Self {
                Self(raw)
            }

            pub const fn to_raw(self) -> u128 {
                self.0
            }

            pub const fn to_bytes(self) -> [u8; 16] {
                self.0.to_be_bytes()
            }

            /// # Errors
            ///
            /// Returns [`Error::Decode`] unless `bytes` is exactly 16 bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let raw: [u8; 16] = bytes.try_into().map_err(|_| Error::Decode {
                    reason: format!(
                        "{} must be 16 bytes, got {}",
                        stringify!($name),
                        bytes.len()
                    ),
                })?;
                Ok(Self(u128::from_be_bytes(raw)))
            }

            /// Last eight hex digits of the identifier.
            pub fn short(&self) -> String {
                let full = self.to_string();
                full[full.len() - SHORT_ID_LEN..].to_string()
            }

            /// Matches either the full or the short rendering.
            pub fn matches(&self, id: &str) -> bool {
                let id = id.to_ascii_lowercase();
                id == self.to_string() || id == self.short()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }
    };
}

define_id!(
    /// Identifies one [`Job`](crate::Job) for its whole life, across
    /// reschedules.
    JobId
);

define_id!(
    /// Correlation id carried by every protocol message.
    MessageId
);

define_id!(
    /// Identifies one connected worker session on the coordinator.
    ClientId
);
