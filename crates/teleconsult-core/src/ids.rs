//! Identifier types.
//!
//! Users and consultations are identified by UUIDs issued by the identity provider
//! and the consultation request flow. Chat messages and transfers use ULIDs so that
//! their natural sort order is creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Prefix applied to processor payment ids to build the idempotency key.
pub const EXTERNAL_TRANSACTION_PREFIX: &str = "MP-";

/// Longest processor payment id accepted.
pub const MAX_PAYMENT_ID_LEN: usize = 64;

/// Whether `id` looks like a processor payment id: ASCII letters, digits, `-`
/// or `_`, at most [`MAX_PAYMENT_ID_LEN`] characters.
#[must_use]
pub fn is_valid_payment_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PAYMENT_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Define a UUID-based identifier newtype.
///
/// Generates `Clone`, `Copy`, `Eq`, `Hash`, string serde, `FromStr`, `Display`, `Debug`
/// and `TryFrom<String>` / `Into<String>`.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

/// Define a ULID-based identifier newtype (time-ordered).
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create an identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Return the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

uuid_id_type!(UserId, "A user identifier (patient or professional), taken from the JWT `sub` claim.");
uuid_id_type!(ConsultationId, "A consultation identifier.");
uuid_id_type!(NotificationId, "A notification identifier.");

impl NotificationId {
    /// The id of the payment notification for a transaction.
    ///
    /// Name-based (UUID v5), so re-running the post-payment steps for the same
    /// transaction produces the same id.
    #[must_use]
    pub fn for_payment(transaction_id: &ExternalTransactionId) -> Self {
        Self(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            transaction_id.as_str().as_bytes(),
        ))
    }
}

ulid_id_type!(MessageId, "A chat message identifier; sorts in creation order.");
ulid_id_type!(TransferId, "A fund-distribution attempt identifier.");

/// Idempotency key of a confirmed payment, derived from the processor payment id.
///
/// The same processor payment always maps to the same key, so duplicate webhook
/// deliveries collide on the store's uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalTransactionId(String);

impl ExternalTransactionId {
    /// Build the key for a processor payment id.
    #[must_use]
    pub fn for_payment(payment_id: &str) -> Self {
        Self(format!("{EXTERNAL_TRANSACTION_PREFIX}{}", payment_id.trim()))
    }

    /// Wrap an already-prefixed key (as read back from storage).
    #[must_use]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the processor payment id this key was derived from.
    #[must_use]
    pub fn payment_id(&self) -> &str {
        self.0
            .strip_prefix(EXTERNAL_TRANSACTION_PREFIX)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ExternalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}
