//! Professional payout credentials and payout destination.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Payment-processor credentials linked by a professional through OAuth.
///
/// One per professional. Deactivated rather than deleted on disconnect.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPaymentAccount {
    /// The professional owning the account.
    pub professional_id: UserId,
    /// OAuth access token.
    pub access_token: String,
    /// OAuth refresh token.
    pub refresh_token: Option<String>,
    /// The professional's account id at the processor (disbursement target).
    pub external_account_id: Option<String>,
    /// The professional's public key at the processor.
    pub public_key: Option<String>,
    /// When the account was (re)linked.
    pub connected_at: DateTime<Utc>,
    /// Whether the link is active.
    pub active: bool,
}

impl ProviderPaymentAccount {
    /// Build an active account from a successful token exchange.
    #[must_use]
    pub fn linked(
        professional_id: UserId,
        access_token: String,
        refresh_token: Option<String>,
        external_account_id: Option<String>,
        public_key: Option<String>,
    ) -> Self {
        Self {
            professional_id,
            access_token,
            refresh_token,
            external_account_id,
            public_key,
            connected_at: Utc::now(),
            active: true,
        }
    }

    /// The disbursement target, if the account is usable for payments.
    #[must_use]
    pub fn linked_account_id(&self) -> Option<&str> {
        if !self.active {
            return None;
        }
        self.external_account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl fmt::Debug for ProviderPaymentAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderPaymentAccount")
            .field("professional_id", &self.professional_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("external_account_id", &self.external_account_id)
            .field("public_key", &self.public_key)
            .field("connected_at", &self.connected_at)
            .field("active", &self.active)
            .finish()
    }
}

/// Where a professional's share is paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutProfile {
    /// The professional.
    pub professional_id: UserId,
    /// Bank alias / account handle chosen by the professional.
    pub alias: Option<String>,
    /// Whether the alias was verified by an administrator.
    pub alias_verified: bool,
    /// When the profile last changed.
    pub updated_at: DateTime<Utc>,
}

impl PayoutProfile {
    /// Set a new alias. A changed alias is unverified again.
    #[must_use]
    pub fn with_alias(professional_id: UserId, alias: impl Into<String>) -> Self {
        Self {
            professional_id,
            alias: Some(alias.into()),
            alias_verified: false,
            updated_at: Utc::now(),
        }
    }

    /// Mark the alias verified.
    pub fn verify(&mut self) {
        self.alias_verified = true;
        self.updated_at = Utc::now();
    }

    /// The verified payout destination, or why funds must be held.
    ///
    /// # Errors
    ///
    /// Returns the hold reason when no alias is set or it is unverified.
    pub fn destination(&self) -> Result<&str, PayoutHold> {
        let alias = self
            .alias
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(PayoutHold::NoAlias)?;

        if !self.alias_verified {
            return Err(PayoutHold::AliasNotVerified);
        }

        Ok(alias)
    }
}

/// Why a transfer could not be completed; funds stay held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PayoutHold {
    /// The professional never configured an alias.
    #[error("No alias configured")]
    NoAlias,
    /// The alias exists but was not verified.
    #[error("Alias not verified")]
    AliasNotVerified,
}
