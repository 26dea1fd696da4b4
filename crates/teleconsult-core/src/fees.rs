//! Platform / provider fee split.
//!
//! This is the single place the split is computed. Preference creation, webhook
//! reconciliation and any later reconciliation job all call [`split`].

use serde::{Deserialize, Serialize};

use crate::error::{ConsultError, Result};

/// Share of every payment retained by the platform.
pub const PLATFORM_FEE_PERCENT: u8 = 10;

/// Share of every payment owed to the professional.
pub const PROVIDER_FEE_PERCENT: u8 = 100 - PLATFORM_FEE_PERCENT;

/// Result of splitting a payment total.
///
/// `platform_fee_cents + provider_fee_cents == total_cents` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Total charged, in cents.
    pub total_cents: i64,
    /// Amount retained by the platform, in cents.
    pub platform_fee_cents: i64,
    /// Amount owed to the professional, in cents.
    pub provider_fee_cents: i64,
}

impl FeeSplit {
    /// Platform fee as a processor decimal amount.
    #[must_use]
    pub fn platform_fee_amount(&self) -> f64 {
        cents_to_amount(self.platform_fee_cents)
    }

    /// Provider fee as a processor decimal amount.
    #[must_use]
    pub fn provider_fee_amount(&self) -> f64 {
        cents_to_amount(self.provider_fee_cents)
    }

    /// Total as a processor decimal amount.
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        cents_to_amount(self.total_cents)
    }
}

/// Split a total into platform and provider shares.
///
/// The platform share is rounded half-up to the cent; the provider receives the
/// remainder, so any rounding residue lands on the provider side.
///
/// # Errors
///
/// Returns `InvalidAmount` for negative totals or totals too large to scale.
pub fn split(total_cents: i64) -> Result<FeeSplit> {
    if total_cents < 0 {
        return Err(ConsultError::InvalidAmount(format!(
            "total must not be negative: {total_cents}"
        )));
    }

    let scaled = total_cents
        .checked_mul(i64::from(PLATFORM_FEE_PERCENT))
        .ok_or_else(|| ConsultError::InvalidAmount(format!("total too large: {total_cents}")))?;

    // (x + 50) / 100 is round-half-up for non-negative x.
    let platform_fee_cents = (scaled + 50) / 100;

    Ok(FeeSplit {
        total_cents,
        platform_fee_cents,
        provider_fee_cents: total_cents - platform_fee_cents,
    })
}

/// Convert a processor decimal amount into integer cents.
///
/// # Errors
///
/// Returns `InvalidAmount` for negative, NaN, infinite or out-of-range amounts.
#[allow(clippy::cast_possible_truncation)]
pub fn amount_to_cents(amount: f64) -> Result<i64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ConsultError::InvalidAmount(format!("{amount}")));
    }

    let cents = (amount * 100.0).round();
    if cents > 9.0e15 {
        return Err(ConsultError::InvalidAmount(format!("{amount}")));
    }

    Ok(cents as i64)
}

/// Convert integer cents into a processor decimal amount.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}
