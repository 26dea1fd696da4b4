//! Payment reconciliation.
//!
//! Shared by the webhook and the return-page confirmation. The processor is the
//! only source of truth: the payment is fetched with the server-side credential
//! and the split is computed from its reported transaction amount.

use teleconsult_core::{
    amount_to_cents, is_valid_payment_id, split, ConsultError, ConsultationId,
    ExternalTransactionId, PaymentRecord,
};
use teleconsult_store::{Store, StoreError};

use super::{PaymentContext, PipelineReport};
use crate::mercadopago::{MercadoPagoError, Payment};
use crate::state::AppState;

/// Outcome of reconciling one processor payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Recorded now; the post-payment pipeline ran.
    Processed {
        /// The payment record key.
        transaction_id: ExternalTransactionId,
        /// The consultation paid for.
        consultation_id: ConsultationId,
        /// Pipeline step results.
        report: PipelineReport,
    },
    /// Already recorded by an earlier delivery; the pipeline ran again and
    /// completed whatever that delivery left undone.
    Duplicate {
        /// The payment record key.
        transaction_id: ExternalTransactionId,
        /// The consultation paid for.
        consultation_id: ConsultationId,
        /// Pipeline step results.
        report: PipelineReport,
    },
    /// Not approved yet; nothing changed.
    NotApproved {
        /// Processor status.
        status: String,
    },
    /// The payment belongs to another consultation; nothing changed.
    ReferenceMismatch {
        /// Processor status.
        status: String,
    },
}

impl Reconciliation {
    /// Whether the consultation is paid as a result (now or earlier).
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Processed { .. } | Self::Duplicate { .. })
    }

    /// Short status label for responses.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Duplicate { .. } => "duplicate",
            Self::NotApproved { status } | Self::ReferenceMismatch { status } => status,
        }
    }
}

/// Reconcile a processor payment against its consultation.
///
/// When `expected` is given, a payment referencing a different consultation is
/// reported as [`Reconciliation::ReferenceMismatch`] without mutation.
///
/// # Errors
///
/// - `Validation` when `payment_id` is not a plain processor id
/// - `MissingCredentialsConfiguration` when no server-side token is configured
/// - `UpstreamFailure` when the lookup fails
/// - `UnresolvedConsultation` when the payment references no known consultation
/// - `InvalidAmount` when an approved payment carries no usable amount
/// - `Storage` when a write fails
pub async fn reconcile_payment(
    state: &AppState,
    payment_id: &str,
    expected: Option<&ConsultationId>,
) -> Result<Reconciliation, ConsultError> {
    if !is_valid_payment_id(payment_id) {
        tracing::warn!(payment_id = %payment_id, "Rejected malformed payment id");
        return Err(ConsultError::Validation("paymentId is not a valid payment id".into()));
    }

    let token = state.config.service_access_token()?;

    let payment = state
        .mercadopago
        .get_payment(token, payment_id)
        .await
        .map_err(|e| lookup_failure(payment_id, e))?;

    let consultation_id = resolve_consultation_id(&payment)?;
    let consultation = state
        .store
        .get_consultation(&consultation_id)
        .await?
        .ok_or_else(|| {
            ConsultError::UnresolvedConsultation(format!("consultation {consultation_id} not found"))
        })?;

    if expected.is_some_and(|id| *id != consultation.id) {
        tracing::warn!(
            payment_id = %payment_id,
            consultation_id = %consultation.id,
            "Payment references a different consultation"
        );
        return Ok(Reconciliation::ReferenceMismatch {
            status: payment.status,
        });
    }

    if !payment.is_approved() {
        tracing::info!(
            payment_id = %payment_id,
            consultation_id = %consultation.id,
            status = %payment.status,
            "Payment not approved, nothing to record"
        );
        return Ok(Reconciliation::NotApproved {
            status: payment.status,
        });
    }

    let amount = payment.transaction_amount.ok_or_else(|| {
        ConsultError::InvalidAmount(format!("approved payment {payment_id} has no amount"))
    })?;
    let fees = split(amount_to_cents(amount)?)?;

    if fees.total_cents != consultation.fee_cents {
        tracing::warn!(
            payment_id = %payment_id,
            consultation_id = %consultation.id,
            charged_cents = fees.total_cents,
            fee_cents = consultation.fee_cents,
            "Charged amount differs from consultation fee"
        );
    }

    let transaction_id = ExternalTransactionId::for_payment(&payment.id);
    let record = PaymentRecord::approved(
        transaction_id.clone(),
        consultation.id,
        &fees,
        payment.payment_method_id.clone(),
    );

    let fresh = match state.store.insert_payment(&record).await {
        Ok(()) => true,
        Err(StoreError::DuplicateTransaction { .. }) => false,
        Err(e) => return Err(e.into()),
    };

    // Every write below is idempotent per transaction, so a retried delivery
    // finishes what an interrupted one started.
    let paid = match state.store.mark_consultation_paid(&consultation.id).await? {
        Some(updated) => updated,
        None => consultation,
    };

    let payment = if fresh {
        tracing::info!(
            transaction_id = %transaction_id,
            consultation_id = %paid.id,
            total_cents = record.total_amount_cents,
            platform_fee_cents = record.platform_fee_cents,
            provider_fee_cents = record.provider_fee_cents,
            "Payment recorded"
        );
        record
    } else {
        tracing::info!(
            transaction_id = %transaction_id,
            consultation_id = %paid.id,
            "Payment already recorded"
        );
        state
            .store
            .get_payment(&transaction_id)
            .await?
            .unwrap_or(record)
    };

    let consultation_id = paid.id;
    let ctx = PaymentContext {
        consultation: paid,
        payment,
    };
    let report = state.pipeline.run(state.store.as_ref(), &ctx).await;

    if fresh {
        Ok(Reconciliation::Processed {
            transaction_id,
            consultation_id,
            report,
        })
    } else {
        Ok(Reconciliation::Duplicate {
            transaction_id,
            consultation_id,
            report,
        })
    }
}

fn resolve_consultation_id(payment: &Payment) -> Result<ConsultationId, ConsultError> {
    let reference = payment.consultation_reference().ok_or_else(|| {
        ConsultError::UnresolvedConsultation(format!(
            "payment {} carries no consultation reference",
            payment.id
        ))
    })?;

    reference.trim().parse().map_err(|_| {
        ConsultError::UnresolvedConsultation(format!(
            "payment {} references unknown consultation {reference}",
            payment.id
        ))
    })
}

fn lookup_failure(payment_id: &str, err: MercadoPagoError) -> ConsultError {
    match err {
        MercadoPagoError::Api { status, body } => {
            tracing::error!(
                payment_id = %payment_id,
                upstream_status = status,
                body = %body,
                "Payment lookup rejected"
            );
            ConsultError::UpstreamFailure(format!("payment lookup returned HTTP {status}"))
        }
        other => {
            tracing::error!(payment_id = %payment_id, error = %other, "Payment lookup failed");
            ConsultError::UpstreamFailure(other.to_string())
        }
    }
}
