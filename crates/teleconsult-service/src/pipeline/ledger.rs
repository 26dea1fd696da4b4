//! Fund distribution.

use async_trait::async_trait;

use teleconsult_core::{ConsultError, TransferRecord, TransferStatus};
use teleconsult_store::Store;

use super::{PaymentContext, Step};

/// Record the transfer of the provider share.
///
/// The transfer completes only against a verified payout alias; otherwise it is
/// written as failed and the funds stay held. A payment gets one transfer: when
/// a retried delivery finds one already recorded, only the payment's
/// `transfers_completed` flag is brought in line with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributeFunds;

#[async_trait]
impl Step for DistributeFunds {
    fn name(&self) -> &'static str {
        "distribute_funds"
    }

    async fn run(&self, store: &dyn Store, ctx: &PaymentContext) -> teleconsult_core::Result<()> {
        let professional_id = ctx.consultation.professional_id;
        let transaction_id = &ctx.payment.transaction_id;

        let transfer = match store.get_transfer_for_payment(transaction_id).await? {
            Some(existing) => existing,
            None => {
                let profile = store.get_payout_profile(&professional_id).await?;
                let attempt =
                    TransferRecord::attempt(&ctx.payment, professional_id, profile.as_ref());
                if store.insert_transfer(&attempt).await? {
                    log_attempt(&attempt);
                    attempt
                } else {
                    // A concurrent delivery recorded it first.
                    store
                        .get_transfer_for_payment(transaction_id)
                        .await?
                        .ok_or_else(|| {
                            ConsultError::Storage(format!(
                                "transfer for {transaction_id} vanished after conflict"
                            ))
                        })?
                }
            }
        };

        if transfer.status == TransferStatus::Completed && !ctx.payment.transfers_completed {
            store.mark_transfers_completed(transaction_id).await?;
        }

        Ok(())
    }
}

fn log_attempt(transfer: &TransferRecord) {
    match transfer.status {
        TransferStatus::Completed => {
            tracing::info!(
                transfer_id = %transfer.id,
                transaction_id = %transfer.transaction_id,
                professional_id = %transfer.professional_id,
                amount_cents = transfer.amount_cents,
                "Provider share transferred"
            );
        }
        TransferStatus::Failed | TransferStatus::Pending => {
            tracing::warn!(
                transfer_id = %transfer.id,
                transaction_id = %transfer.transaction_id,
                professional_id = %transfer.professional_id,
                amount_cents = transfer.amount_cents,
                reason = transfer.error_message.as_deref().unwrap_or("unknown"),
                "Provider share held"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleconsult_core::{
        split, Consultation, ExternalTransactionId, PaymentRecord, PayoutProfile, UserId,
    };
    use teleconsult_store::MemoryStore;

    async fn seeded(store: &MemoryStore) -> PaymentContext {
        let consultation =
            Consultation::request(UserId::generate(), UserId::generate(), 100_000).unwrap();
        let payment = PaymentRecord::approved(
            ExternalTransactionId::for_payment("PAY1"),
            consultation.id,
            &split(100_000).unwrap(),
            None,
        );
        store.insert_consultation(&consultation).await.unwrap();
        store.insert_payment(&payment).await.unwrap();
        PaymentContext {
            consultation,
            payment,
        }
    }

    #[tokio::test]
    async fn verified_alias_completes_transfer() {
        let store = MemoryStore::new();
        let ctx = seeded(&store).await;
        let mut profile = PayoutProfile::with_alias(ctx.consultation.professional_id, "dr.alias");
        profile.verify();
        store.upsert_payout_profile(&profile).await.unwrap();

        DistributeFunds.run(&store, &ctx).await.unwrap();

        let transfers = store
            .list_transfers_for_consultation(&ctx.consultation.id)
            .await
            .unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].status, TransferStatus::Completed);
        assert_eq!(transfers[0].amount_cents, 90_000);

        let payment = store
            .get_payment(&ctx.payment.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert!(payment.transfers_completed);
    }

    #[tokio::test]
    async fn rerun_keeps_one_transfer_and_settles_flag() {
        let store = MemoryStore::new();
        let ctx = seeded(&store).await;
        let mut profile = PayoutProfile::with_alias(ctx.consultation.professional_id, "dr.alias");
        profile.verify();
        store.upsert_payout_profile(&profile).await.unwrap();

        // A completed transfer whose flag update never landed.
        let transfer = TransferRecord::attempt(
            &ctx.payment,
            ctx.consultation.professional_id,
            Some(&profile),
        );
        store.insert_transfer(&transfer).await.unwrap();

        DistributeFunds.run(&store, &ctx).await.unwrap();
        DistributeFunds.run(&store, &ctx).await.unwrap();

        let transfers = store
            .list_transfers_for_consultation(&ctx.consultation.id)
            .await
            .unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].id, transfer.id);

        let payment = store
            .get_payment(&ctx.payment.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert!(payment.transfers_completed);
    }

    #[tokio::test]
    async fn missing_profile_records_failed_transfer() {
        let store = MemoryStore::new();
        let ctx = seeded(&store).await;

        DistributeFunds.run(&store, &ctx).await.unwrap();

        let transfers = store
            .list_transfers_for_consultation(&ctx.consultation.id)
            .await
            .unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].status, TransferStatus::Failed);
        assert_eq!(
            transfers[0].error_message.as_deref(),
            Some("No alias configured")
        );

        let payment = store
            .get_payment(&ctx.payment.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!payment.transfers_completed);
    }
}
