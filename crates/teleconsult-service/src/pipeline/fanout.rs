//! Payment notification for the professional.

use async_trait::async_trait;

use teleconsult_core::Notification;
use teleconsult_store::Store;

use super::{PaymentContext, Step};

/// Write exactly one `payment_received` notification for the professional.
///
/// The notification id is derived from the transaction, so re-running the step
/// for a retried delivery writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyProfessional;

#[async_trait]
impl Step for NotifyProfessional {
    fn name(&self) -> &'static str {
        "notify_professional"
    }

    async fn run(&self, store: &dyn Store, ctx: &PaymentContext) -> teleconsult_core::Result<()> {
        let notification = Notification::payment_received(
            ctx.consultation.professional_id,
            ctx.consultation.id,
            &ctx.payment.transaction_id,
            ctx.payment.total_amount_cents,
        );

        if store.insert_notification(&notification).await? {
            tracing::debug!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                "Payment notification created"
            );
        } else {
            tracing::debug!(
                notification_id = %notification.id,
                transaction_id = %ctx.payment.transaction_id,
                "Payment notification already sent"
            );
        }
        Ok(())
    }
}
