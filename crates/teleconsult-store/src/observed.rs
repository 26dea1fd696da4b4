//! Store decorator that publishes committed writes to a [`ChangeFeed`].

use async_trait::async_trait;
use tokio::sync::Mutex;

use teleconsult_core::{
    ChatDraft, ChatMessage, Consultation, ConsultationId, ExternalTransactionId, Notification,
    NotificationId, PaymentRecord, PayoutProfile, ProviderPaymentAccount, TransferRecord, UserId,
};

use crate::error::Result;
use crate::feed::{ChangeEvent, ChangeFeed, ChangeOp, Row};
use crate::Store;

/// Wraps a store and publishes one event per successful write.
///
/// Events are published after the inner write returns, so subscribers never see
/// a change that was not persisted. Provider accounts are not published.
pub struct Observed<S> {
    inner: S,
    feed: ChangeFeed,
    // Serializes append + publish so chat events go out in id order.
    chat_gate: Mutex<()>,
}

impl<S: Store> Observed<S> {
    /// Wrap a store.
    pub fn new(inner: S, feed: ChangeFeed) -> Self {
        Self {
            inner,
            feed,
            chat_gate: Mutex::new(()),
        }
    }

    fn publish(&self, op: ChangeOp, row: Row) {
        self.feed.publish(ChangeEvent::new(op, row));
    }

    async fn publish_consultation(&self, id: &ConsultationId) -> Result<()> {
        if let Some(current) = self.inner.get_consultation(id).await? {
            self.publish(ChangeOp::Update, Row::Consultation(current));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Store> Store for Observed<S> {
    async fn insert_consultation(&self, consultation: &Consultation) -> Result<()> {
        self.inner.insert_consultation(consultation).await?;
        self.publish(ChangeOp::Insert, Row::Consultation(consultation.clone()));
        Ok(())
    }

    async fn get_consultation(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        self.inner.get_consultation(id).await
    }

    async fn update_consultation(&self, consultation: &Consultation) -> Result<Consultation> {
        // The stored row, not the argument: a concurrent payment may have kept it paid.
        let stored = self.inner.update_consultation(consultation).await?;
        self.publish(ChangeOp::Update, Row::Consultation(stored.clone()));
        Ok(stored)
    }

    async fn mark_consultation_paid(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        let updated = self.inner.mark_consultation_paid(id).await?;
        if let Some(consultation) = &updated {
            self.publish(ChangeOp::Update, Row::Consultation(consultation.clone()));
        }
        Ok(updated)
    }

    async fn find_awaiting_payment(&self, patient_id: &UserId) -> Result<Vec<Consultation>> {
        self.inner.find_awaiting_payment(patient_id).await
    }

    async fn list_consultations_for(&self, user_id: &UserId) -> Result<Vec<Consultation>> {
        self.inner.list_consultations_for(user_id).await
    }

    async fn upsert_provider_account(&self, account: &ProviderPaymentAccount) -> Result<()> {
        self.inner.upsert_provider_account(account).await
    }

    async fn get_provider_account(
        &self,
        professional_id: &UserId,
    ) -> Result<Option<ProviderPaymentAccount>> {
        self.inner.get_provider_account(professional_id).await
    }

    async fn deactivate_provider_account(&self, professional_id: &UserId) -> Result<bool> {
        self.inner.deactivate_provider_account(professional_id).await
    }

    async fn upsert_payout_profile(&self, profile: &PayoutProfile) -> Result<()> {
        self.inner.upsert_payout_profile(profile).await?;
        self.publish(ChangeOp::Update, Row::PayoutProfile(profile.clone()));
        Ok(())
    }

    async fn get_payout_profile(&self, professional_id: &UserId) -> Result<Option<PayoutProfile>> {
        self.inner.get_payout_profile(professional_id).await
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        self.inner.insert_payment(payment).await?;
        self.publish(ChangeOp::Insert, Row::Payment(payment.clone()));
        Ok(())
    }

    async fn get_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<PaymentRecord>> {
        self.inner.get_payment(transaction_id).await
    }

    async fn list_payments_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<PaymentRecord>> {
        self.inner.list_payments_for_consultation(consultation_id).await
    }

    async fn mark_transfers_completed(&self, transaction_id: &ExternalTransactionId) -> Result<()> {
        self.inner.mark_transfers_completed(transaction_id).await?;
        if let Some(payment) = self.inner.get_payment(transaction_id).await? {
            self.publish(ChangeOp::Update, Row::Payment(payment));
        }
        Ok(())
    }

    async fn insert_transfer(&self, transfer: &TransferRecord) -> Result<bool> {
        let inserted = self.inner.insert_transfer(transfer).await?;
        if inserted {
            self.publish(ChangeOp::Insert, Row::Transfer(transfer.clone()));
        }
        Ok(inserted)
    }

    async fn get_transfer_for_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<TransferRecord>> {
        self.inner.get_transfer_for_payment(transaction_id).await
    }

    async fn list_transfers_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<TransferRecord>> {
        self.inner.list_transfers_for_consultation(consultation_id).await
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<bool> {
        let inserted = self.inner.insert_notification(notification).await?;
        if inserted {
            self.publish(ChangeOp::Insert, Row::Notification(notification.clone()));
        }
        Ok(inserted)
    }

    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        self.inner.list_notifications(user_id, unread_only, limit).await
    }

    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        id: &NotificationId,
    ) -> Result<Option<Notification>> {
        let updated = self.inner.mark_notification_read(user_id, id).await?;
        if let Some(notification) = &updated {
            self.publish(ChangeOp::Update, Row::Notification(notification.clone()));
        }
        Ok(updated)
    }

    async fn append_chat_message(&self, draft: ChatDraft) -> Result<ChatMessage> {
        let _gate = self.chat_gate.lock().await;
        let message = self.inner.append_chat_message(draft).await?;
        self.publish(ChangeOp::Insert, Row::ChatMessage(message.clone()));
        Ok(message)
    }

    async fn list_chat_messages(&self, consultation_id: &ConsultationId) -> Result<Vec<ChatMessage>> {
        self.inner.list_chat_messages(consultation_id).await
    }

    async fn mark_chat_read(
        &self,
        consultation_id: &ConsultationId,
        reader: &UserId,
    ) -> Result<u64> {
        let changed = self.inner.mark_chat_read(consultation_id, reader).await?;
        if changed > 0 {
            // Read receipts go out as a consultation update on the same topic.
            self.publish_consultation(consultation_id).await?;
        }
        Ok(changed)
    }
}
