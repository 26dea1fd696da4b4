//! In-memory storage implementation.
//!
//! Every operation takes a single write (or read) lock over the whole state, so
//! compound operations like the duplicate-payment check are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use ulid::Generator;

use teleconsult_core::{
    ChatDraft, ChatMessage, Consultation, ConsultationId, ConsultationStatus, ExternalTransactionId, MessageId,
    Notification, NotificationId, PaymentRecord, PaymentStatus, PayoutProfile,
    ProviderPaymentAccount, TransferRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

struct State {
    consultations: HashMap<ConsultationId, Consultation>,
    provider_accounts: HashMap<UserId, ProviderPaymentAccount>,
    payout_profiles: HashMap<UserId, PayoutProfile>,
    payments: HashMap<ExternalTransactionId, PaymentRecord>,
    transfers: Vec<TransferRecord>,
    notifications: Vec<Notification>,
    chat: Vec<ChatMessage>,
    ids: Generator,
}

impl Default for State {
    fn default() -> Self {
        Self {
            consultations: HashMap::new(),
            provider_accounts: HashMap::new(),
            payout_profiles: HashMap::new(),
            payments: HashMap::new(),
            transfers: Vec::new(),
            notifications: Vec::new(),
            chat: Vec::new(),
            ids: Generator::new(),
        }
    }
}

/// Map-backed storage for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut consultations: Vec<Consultation>) -> Vec<Consultation> {
    consultations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    consultations
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Consultations
    // =========================================================================

    async fn insert_consultation(&self, consultation: &Consultation) -> Result<()> {
        self.state
            .write()
            .await
            .consultations
            .insert(consultation.id, consultation.clone());
        Ok(())
    }

    async fn get_consultation(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        Ok(self.state.read().await.consultations.get(id).cloned())
    }

    async fn update_consultation(&self, consultation: &Consultation) -> Result<Consultation> {
        let mut state = self.state.write().await;
        let existing = state
            .consultations
            .get_mut(&consultation.id)
            .ok_or(StoreError::NotFound)?;
        let already_paid = existing.is_paid();
        *existing = consultation.clone();
        if already_paid {
            existing.payment_status = PaymentStatus::Paid;
            if !existing.status.compatible_with_paid() {
                existing.status = ConsultationStatus::Paid;
            }
        }
        Ok(existing.clone())
    }

    async fn mark_consultation_paid(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        let mut state = self.state.write().await;
        let consultation = state.consultations.get_mut(id).ok_or(StoreError::NotFound)?;
        if consultation.mark_paid() {
            Ok(Some(consultation.clone()))
        } else {
            Ok(None)
        }
    }

    async fn find_awaiting_payment(&self, patient_id: &UserId) -> Result<Vec<Consultation>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .consultations
                .values()
                .filter(|c| c.patient_id == *patient_id && c.awaiting_payment())
                .cloned()
                .collect(),
        ))
    }

    async fn list_consultations_for(&self, user_id: &UserId) -> Result<Vec<Consultation>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .consultations
                .values()
                .filter(|c| c.is_participant(user_id))
                .cloned()
                .collect(),
        ))
    }

    // =========================================================================
    // Provider accounts and payout profiles
    // =========================================================================

    async fn upsert_provider_account(&self, account: &ProviderPaymentAccount) -> Result<()> {
        self.state
            .write()
            .await
            .provider_accounts
            .insert(account.professional_id, account.clone());
        Ok(())
    }

    async fn get_provider_account(
        &self,
        professional_id: &UserId,
    ) -> Result<Option<ProviderPaymentAccount>> {
        Ok(self
            .state
            .read()
            .await
            .provider_accounts
            .get(professional_id)
            .cloned())
    }

    async fn deactivate_provider_account(&self, professional_id: &UserId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.provider_accounts.get_mut(professional_id) {
            Some(account) if account.active => {
                account.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_payout_profile(&self, profile: &PayoutProfile) -> Result<()> {
        self.state
            .write()
            .await
            .payout_profiles
            .insert(profile.professional_id, profile.clone());
        Ok(())
    }

    async fn get_payout_profile(&self, professional_id: &UserId) -> Result<Option<PayoutProfile>> {
        Ok(self
            .state
            .read()
            .await
            .payout_profiles
            .get(professional_id)
            .cloned())
    }

    // =========================================================================
    // Payment ledger
    // =========================================================================

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.transaction_id) {
            return Err(StoreError::DuplicateTransaction {
                transaction_id: payment.transaction_id.to_string(),
            });
        }
        state
            .payments
            .insert(payment.transaction_id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().await.payments.get(transaction_id).cloned())
    }

    async fn list_payments_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.consultation_id == *consultation_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    async fn mark_transfers_completed(&self, transaction_id: &ExternalTransactionId) -> Result<()> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(transaction_id)
            .ok_or(StoreError::NotFound)?;
        payment.transfers_completed = true;
        Ok(())
    }

    async fn insert_transfer(&self, transfer: &TransferRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .transfers
            .iter()
            .any(|t| t.transaction_id == transfer.transaction_id)
        {
            return Ok(false);
        }
        state.transfers.push(transfer.clone());
        Ok(true)
    }

    async fn get_transfer_for_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<TransferRecord>> {
        Ok(self
            .state
            .read()
            .await
            .transfers
            .iter()
            .find(|t| t.transaction_id == *transaction_id)
            .cloned())
    }

    async fn list_transfers_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<TransferRecord>> {
        let state = self.state.read().await;
        Ok(state
            .transfers
            .iter()
            .filter(|t| t.consultation_id == *consultation_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    async fn insert_notification(&self, notification: &Notification) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.notifications.iter().any(|n| n.id == notification.id) {
            return Ok(false);
        }
        state.notifications.push(notification.clone());
        Ok(true)
    }

    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == *user_id && (!unread_only || !n.read))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        id: &NotificationId,
    ) -> Result<Option<Notification>> {
        let mut state = self.state.write().await;
        Ok(state
            .notifications
            .iter_mut()
            .find(|n| n.id == *id && n.user_id == *user_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    // =========================================================================
    // Chat
    // =========================================================================

    async fn append_chat_message(&self, draft: ChatDraft) -> Result<ChatMessage> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let ulid = state
            .ids
            .generate()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let message = ChatMessage::stamped(draft, MessageId::from_ulid(ulid), now);
        state.chat.push(message.clone());
        Ok(message)
    }

    async fn list_chat_messages(&self, consultation_id: &ConsultationId) -> Result<Vec<ChatMessage>> {
        let state = self.state.read().await;
        Ok(state
            .chat
            .iter()
            .filter(|m| m.consultation_id == *consultation_id)
            .cloned()
            .collect())
    }

    async fn mark_chat_read(
        &self,
        consultation_id: &ConsultationId,
        reader: &UserId,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for message in state
            .chat
            .iter_mut()
            .filter(|m| m.consultation_id == *consultation_id && m.sender_id != *reader && !m.read)
        {
            message.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use teleconsult_core::split;

    fn accepted_consultation() -> Consultation {
        let mut c = Consultation::request(UserId::generate(), UserId::generate(), 100_000).unwrap();
        c.accept().unwrap();
        c
    }

    fn payment_for(consultation: &Consultation, payment_id: &str) -> PaymentRecord {
        PaymentRecord::approved(
            ExternalTransactionId::for_payment(payment_id),
            consultation.id,
            &split(consultation.fee_cents).unwrap(),
            None,
        )
    }

    #[tokio::test]
    async fn consultation_roundtrip_and_pending_payment() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        store.insert_consultation(&c).await.unwrap();

        assert_eq!(store.get_consultation(&c.id).await.unwrap(), Some(c.clone()));
        assert_eq!(store.find_awaiting_payment(&c.patient_id).await.unwrap().len(), 1);
        assert!(store
            .find_awaiting_payment(&c.professional_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mark_paid_is_conditional() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        store.insert_consultation(&c).await.unwrap();

        let updated = store.mark_consultation_paid(&c.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ConsultationStatus::Paid);
        assert_eq!(updated.payment_status, PaymentStatus::Paid);
        assert!(store.mark_consultation_paid(&c.id).await.unwrap().is_none());

        assert!(matches!(
            store.mark_consultation_paid(&ConsultationId::generate()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn stale_update_keeps_paid() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        store.insert_consultation(&c).await.unwrap();
        store.mark_consultation_paid(&c.id).await.unwrap();

        let mut stale = c.clone();
        stale.mark_doctor_ready().unwrap();
        store.update_consultation(&stale).await.unwrap();

        let stored = store.get_consultation(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConsultationStatus::DoctorReady);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn stale_unpaid_status_is_lifted_to_paid() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        store.insert_consultation(&c).await.unwrap();
        store.mark_consultation_paid(&c.id).await.unwrap();

        // Written back from a copy read before the payment landed.
        let returned = store.update_consultation(&c).await.unwrap();

        let stored = store.get_consultation(&c.id).await.unwrap().unwrap();
        assert_eq!(returned, stored);
        assert_eq!(stored.status, ConsultationStatus::Paid);
        assert!(stored.is_paid());
        assert!(store.find_awaiting_payment(&c.patient_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_payment_rejected() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        store.insert_payment(&payment_for(&c, "PAY1")).await.unwrap();

        let err = store.insert_payment(&payment_for(&c, "PAY1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTransaction { .. }));
        assert_eq!(
            store.list_payments_for_consultation(&c.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_inserts_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let c = accepted_consultation();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let payment = payment_for(&c, "PAY-RACE");
            handles.push(tokio::spawn(async move { store.insert_payment(&payment).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn one_transfer_per_payment() {
        let store = MemoryStore::new();
        let c = accepted_consultation();
        let payment = payment_for(&c, "PAY1");

        let first = TransferRecord::attempt(&payment, c.professional_id, None);
        assert!(store.insert_transfer(&first).await.unwrap());
        let again = TransferRecord::attempt(&payment, c.professional_id, None);
        assert!(!store.insert_transfer(&again).await.unwrap());

        let stored = store
            .get_transfer_for_payment(&payment.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(
            store.list_transfers_for_consultation(&c.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn chat_keeps_append_order_and_read_marks() {
        let store = MemoryStore::new();
        let c = accepted_consultation();

        for (sender, text) in [
            (c.patient_id, "hola"),
            (c.professional_id, "buenas"),
            (c.patient_id, "gracias"),
        ] {
            store
                .append_chat_message(ChatDraft::new(c.id, sender, text).unwrap())
                .await
                .unwrap();
        }

        let messages = store.list_chat_messages(&c.id).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hola", "buenas", "gracias"]);
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));

        assert_eq!(store.mark_chat_read(&c.id, &c.professional_id).await.unwrap(), 2);
        assert_eq!(store.mark_chat_read(&c.id, &c.professional_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let n = Notification::payment_received(
            owner,
            ConsultationId::generate(),
            &ExternalTransactionId::for_payment("PAY1"),
            900,
        );
        assert!(store.insert_notification(&n).await.unwrap());
        assert!(!store.insert_notification(&n).await.unwrap());

        assert!(store
            .mark_notification_read(&UserId::generate(), &n.id)
            .await
            .unwrap()
            .is_none());
        assert!(store.mark_notification_read(&owner, &n.id).await.unwrap().unwrap().read);
        assert!(store
            .list_notifications(&owner, true, 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list_notifications(&owner, false, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivate_provider_account() {
        let store = MemoryStore::new();
        let professional = UserId::generate();
        assert!(!store.deactivate_provider_account(&professional).await.unwrap());

        let account =
            ProviderPaymentAccount::linked(professional, "token".into(), None, Some("1".into()), None);
        store.upsert_provider_account(&account).await.unwrap();
        assert!(store.deactivate_provider_account(&professional).await.unwrap());
        assert!(!store
            .get_provider_account(&professional)
            .await
            .unwrap()
            .unwrap()
            .active);
    }
}
