//! PostgreSQL storage implementation.
//!
//! Idempotency and one-account-per-professional are enforced by the schema
//! (`payment_records.transaction_id` and `provider_payment_accounts.professional_id`
//! are primary keys, `transfer_records.transaction_id` is unique), not by
//! application-level checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use ulid::Generator;
use uuid::Uuid;

use teleconsult_core::{
    ChatDraft, ChatMessage, Consultation, ConsultationId, ConsultationStatus,
    ExternalTransactionId, MessageId, Notification, NotificationId, NotificationKind,
    PaymentRecord, PaymentStatus, PayoutProfile, ProviderPaymentAccount, RecipientType,
    TransferId, TransferRecord, TransferStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

const CONSULTATION_COLUMNS: &str = "id, patient_id, professional_id, fee_cents, status, \
     payment_status, created_at, updated_at, ended_at, duration_minutes";

const TRANSFER_COLUMNS: &str = "id, transaction_id, consultation_id, professional_id, \
     amount_cents, recipient_alias, status, completed_at, error_message, created_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, payload, read, created_at";

/// PostgreSQL-backed storage.
pub struct PgStore {
    pool: PgPool,
    message_ids: Mutex<Generator>,
}

impl PgStore {
    /// Connect to the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Does not run migrations.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            message_ids: Mutex::new(Generator::new()),
        }
    }

    /// Apply the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn unknown(column: &str, value: &str) -> StoreError {
    StoreError::Serialization(format!("unknown {column}: {value}"))
}

#[derive(sqlx::FromRow)]
struct ConsultationRow {
    id: Uuid,
    patient_id: Uuid,
    professional_id: Uuid,
    fee_cents: i64,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
}

impl TryFrom<ConsultationRow> for Consultation {
    type Error = StoreError;

    fn try_from(row: ConsultationRow) -> Result<Self> {
        Ok(Self {
            id: ConsultationId::from_uuid(row.id),
            patient_id: UserId::from_uuid(row.patient_id),
            professional_id: UserId::from_uuid(row.professional_id),
            fee_cents: row.fee_cents,
            status: ConsultationStatus::parse(&row.status)
                .ok_or_else(|| unknown("consultation status", &row.status))?,
            payment_status: PaymentStatus::parse(&row.payment_status)
                .ok_or_else(|| unknown("payment status", &row.payment_status))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ended_at: row.ended_at,
            duration_minutes: row.duration_minutes,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProviderAccountRow {
    professional_id: Uuid,
    access_token: String,
    refresh_token: Option<String>,
    external_account_id: Option<String>,
    public_key: Option<String>,
    connected_at: DateTime<Utc>,
    active: bool,
}

impl From<ProviderAccountRow> for ProviderPaymentAccount {
    fn from(row: ProviderAccountRow) -> Self {
        Self {
            professional_id: UserId::from_uuid(row.professional_id),
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            external_account_id: row.external_account_id,
            public_key: row.public_key,
            connected_at: row.connected_at,
            active: row.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PayoutProfileRow {
    professional_id: Uuid,
    alias: Option<String>,
    alias_verified: bool,
    updated_at: DateTime<Utc>,
}

impl From<PayoutProfileRow> for PayoutProfile {
    fn from(row: PayoutProfileRow) -> Self {
        Self {
            professional_id: UserId::from_uuid(row.professional_id),
            alias: row.alias,
            alias_verified: row.alias_verified,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    transaction_id: String,
    consultation_id: Uuid,
    total_amount_cents: i64,
    platform_fee_cents: i64,
    provider_fee_cents: i64,
    status: String,
    payment_method: Option<String>,
    transfers_completed: bool,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction_id: ExternalTransactionId::from_stored(row.transaction_id),
            consultation_id: ConsultationId::from_uuid(row.consultation_id),
            total_amount_cents: row.total_amount_cents,
            platform_fee_cents: row.platform_fee_cents,
            provider_fee_cents: row.provider_fee_cents,
            status: row.status,
            payment_method: row.payment_method,
            transfers_completed: row.transfers_completed,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: String,
    transaction_id: String,
    consultation_id: Uuid,
    professional_id: Uuid,
    amount_cents: i64,
    recipient_alias: Option<String>,
    status: String,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransferRow> for TransferRecord {
    type Error = StoreError;

    fn try_from(row: TransferRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .parse::<TransferId>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            transaction_id: ExternalTransactionId::from_stored(row.transaction_id),
            consultation_id: ConsultationId::from_uuid(row.consultation_id),
            professional_id: UserId::from_uuid(row.professional_id),
            amount_cents: row.amount_cents,
            recipient_alias: row.recipient_alias,
            recipient_type: RecipientType::Alias,
            status: TransferStatus::parse(&row.status)
                .ok_or_else(|| unknown("transfer status", &row.status))?,
            completed_at: row.completed_at,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    message: String,
    payload: serde_json::Value,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Self {
            id: NotificationId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            kind: NotificationKind::parse(&row.kind)
                .ok_or_else(|| unknown("notification kind", &row.kind))?,
            title: row.title,
            message: row.message,
            payload: row.payload,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: String,
    consultation_id: Uuid,
    sender_id: Uuid,
    text: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: ChatRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .parse::<MessageId>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            consultation_id: ConsultationId::from_uuid(row.consultation_id),
            sender_id: UserId::from_uuid(row.sender_id),
            text: row.text,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Consultations
    // =========================================================================

    async fn insert_consultation(&self, c: &Consultation) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO consultations
                (id, patient_id, professional_id, fee_cents, status, payment_status,
                 created_at, updated_at, ended_at, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(c.id.as_uuid())
        .bind(c.patient_id.as_uuid())
        .bind(c.professional_id.as_uuid())
        .bind(c.fee_cents)
        .bind(c.status.as_str())
        .bind(c.payment_status.as_str())
        .bind(c.created_at)
        .bind(c.updated_at)
        .bind(c.ended_at)
        .bind(c.duration_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_consultation(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        let row: Option<ConsultationRow> = sqlx::query_as(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Consultation::try_from).transpose()
    }

    async fn update_consultation(&self, c: &Consultation) -> Result<Consultation> {
        let row: Option<ConsultationRow> = sqlx::query_as(&format!(
            r"
            UPDATE consultations
            SET status = CASE
                    WHEN payment_status = 'paid'
                        AND $2 NOT IN ('paid', 'doctor_ready', 'completed', 'finished', 'reviewed')
                        THEN 'paid'
                    ELSE $2
                END,
                payment_status = CASE WHEN payment_status = 'paid' THEN 'paid' ELSE $3 END,
                updated_at = $4, ended_at = $5,
                duration_minutes = $6
            WHERE id = $1
            RETURNING {CONSULTATION_COLUMNS}
            "
        ))
        .bind(c.id.as_uuid())
        .bind(c.status.as_str())
        .bind(c.payment_status.as_str())
        .bind(c.updated_at)
        .bind(c.ended_at)
        .bind(c.duration_minutes)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn mark_consultation_paid(&self, id: &ConsultationId) -> Result<Option<Consultation>> {
        // Conditional on payment_status so concurrent confirmations change the row once.
        let row: Option<ConsultationRow> = sqlx::query_as(&format!(
            r"
            UPDATE consultations
            SET payment_status = 'paid',
                status = CASE
                    WHEN status IN ('paid', 'doctor_ready', 'completed', 'finished', 'reviewed')
                        THEN status
                    ELSE 'paid'
                END,
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'paid'
            RETURNING {CONSULTATION_COLUMNS}
            "
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None if self.get_consultation(id).await?.is_some() => Ok(None),
            None => Err(StoreError::NotFound),
        }
    }

    async fn find_awaiting_payment(&self, patient_id: &UserId) -> Result<Vec<Consultation>> {
        let rows: Vec<ConsultationRow> = sqlx::query_as(&format!(
            r"
            SELECT {CONSULTATION_COLUMNS} FROM consultations
            WHERE patient_id = $1 AND status = 'accepted' AND payment_status = 'pending'
            ORDER BY created_at DESC
            "
        ))
        .bind(patient_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_consultations_for(&self, user_id: &UserId) -> Result<Vec<Consultation>> {
        let rows: Vec<ConsultationRow> = sqlx::query_as(&format!(
            r"
            SELECT {CONSULTATION_COLUMNS} FROM consultations
            WHERE patient_id = $1 OR professional_id = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    // =========================================================================
    // Provider accounts and payout profiles
    // =========================================================================

    async fn upsert_provider_account(&self, a: &ProviderPaymentAccount) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO provider_payment_accounts
                (professional_id, access_token, refresh_token, external_account_id,
                 public_key, connected_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (professional_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                external_account_id = EXCLUDED.external_account_id,
                public_key = EXCLUDED.public_key,
                connected_at = EXCLUDED.connected_at,
                active = EXCLUDED.active
            ",
        )
        .bind(a.professional_id.as_uuid())
        .bind(&a.access_token)
        .bind(&a.refresh_token)
        .bind(&a.external_account_id)
        .bind(&a.public_key)
        .bind(a.connected_at)
        .bind(a.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_provider_account(
        &self,
        professional_id: &UserId,
    ) -> Result<Option<ProviderPaymentAccount>> {
        let row: Option<ProviderAccountRow> = sqlx::query_as(
            r"
            SELECT professional_id, access_token, refresh_token, external_account_id,
                   public_key, connected_at, active
            FROM provider_payment_accounts WHERE professional_id = $1
            ",
        )
        .bind(professional_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn deactivate_provider_account(&self, professional_id: &UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE provider_payment_accounts SET active = FALSE \
             WHERE professional_id = $1 AND active",
        )
        .bind(professional_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_payout_profile(&self, p: &PayoutProfile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO payout_profiles (professional_id, alias, alias_verified, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (professional_id) DO UPDATE SET
                alias = EXCLUDED.alias,
                alias_verified = EXCLUDED.alias_verified,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(p.professional_id.as_uuid())
        .bind(&p.alias)
        .bind(p.alias_verified)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_payout_profile(&self, professional_id: &UserId) -> Result<Option<PayoutProfile>> {
        let row: Option<PayoutProfileRow> = sqlx::query_as(
            "SELECT professional_id, alias, alias_verified, updated_at \
             FROM payout_profiles WHERE professional_id = $1",
        )
        .bind(professional_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    // =========================================================================
    // Payment ledger
    // =========================================================================

    async fn insert_payment(&self, p: &PaymentRecord) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO payment_records
                (transaction_id, consultation_id, total_amount_cents, platform_fee_cents,
                 provider_fee_cents, status, payment_method, transfers_completed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            ",
        )
        .bind(p.transaction_id.as_str())
        .bind(p.consultation_id.as_uuid())
        .bind(p.total_amount_cents)
        .bind(p.platform_fee_cents)
        .bind(p.provider_fee_cents)
        .bind(&p.status)
        .bind(&p.payment_method)
        .bind(p.transfers_completed)
        .bind(p.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateTransaction {
                transaction_id: p.transaction_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<PaymentRecord>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r"
            SELECT transaction_id, consultation_id, total_amount_cents, platform_fee_cents,
                   provider_fee_cents, status, payment_method, transfers_completed, created_at
            FROM payment_records WHERE transaction_id = $1
            ",
        )
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_payments_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<PaymentRecord>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r"
            SELECT transaction_id, consultation_id, total_amount_cents, platform_fee_cents,
                   provider_fee_cents, status, payment_method, transfers_completed, created_at
            FROM payment_records WHERE consultation_id = $1
            ORDER BY created_at
            ",
        )
        .bind(consultation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_transfers_completed(&self, transaction_id: &ExternalTransactionId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_records SET transfers_completed = TRUE WHERE transaction_id = $1",
        )
        .bind(transaction_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_transfer(&self, t: &TransferRecord) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO transfer_records
                (id, transaction_id, consultation_id, professional_id, amount_cents,
                 recipient_alias, recipient_type, status, completed_at, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (transaction_id) DO NOTHING
            ",
        )
        .bind(t.id.to_string())
        .bind(t.transaction_id.as_str())
        .bind(t.consultation_id.as_uuid())
        .bind(t.professional_id.as_uuid())
        .bind(t.amount_cents)
        .bind(&t.recipient_alias)
        .bind(t.recipient_type.as_str())
        .bind(t.status.as_str())
        .bind(t.completed_at)
        .bind(&t.error_message)
        .bind(t.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_transfer_for_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<TransferRecord>> {
        let row: Option<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfer_records WHERE transaction_id = $1"
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TransferRecord::try_from).transpose()
    }

    async fn list_transfers_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<TransferRecord>> {
        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            r"
            SELECT {TRANSFER_COLUMNS} FROM transfer_records
            WHERE consultation_id = $1
            ORDER BY id
            "
        ))
        .bind(consultation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    async fn insert_notification(&self, n: &Notification) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO notifications (id, user_id, kind, title, message, payload, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(n.id.as_uuid())
        .bind(n.user_id.as_uuid())
        .bind(n.kind.as_str())
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.payload)
        .bind(n.read)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            r"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC
            LIMIT $3
            "
        ))
        .bind(user_id.as_uuid())
        .bind(unread_only)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        id: &NotificationId,
    ) -> Result<Option<Notification>> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            r"
            UPDATE notifications SET read = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Notification::try_from).transpose()
    }

    // =========================================================================
    // Chat
    // =========================================================================

    async fn append_chat_message(&self, draft: ChatDraft) -> Result<ChatMessage> {
        // Hold the generator across the insert so ids commit in the order issued.
        let mut ids = self.message_ids.lock().await;
        let ulid = ids
            .generate()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let message = ChatMessage::stamped(draft, MessageId::from_ulid(ulid), Utc::now());

        sqlx::query(
            r"
            INSERT INTO chat_messages (id, consultation_id, sender_id, text, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(message.id.to_string())
        .bind(message.consultation_id.as_uuid())
        .bind(message.sender_id.as_uuid())
        .bind(&message.text)
        .bind(message.read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        drop(ids);
        Ok(message)
    }

    async fn list_chat_messages(&self, consultation_id: &ConsultationId) -> Result<Vec<ChatMessage>> {
        let rows: Vec<ChatRow> = sqlx::query_as(
            r"
            SELECT id, consultation_id, sender_id, text, read, created_at
            FROM chat_messages WHERE consultation_id = $1
            ORDER BY id
            ",
        )
        .bind(consultation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn mark_chat_read(
        &self,
        consultation_id: &ConsultationId,
        reader: &UserId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE chat_messages SET read = TRUE \
             WHERE consultation_id = $1 AND sender_id <> $2 AND NOT read",
        )
        .bind(consultation_id.as_uuid())
        .bind(reader.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
