//! In-process change feed.
//!
//! Every committed write is published once as a [`ChangeEvent`]. Subscribers pick
//! a [`Topic`] (a user or a consultation) and an optional predicate; dropping the
//! [`Subscription`] unsubscribes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;

use teleconsult_core::{
    ChatMessage, Consultation, ConsultationId, Notification, PaymentRecord, PayoutProfile,
    TransferRecord, UserId,
};

use crate::schema::tables;

/// Table a change happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Table {
    /// Consultations.
    Consultations,
    /// Payout profiles.
    PayoutProfiles,
    /// Payment records.
    PaymentRecords,
    /// Transfer records.
    TransferRecords,
    /// Notifications.
    Notifications,
    /// Chat messages.
    ChatMessages,
}

impl Table {
    /// Get the table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Consultations => tables::CONSULTATIONS,
            Self::PayoutProfiles => tables::PAYOUT_PROFILES,
            Self::PaymentRecords => tables::PAYMENT_RECORDS,
            Self::TransferRecords => tables::TRANSFER_RECORDS,
            Self::Notifications => tables::NOTIFICATIONS,
            Self::ChatMessages => tables::CHAT_MESSAGES,
        }
    }
}

impl From<Table> for &'static str {
    fn from(table: Table) -> Self {
        table.as_str()
    }
}

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// A row was created.
    Insert,
    /// A row was changed.
    Update,
}

/// The row after the write.
///
/// Provider accounts are never published; they carry OAuth tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    /// A consultation.
    Consultation(Consultation),
    /// A payout profile.
    PayoutProfile(PayoutProfile),
    /// A payment record.
    Payment(PaymentRecord),
    /// A transfer attempt.
    Transfer(TransferRecord),
    /// A notification.
    Notification(Notification),
    /// A chat message.
    ChatMessage(ChatMessage),
}

impl Row {
    /// The table the row lives in.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Consultation(_) => Table::Consultations,
            Self::PayoutProfile(_) => Table::PayoutProfiles,
            Self::Payment(_) => Table::PaymentRecords,
            Self::Transfer(_) => Table::TransferRecords,
            Self::Notification(_) => Table::Notifications,
            Self::ChatMessage(_) => Table::ChatMessages,
        }
    }
}

/// What a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Everything addressed to a user.
    User(UserId),
    /// Everything about a consultation.
    Consultation(ConsultationId),
}

/// One committed write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Table written.
    pub table: Table,
    /// Kind of write.
    pub op: ChangeOp,
    /// Row after the write.
    pub row: Row,
    /// Publication time.
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Build an event for a row.
    #[must_use]
    pub fn new(op: ChangeOp, row: Row) -> Self {
        Self {
            table: row.table(),
            op,
            row,
            at: Utc::now(),
        }
    }

    /// Topics this event is delivered on.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        match &self.row {
            Row::Consultation(c) => vec![
                Topic::User(c.patient_id),
                Topic::User(c.professional_id),
                Topic::Consultation(c.id),
            ],
            Row::PayoutProfile(p) => vec![Topic::User(p.professional_id)],
            Row::Payment(p) => vec![Topic::Consultation(p.consultation_id)],
            Row::Transfer(t) => vec![
                Topic::User(t.professional_id),
                Topic::Consultation(t.consultation_id),
            ],
            Row::Notification(n) => vec![Topic::User(n.user_id)],
            Row::ChatMessage(m) => vec![Topic::Consultation(m.consultation_id)],
        }
    }
}

/// What a subscription yields.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A matching change.
    Change(Arc<ChangeEvent>),
    /// The subscriber fell behind and this many events were dropped.
    ///
    /// Consumers should refetch current state through the REST endpoints.
    Lagged(u64),
}

type Predicate = Box<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

/// Broadcast hub for change events.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Arc<ChangeEvent>>,
}

impl ChangeFeed {
    /// Create a feed. Each subscriber buffers up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers it reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::trace!(table = event.table.as_str(), op = ?event.op, "Publishing change");
        // No receivers is not an error for a feed.
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// Subscribe to a topic, optionally narrowed by a predicate.
    #[must_use]
    pub fn subscribe<F>(&self, topic: Topic, predicate: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    {
        Subscription {
            rx: self.tx.subscribe(),
            topic,
            predicate: Box::new(predicate),
        }
    }

    /// Subscribe to every event on a topic.
    #[must_use]
    pub fn subscribe_all(&self, topic: Topic) -> Subscription {
        self.subscribe(topic, |_| true)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<Arc<ChangeEvent>>,
    topic: Topic,
    predicate: Predicate,
}

impl Subscription {
    /// The subscribed topic.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next matching delivery. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.topics().contains(&self.topic) && (self.predicate)(&event) {
                        return Some(Delivery::Change(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = ?self.topic, skipped, "Subscriber lagged");
                    return Some(Delivery::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream of deliveries.
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|delivery| (delivery, sub))
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
