//! Realtime subscriptions over websockets.
//!
//! `GET /v1/realtime?channel=notifications|pending_payment|chat[&consultationId=]`
//!
//! Each socket owns exactly one feed subscription; closing the socket drops it.
//! Frames are JSON objects tagged by `type`:
//!
//! - `change`: a committed row change (`notifications`, `chat`; chat also carries
//!   consultation updates such as read receipts and status changes)
//! - `pending_payment`: the current alert, sent first and then on every change
//! - `resync`: events were dropped; refetch over REST
//! - `error`: the alert could not be evaluated
//!
//! The source is driven by its own task and relayed over a channel, so the
//! socket loop only ever waits on cancel-safe receives.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use teleconsult_core::{ConsultError, UserId};
use teleconsult_store::{ChangeEvent, Delivery, Store, Subscription, Table, Topic};

use super::consultations::PendingPayment;
use super::participant_consultation;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Subscribable channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The caller's notifications.
    Notifications,
    /// The caller's derived pending-payment alert.
    PendingPayment,
    /// One consultation's chat.
    Chat,
}

/// Realtime query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeQuery {
    /// Channel to subscribe to.
    pub channel: Channel,
    /// Required for `chat`.
    #[serde(default)]
    pub consultation_id: Option<String>,
}

/// A frame sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    /// A committed change.
    Change {
        /// The change.
        event: ChangeEvent,
    },
    /// Current pending-payment alert.
    PendingPayment(PendingPayment),
    /// Events were dropped.
    Resync {
        /// How many.
        skipped: u64,
    },
    /// Evaluation failed.
    Error {
        /// Description.
        message: String,
    },
}

/// Pending-payment alert derived from consultation changes.
///
/// Yields the initial value, then a new value whenever it differs.
pub struct PendingPaymentWatch {
    subscription: Subscription,
    patient_id: UserId,
    last: Option<PendingPayment>,
}

impl PendingPaymentWatch {
    /// Start watching. Subscribes before the first evaluation so no change is missed.
    #[must_use]
    pub fn new(state: &AppState, patient_id: UserId) -> Self {
        let subscription = state.feed.subscribe(Topic::User(patient_id), |event| {
            event.table == Table::Consultations
        });
        Self {
            subscription,
            patient_id,
            last: None,
        }
    }

    /// Next alert value. `None` once the feed is gone.
    ///
    /// Not cancel-safe: a change consumed before the future is dropped is lost
    /// along with its re-evaluation.
    pub async fn next(&mut self, store: &dyn Store) -> Option<Result<PendingPayment, ApiError>> {
        if self.last.is_none() {
            return Some(self.evaluate(store).await);
        }

        loop {
            self.subscription.next().await?;
            match PendingPayment::for_patient(store, &self.patient_id).await {
                Ok(current) if self.last.as_ref() == Some(&current) => {}
                Ok(current) => {
                    self.last = Some(current.clone());
                    return Some(Ok(current));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn evaluate(&mut self, store: &dyn Store) -> Result<PendingPayment, ApiError> {
        let current = PendingPayment::for_patient(store, &self.patient_id).await?;
        self.last = Some(current.clone());
        Ok(current)
    }
}

enum Source {
    Changes(Subscription),
    PendingPayment(PendingPaymentWatch),
}

impl Source {
    async fn next(&mut self, store: &dyn Store) -> Option<RealtimeMessage> {
        match self {
            Self::Changes(subscription) => match subscription.next().await? {
                Delivery::Change(event) => Some(RealtimeMessage::Change {
                    event: event.as_ref().clone(),
                }),
                Delivery::Lagged(skipped) => Some(RealtimeMessage::Resync { skipped }),
            },
            Self::PendingPayment(watch) => match watch.next(store).await? {
                Ok(alert) => Some(RealtimeMessage::PendingPayment(alert)),
                Err(e) => {
                    tracing::warn!(error = %e, "Pending-payment evaluation failed");
                    Some(RealtimeMessage::Error {
                        message: "pending payment unavailable".into(),
                    })
                }
            },
        }
    }
}

/// Frames buffered between the source task and the socket.
const RELAY_CAPACITY: usize = 16;

/// Runs a [`Source`] to completion on its own task. Dropping it stops the task
/// and releases the subscription.
struct Relay {
    rx: mpsc::Receiver<RealtimeMessage>,
    task: JoinHandle<()>,
}

impl Relay {
    fn spawn(mut source: Source, store: Arc<dyn Store>) -> Self {
        let (tx, rx) = mpsc::channel(RELAY_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(message) = source.next(store.as_ref()).await {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, task }
    }

    /// Next frame. `None` once the source has ended.
    async fn recv(&mut self) -> Option<RealtimeMessage> {
        self.rx.recv().await
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Upgrade to a websocket bound to one channel.
pub async fn realtime(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<RealtimeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let source = match query.channel {
        Channel::Notifications => Source::Changes(
            state
                .feed
                .subscribe(Topic::User(auth.user_id), |event| {
                    event.table == Table::Notifications
                }),
        ),
        Channel::PendingPayment => {
            Source::PendingPayment(PendingPaymentWatch::new(&state, auth.user_id))
        }
        Channel::Chat => {
            let consultation_id = query.consultation_id.as_deref().ok_or_else(|| {
                ConsultError::Validation("consultationId is required for chat".into())
            })?;
            let consultation =
                participant_consultation(&state, consultation_id, &auth.user_id).await?;
            Source::Changes(
                state
                    .feed
                    .subscribe(Topic::Consultation(consultation.id), |event| {
                        matches!(event.table, Table::ChatMessages | Table::Consultations)
                    }),
            )
        }
    };

    tracing::debug!(user_id = %auth.user_id, channel = ?query.channel, "Realtime subscription opened");

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, state, source, auth.user_id)))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<AppState>, source: Source, user_id: UserId) {
    let mut relay = Relay::spawn(source, state.store.clone());

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
            outgoing = relay.recv() => {
                let Some(message) = outgoing else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode realtime message");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(user_id = %user_id, "Realtime subscription closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use teleconsult_core::Consultation;
    use teleconsult_store::{ChangeFeed, MemoryStore, Observed};

    use crate::config::ServiceConfig;

    fn state() -> AppState {
        let feed = ChangeFeed::new(64);
        let store = Observed::new(MemoryStore::new(), feed.clone());
        AppState::new(Arc::new(store), feed, ServiceConfig::default())
    }

    async fn next_alert(watch: &mut PendingPaymentWatch, state: &AppState) -> PendingPayment {
        tokio::time::timeout(Duration::from_secs(1), watch.next(state.store.as_ref()))
            .await
            .expect("alert in time")
            .expect("feed open")
            .expect("evaluated")
    }

    #[tokio::test]
    async fn pending_payment_appears_and_disappears() {
        let state = state();
        let patient = UserId::generate();
        let mut watch = PendingPaymentWatch::new(&state, patient);

        assert!(!next_alert(&mut watch, &state).await.pending);

        let mut consultation = Consultation::request(patient, UserId::generate(), 50_000).unwrap();
        state.store.insert_consultation(&consultation).await.unwrap();
        consultation.accept().unwrap();
        state.store.update_consultation(&consultation).await.unwrap();

        let alert = next_alert(&mut watch, &state).await;
        assert!(alert.pending);
        assert_eq!(alert.consultations[0].id, consultation.id);

        state
            .store
            .mark_consultation_paid(&consultation.id)
            .await
            .unwrap();
        assert!(!next_alert(&mut watch, &state).await.pending);
    }

    #[tokio::test]
    async fn relay_keeps_changes_across_abandoned_receives() {
        let state = state();
        let patient = UserId::generate();
        let watch = PendingPaymentWatch::new(&state, patient);
        let mut relay = Relay::spawn(Source::PendingPayment(watch), state.store.clone());

        let first = tokio::time::timeout(Duration::from_secs(1), relay.recv())
            .await
            .expect("initial alert in time")
            .expect("relay open");
        assert!(matches!(first, RealtimeMessage::PendingPayment(ref p) if !p.pending));

        let mut consultation = Consultation::request(patient, UserId::generate(), 50_000).unwrap();
        state.store.insert_consultation(&consultation).await.unwrap();
        consultation.accept().unwrap();

        // Receives abandoned mid-wait, as when the socket branch wins a select.
        for _ in 0..5 {
            let _ = tokio::time::timeout(Duration::ZERO, relay.recv()).await;
            tokio::task::yield_now().await;
        }
        state.store.update_consultation(&consultation).await.unwrap();
        let mut early = None;
        for _ in 0..5 {
            if let Ok(Some(message)) = tokio::time::timeout(Duration::ZERO, relay.recv()).await {
                early = Some(message);
                break;
            }
            tokio::task::yield_now().await;
        }

        let alert = match early {
            Some(message) => message,
            None => tokio::time::timeout(Duration::from_secs(1), relay.recv())
                .await
                .expect("alert in time")
                .expect("relay open"),
        };
        match alert {
            RealtimeMessage::PendingPayment(alert) => {
                assert!(alert.pending);
                assert_eq!(alert.consultations[0].id, consultation.id);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_the_relay_releases_the_subscription() {
        let state = state();
        let subscription = state
            .feed
            .subscribe(Topic::User(UserId::generate()), |_| true);
        let relay = Relay::spawn(Source::Changes(subscription), state.store.clone());
        assert_eq!(state.feed.subscriber_count(), 1);

        drop(relay);

        tokio::time::timeout(Duration::from_secs(1), async {
            while state.feed.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription released");
    }

    #[test]
    fn frames_are_tagged() {
        let frame = serde_json::to_value(RealtimeMessage::Resync { skipped: 3 }).unwrap();
        assert_eq!(frame["type"], "resync");
        assert_eq!(frame["skipped"], 3);

        let frame = serde_json::to_value(RealtimeMessage::PendingPayment(PendingPayment {
            pending: false,
            consultations: vec![],
        }))
        .unwrap();
        assert_eq!(frame["type"], "pending_payment");
        assert_eq!(frame["pending"], false);
    }
}
