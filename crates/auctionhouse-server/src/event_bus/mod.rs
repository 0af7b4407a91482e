//! Per-channel event fan-out.
//!
//! One [`Topic`] per channel, backed by a [`tokio::sync::broadcast`]
//! channel. Subscribers never read the broadcast channel directly: each
//! subscription spawns a bridge task that forwards into a bounded
//! per-subscriber `mpsc`, so a slow reader's backpressure shows up as a
//! full queue on its own channel rather than lag on the shared broadcast
//! receiver (which would silently drop messages for every subscriber, not
//! just the slow one).

use std::{
    collections::HashMap,
    sync::Arc,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;
use tokio::sync::{
    broadcast,
    mpsc,
    RwLock,
};
use tokio_util::sync::CancellationToken;

use crate::{
    ids::{
        AuctionId,
        ChannelId,
        OrderId,
        ProductId,
        UserId,
    },
    metrics as m,
};

/// Default bound on a subscriber's outbound queue (`Q_max`); exceeding it
/// disconnects the subscriber rather than blocking the publisher.
pub const DEFAULT_QUEUE_MAX: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    AuctionStarted {
        auction_id: AuctionId,
    },
    AuctionBidPlaced {
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: rust_decimal::Decimal,
    },
    AuctionExtended {
        auction_id: AuctionId,
        ends_at: DateTime<Utc>,
        extended_count: i32,
    },
    AuctionEnded {
        auction_id: AuctionId,
        winner_id: Option<UserId>,
        final_price: Option<rust_decimal::Decimal>,
    },
    AuctionCancelled {
        auction_id: AuctionId,
    },
    ProductHighlighted {
        product_id: ProductId,
    },
    ProductUnhighlighted,
    ChatMessage {
        author_id: UserId,
        content: String,
    },
    ParticipantJoined {
        user_id: UserId,
    },
    ParticipantLeft {
        user_id: UserId,
    },
    OrderCreated {
        order_id: OrderId,
        auction_id: AuctionId,
    },
    OrderExpired {
        order_id: OrderId,
    },
}

/// The envelope delivered to subscribers, carrying a monotonic per-topic
/// sequence number.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub seq: u64,
    pub channel_id: ChannelId,
    pub at: DateTime<Utc>,
}

/// Why a subscriber connection was torn down by the bus rather than by the
/// client itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    SlowConsumer,
}

struct Topic {
    sender: broadcast::Sender<Event>,
    next_seq: u64,
}

impl Topic {
    fn new() -> Self {
        // capacity only bounds how far a lagging *broadcast* receiver may
        // fall behind before `Lagged`; actual backpressure is enforced on
        // each subscriber's own bridged mpsc queue.
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            next_seq: 0,
        }
    }
}

/// A subscriber's handle to receive events for one topic: a bounded
/// receiver fed by a bridge task, plus a signal fired if the bus itself
/// disconnects the subscriber (e.g. `slow_consumer`).
pub struct Subscription {
    pub events: mpsc::Receiver<Event>,
    pub disconnected: tokio::sync::oneshot::Receiver<DisconnectCause>,
    _bridge_cancel: tokio_util::sync::DropGuard,
}

/// The registry of per-channel topics. Cheap to clone; all state lives
/// behind an `Arc`.
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<RwLock<HashMap<ChannelId, Topic>>>,
    participants: Arc<RwLock<HashMap<ChannelId, std::collections::HashSet<UserId>>>>,
    queue_max: usize,
}

impl EventBus {
    #[must_use]
    pub fn new(queue_max: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            participants: Arc::new(RwLock::new(HashMap::new())),
            queue_max,
        }
    }

    /// Records `user_id` as an active participant of `channel_id`, used by
    /// message.send's "requires active participant" check. Owned by the
    /// bus because participant membership is driven by the same
    /// join/leave lifecycle as the subscription it tracks.
    pub async fn mark_joined(&self, channel_id: ChannelId, user_id: UserId) {
        self.participants
            .write()
            .await
            .entry(channel_id)
            .or_default()
            .insert(user_id);
    }

    pub async fn mark_left(&self, channel_id: ChannelId, user_id: UserId) {
        if let Some(set) = self.participants.write().await.get_mut(&channel_id) {
            set.remove(&user_id);
        }
    }

    pub async fn is_participant(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        self.participants
            .read()
            .await
            .get(&channel_id)
            .is_some_and(|set| set.contains(&user_id))
    }

    /// Publishes `payload` to `channel_id`'s topic, stamping it with the
    /// next sequence number. Called after the committing transaction
    /// succeeds; a publish failure (no subscribers, internal channel
    /// closed) is not an error the caller needs to handle — it is a no-op.
    pub async fn publish(&self, channel_id: ChannelId, payload: EventPayload, at: DateTime<Utc>) {
        let mut topics = self.topics.write().await;
        let topic = topics.entry(channel_id).or_insert_with(Topic::new);
        let seq = topic.next_seq;
        topic.next_seq += 1;
        let event = Event {
            payload,
            seq,
            channel_id,
            at,
        };
        // Err here only means there are currently zero subscribers; that is
        // expected and not logged.
        let _ = topic.sender.send(event);
    }

    /// Subscribes to `channel_id`'s topic, returning a bounded receiver fed
    /// by a bridge task that enforces `Q_max` independently of every other
    /// subscriber.
    pub async fn subscribe(&self, channel_id: ChannelId) -> Subscription {
        let mut broadcast_rx = {
            let mut topics = self.topics.write().await;
            let topic = topics.entry(channel_id).or_insert_with(Topic::new);
            topic.sender.subscribe()
        };

        let (tx, events) = mpsc::channel(self.queue_max);
        let (disconnect_tx, disconnected) = tokio::sync::oneshot::channel();
        let cancel = CancellationToken::new();
        let bridge_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = bridge_cancel.cancelled() => return,
                    received = broadcast_rx.recv() => {
                        match received {
                            Ok(event) => {
                                if tx.try_send(event).is_err() {
                                    metrics::counter!(m::SUBSCRIBER_SLOW_CONSUMER_DISCONNECTS).increment(1);
                                    let _ = disconnect_tx.send(DisconnectCause::SlowConsumer);
                                    return;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                metrics::counter!(m::SUBSCRIBER_SLOW_CONSUMER_DISCONNECTS).increment(1);
                                let _ = disconnect_tx.send(DisconnectCause::SlowConsumer);
                                return;
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        });

        Subscription {
            events,
            disconnected,
            _bridge_cancel: cancel.drop_guard(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_commit_order() {
        let bus = EventBus::new(DEFAULT_QUEUE_MAX);
        let channel = ChannelId(1);
        let mut sub_a = bus.subscribe(channel).await;
        let mut sub_b = bus.subscribe(channel).await;

        let now = Utc::now();
        bus.publish(channel, EventPayload::ProductHighlighted { product_id: ProductId(1) }, now)
            .await;
        bus.publish(channel, EventPayload::ProductUnhighlighted, now).await;

        let a1 = sub_a.events.recv().await.unwrap();
        let a2 = sub_a.events.recv().await.unwrap();
        let b1 = sub_b.events.recv().await.unwrap();
        let b2 = sub_b.events.recv().await.unwrap();

        assert_eq!((a1.seq, a2.seq), (0, 1));
        assert_eq!((b1.seq, b2.seq), (0, 1));
    }

    #[tokio::test]
    async fn slow_consumer_is_disconnected_without_affecting_others() {
        let bus = EventBus::new(2);
        let channel = ChannelId(1);
        let mut slow = bus.subscribe(channel).await;
        let mut fast = bus.subscribe(channel).await;

        let now = Utc::now();
        let mut drained = 0;
        for _ in 0..10 {
            bus.publish(channel, EventPayload::ProductUnhighlighted, now).await;
            // the fast subscriber drains as it goes and never backs up
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            while fast.events.try_recv().is_ok() {
                drained += 1;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(matches!(
            slow.disconnected.try_recv(),
            Ok(DisconnectCause::SlowConsumer)
        ));
        assert!(drained > 0);
    }
}
