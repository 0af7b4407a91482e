//! The auction state machine: bid acceptance, anti-snipe extension, buyout,
//! and deterministic order creation on close.

pub mod locks;

use std::future::Future;

use chrono::{
    DateTime,
    Duration,
    Utc,
};
use rand::Rng as _;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::{
    error::DomainError,
    event_bus::{
        EventBus,
        EventPayload,
    },
    ids::{
        AuctionId,
        BidId,
        ChannelId,
        OrderId,
        ProductId,
        UserId,
    },
    metrics as m,
    money,
    store::{
        Auction,
        AuctionStatus,
        Bid,
        ChannelStatus,
        DeadlineKind,
        Order,
        PaymentStatus,
        Store,
    },
};

/// Tunables governing bid acceptance and close, threaded in from the
/// service's top-level config rather than read from the environment
/// directly, so the engine stays testable with fixed values.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub min_increment: Decimal,
    pub snipe_window: Duration,
    pub extend_by: Duration,
    pub payment_window: Duration,
    pub platform_fee_bps: u32,
}

/// Outcome of a bid: whether the auction was extended and/or ended as a
/// side effect, used by the caller to decide which events to publish.
#[derive(Debug, Clone)]
pub struct BidOutcome {
    pub auction: Auction,
    pub extended: bool,
    pub ended: bool,
    pub order: Option<Order>,
}

#[derive(Clone)]
pub struct Engine {
    store: Store,
    bus: EventBus,
    locks: locks::LockRegistry,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(store: Store, bus: EventBus, config: EngineConfig) -> Self {
        Self {
            store,
            bus,
            locks: locks::LockRegistry::new(),
            config,
        }
    }

    pub const PERMITTED_DURATIONS: [i32; 4] = [60, 300, 600, 1800];

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Retries a transactional attempt up to three times when it fails with
    /// a transient store serialization conflict (`40001`/`40P01`), sleeping
    /// a short jittered backoff in between. Any other error, or exhaustion
    /// of attempts, is returned to the caller unchanged.
    async fn with_transient_retry<T, F, Fut>(&self, mut attempt: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        const MAX_ATTEMPTS: u32 = 3;
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) if tries < MAX_ATTEMPTS && error.is_transient_store_error() => {
                    metrics::counter!(m::STORE_TRANSIENT_RETRIES).increment(1);
                    let jitter_ms = rand::thread_rng().gen_range(10..50) * tries;
                    tokio::time::sleep(std::time::Duration::from_millis(u64::from(jitter_ms))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    #[instrument(skip(self), fields(channel = %channel_id, seller = %seller_id))]
    pub async fn start(
        &self,
        channel_id: ChannelId,
        seller_id: UserId,
        product_id: ProductId,
        duration_seconds: i32,
        buyout_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Auction, DomainError> {
        if !Self::PERMITTED_DURATIONS.contains(&duration_seconds) {
            return Err(DomainError::bad_request("duration_seconds not permitted"));
        }
        let channel = self.store.channel_by_id(channel_id).await?;
        if seller_id != channel.host_id {
            return Err(DomainError::forbidden("start_auction"));
        }
        if channel.status != ChannelStatus::Active {
            return Err(DomainError::conflict("channel is not active"));
        }
        let product = self.store.product_by_id(product_id).await?;
        if let Some(buyout) = buyout_price {
            if buyout <= product.price {
                return Err(DomainError::bad_request(
                    "buyout_price must exceed starting_price",
                ));
            }
        }
        if self
            .store
            .active_auction_for_channel(channel_id)
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("channel already has an active auction"));
        }

        let ends_at = now + Duration::seconds(i64::from(duration_seconds));
        let auction = Auction {
            id: AuctionId::new(),
            channel_id,
            seller_id,
            product_id,
            starting_price: product.price,
            buyout_price,
            current_bid: product.price,
            highest_bidder_id: None,
            duration_seconds,
            started_at: now,
            ends_at,
            extended_count: 0,
            status: AuctionStatus::Active,
        };

        let mut tx = self.store.begin().await?;
        self.store.insert_auction(&mut tx, &auction).await?;
        self.store
            .insert_deadline(&mut tx, DeadlineKind::AuctionClose, auction.id.0, ends_at)
            .await?;
        tx.commit().await.map_err(DomainError::from)?;
        metrics::counter!(m::AUCTIONS_STARTED).increment(1);

        self.bus
            .publish(
                channel_id,
                EventPayload::AuctionStarted {
                    auction_id: auction.id,
                },
                now,
            )
            .await;
        Ok(auction)
    }

    /// Accepts a bid, applying anti-snipe extension and buyout transition
    /// per the acceptance algorithm. Serialized per auction id by the
    /// in-process lock registry; the store's row lock is the cross-process
    /// backstop.
    #[instrument(skip(self), fields(auction = %auction_id, bidder = %bidder_id))]
    pub async fn bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::bad_request("amount must be positive"));
        }
        let outcome = self
            .with_transient_retry(|| self.try_bid(auction_id, bidder_id, amount, now))
            .await?;

        self.bus
            .publish(
                outcome.auction.channel_id,
                EventPayload::AuctionBidPlaced {
                    auction_id,
                    bidder_id,
                    amount,
                },
                now,
            )
            .await;
        if outcome.extended {
            metrics::counter!(m::AUCTIONS_EXTENDED).increment(1);
            self.bus
                .publish(
                    outcome.auction.channel_id,
                    EventPayload::AuctionExtended {
                        auction_id,
                        ends_at: outcome.auction.ends_at,
                        extended_count: outcome.auction.extended_count,
                    },
                    now,
                )
                .await;
        }
        if outcome.ended {
            self.publish_close(&outcome.auction, outcome.order.as_ref(), now)
                .await;
        }

        Ok(outcome)
    }

    /// The transactional core of [`Self::bid`], retried wholesale by the
    /// caller on a transient store conflict. Publishes nothing; the caller
    /// publishes once, after the attempt that finally commits.
    async fn try_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, DomainError> {
        let lock = self.locks.get(auction_id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let auction = self.store.lock_auction_row(&mut tx, auction_id).await?;

        if auction.status != AuctionStatus::Active {
            metrics::counter!(m::BIDS_REJECTED).increment(1);
            return Err(DomainError::conflict("auction is not active"));
        }
        if bidder_id == auction.seller_id {
            metrics::counter!(m::BIDS_REJECTED).increment(1);
            return Err(DomainError::forbidden("seller_cannot_bid"));
        }
        if now >= auction.ends_at {
            metrics::counter!(m::BIDS_REJECTED).increment(1);
            return Err(DomainError::conflict("auction_ended"));
        }

        let is_buyout = auction
            .buyout_price
            .is_some_and(|buyout| amount >= buyout);
        let min_next = auction.current_bid + self.config.min_increment;
        if amount < min_next && !is_buyout {
            metrics::counter!(m::BIDS_REJECTED).increment(1);
            return Err(DomainError::bad_request("amount below minimum increment"));
        }

        let bid = Bid {
            id: BidId::new(),
            auction_id,
            bidder_id,
            amount,
            placed_at: now,
        };
        self.store.insert_bid(&mut tx, &bid).await?;

        let mut ends_at = auction.ends_at;
        let mut extended_count = auction.extended_count;
        let mut extended = false;
        if !is_buyout && ends_at - now <= self.config.snipe_window {
            ends_at = now + self.config.extend_by;
            extended_count += 1;
            extended = true;
            self.store
                .cancel_deadline(&mut tx, DeadlineKind::AuctionClose, auction_id.0)
                .await?;
            self.store
                .insert_deadline(&mut tx, DeadlineKind::AuctionClose, auction_id.0, ends_at)
                .await?;
        }

        self.store
            .update_auction_on_bid(&mut tx, auction_id, amount, bidder_id, ends_at, extended_count)
            .await?;

        let mut updated = Auction {
            current_bid: amount,
            highest_bidder_id: Some(bidder_id),
            ends_at,
            extended_count,
            ..auction
        };

        let mut order = None;
        let mut ended = false;
        if is_buyout {
            self.store
                .cancel_deadline(&mut tx, DeadlineKind::AuctionClose, auction_id.0)
                .await?;
            let closed = self.close_locked(&mut tx, &mut updated, now).await?;
            order = closed;
            ended = true;
        }

        tx.commit().await.map_err(DomainError::from)?;
        metrics::counter!(m::BIDS_ACCEPTED).increment(1);

        Ok(BidOutcome {
            auction: updated,
            extended,
            ended,
            order,
        })
    }

    pub async fn buyout(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, DomainError> {
        let auction = self.store.auction_by_id(auction_id).await?;
        let buyout_price = auction
            .buyout_price
            .ok_or_else(|| DomainError::bad_request("auction has no buyout price"))?;
        self.bid(auction_id, bidder_id, buyout_price, now).await
    }

    /// Closes an auction early at the request of the seller or channel
    /// host. Idempotent: closing an already-terminal auction is a no-op.
    #[instrument(skip(self), fields(auction = %auction_id))]
    pub async fn close_early(
        &self,
        auction_id: AuctionId,
        caller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError> {
        let (auction, order, did_close) = self
            .with_transient_retry(|| self.try_close_early(auction_id, caller_id, now))
            .await?;

        if did_close {
            self.publish_close(&auction, order.as_ref(), now).await;
        }
        Ok(order)
    }

    async fn try_close_early(
        &self,
        auction_id: AuctionId,
        caller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(Auction, Option<Order>, bool), DomainError> {
        let lock = self.locks.get(auction_id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let mut auction = self.store.lock_auction_row(&mut tx, auction_id).await?;
        let channel = self.store.channel_by_id(auction.channel_id).await?;
        if caller_id != auction.seller_id && caller_id != channel.host_id {
            return Err(DomainError::forbidden("close_early"));
        }
        if auction.status != AuctionStatus::Active {
            tx.commit().await.map_err(DomainError::from)?;
            return Ok((auction, None, false));
        }

        self.store
            .cancel_deadline(&mut tx, DeadlineKind::AuctionClose, auction_id.0)
            .await?;
        let order = self.close_locked(&mut tx, &mut auction, now).await?;
        tx.commit().await.map_err(DomainError::from)?;

        Ok((auction, order, true))
    }

    /// Closes an auction whose scheduled deadline has fired. Called by the
    /// scheduler; idempotent for the same reason as [`Self::close_early`].
    #[instrument(skip(self), fields(auction = %auction_id))]
    pub async fn close_scheduled(
        &self,
        auction_id: AuctionId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError> {
        let (auction, order, did_close) = self
            .with_transient_retry(|| self.try_close_scheduled(auction_id, now))
            .await?;

        if did_close {
            self.publish_close(&auction, order.as_ref(), now).await;
        }
        Ok(order)
    }

    async fn try_close_scheduled(
        &self,
        auction_id: AuctionId,
        now: DateTime<Utc>,
    ) -> Result<(Auction, Option<Order>, bool), DomainError> {
        let lock = self.locks.get(auction_id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let mut auction = self.store.lock_auction_row(&mut tx, auction_id).await?;
        if auction.status != AuctionStatus::Active {
            tx.commit().await.map_err(DomainError::from)?;
            return Ok((auction, None, false));
        }
        let order = self.close_locked(&mut tx, &mut auction, now).await?;
        tx.commit().await.map_err(DomainError::from)?;

        Ok((auction, order, true))
    }

    pub async fn cancel(
        &self,
        auction_id: AuctionId,
        caller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let channel_id = self
            .with_transient_retry(|| self.try_cancel(auction_id, caller_id))
            .await?;
        metrics::counter!(m::AUCTIONS_CANCELLED).increment(1);

        self.bus
            .publish(channel_id, EventPayload::AuctionCancelled { auction_id }, now)
            .await;
        Ok(())
    }

    async fn try_cancel(&self, auction_id: AuctionId, caller_id: UserId) -> Result<ChannelId, DomainError> {
        let lock = self.locks.get(auction_id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let auction = self.store.lock_auction_row(&mut tx, auction_id).await?;
        if caller_id != auction.seller_id {
            return Err(DomainError::forbidden("cancel"));
        }
        if auction.status != AuctionStatus::Active {
            return Err(DomainError::conflict("auction is not active"));
        }
        if auction.highest_bidder_id.is_some() {
            return Err(DomainError::conflict("auction already has a bid"));
        }
        self.store
            .cancel_deadline(&mut tx, DeadlineKind::AuctionClose, auction_id.0)
            .await?;
        self.store
            .set_auction_status(&mut tx, auction_id, AuctionStatus::Cancelled)
            .await?;
        tx.commit().await.map_err(DomainError::from)?;

        Ok(auction.channel_id)
    }

    /// The shared close transition: marks the auction row `ended` and, if
    /// there is a winner, inserts the Order and schedules its payment
    /// deadline. Caller holds both the in-process lock and the row lock
    /// (`auction` was fetched with `FOR UPDATE` in the same transaction).
    async fn close_locked(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        auction: &mut Auction,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError> {
        let winner = auction.highest_bidder_id;
        let order = if let Some(winner_id) = winner {
            let (fee, payout) = money::split_payout(auction.current_bid, self.config.platform_fee_bps);
            let order = Order {
                id: OrderId::new(),
                auction_id: auction.id,
                seller_id: auction.seller_id,
                buyer_id: winner_id,
                final_price: auction.current_bid,
                platform_fee: fee,
                seller_payout: payout,
                payment_status: PaymentStatus::Pending,
                payment_deadline: Some(now + self.config.payment_window),
                shipped_at: None,
                created_at: now,
            };
            self.store.insert_order(tx, &order).await?;
            self.store
                .insert_deadline(
                    tx,
                    DeadlineKind::PaymentExpire,
                    order.id.0,
                    now + self.config.payment_window,
                )
                .await?;
            metrics::counter!(m::ORDERS_CREATED).increment(1);
            Some(order)
        } else {
            None
        };
        self.store
            .set_auction_status(tx, auction.id, AuctionStatus::Ended)
            .await?;
        auction.status = AuctionStatus::Ended;
        metrics::counter!(m::AUCTIONS_CLOSED).increment(1);
        Ok(order)
    }

    async fn publish_close(&self, auction: &Auction, order: Option<&Order>, now: DateTime<Utc>) {
        self.bus
            .publish(
                auction.channel_id,
                EventPayload::AuctionEnded {
                    auction_id: auction.id,
                    winner_id: auction.highest_bidder_id,
                    final_price: order.map(|o| o.final_price),
                },
                now,
            )
            .await;
        if let Some(order) = order {
            self.bus
                .publish(
                    auction.channel_id,
                    EventPayload::OrderCreated {
                        order_id: order.id,
                        auction_id: auction.id,
                    },
                    now,
                )
                .await;
        }
    }
}
