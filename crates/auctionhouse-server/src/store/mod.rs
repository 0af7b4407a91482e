//! The transactional relational store.
//!
//! Every function here either commits a complete, consistent state change or
//! leaves no trace; there is no function that performs two independent
//! writes outside of a transaction. Concurrent writers to the same auction
//! row are serialized by `SELECT ... FOR UPDATE` as the first statement of
//! any transaction that mutates it; an in-process per-auction-id lock
//! (`crate::auction::locks`) short-circuits same-process contention before
//! it reaches the database.

pub mod models;

use auctionhouse_eyre::eyre;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use sqlx::{
    postgres::PgPoolOptions,
    PgPool,
    Postgres,
    Transaction,
};

use crate::{
    error::DomainError,
    ids::{
        AuctionId,
        ChannelId,
        OrderId,
        ProductId,
        UserId,
    },
};

pub use models::{
    Auction,
    AuctionStatus,
    Bid,
    Channel,
    ChannelStatus,
    DeadlineKind,
    Message,
    Order,
    PaymentStatus,
    Product,
    ScheduledDeadline,
    User,
};

/// A handle to the persistent store. Cheap to clone; wraps a connection
/// pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| DomainError::Internal(eyre::Report::new(e)))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(eyre::Report::new(e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, DomainError> {
        self.pool.begin().await.map_err(DomainError::from)
    }

    // -- reads -----------------------------------------------------------

    pub async fn active_auction_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<Auction>, DomainError> {
        sqlx::query_as::<_, Auction>(
            "SELECT * FROM auctions WHERE channel_id = $1 AND status = 'active'",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DomainError::from)
    }

    pub async fn auction_by_id(&self, auction_id: AuctionId) -> Result<Auction, DomainError> {
        sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "auction" })
    }

    pub async fn channel_by_id(&self, channel_id: ChannelId) -> Result<Channel, DomainError> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "channel" })
    }

    pub async fn product_by_id(&self, product_id: ProductId) -> Result<Product, DomainError> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "product" })
    }

    pub async fn highest_bid(&self, auction_id: AuctionId) -> Result<Option<Bid>, DomainError> {
        sqlx::query_as::<_, Bid>(
            "SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC, placed_at ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DomainError::from)
    }

    pub async fn order_by_id(&self, order_id: OrderId) -> Result<Order, DomainError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "order" })
    }

    pub async fn order_by_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<Option<Order>, DomainError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)
    }

    pub async fn orders_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<Order>, DomainError> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE buyer_id = $1 OR seller_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DomainError::from)
    }

    pub async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: i64,
    ) -> Result<Vec<Message>, DomainError> {
        let mut rows = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE channel_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DomainError::from)?;
        rows.reverse();
        Ok(rows)
    }

    /// Due deadlines, ordered by `fire_at`; used by the scheduler's poll
    /// loop. Does not claim them.
    pub async fn due_deadlines(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledDeadline>, DomainError> {
        sqlx::query_as::<_, ScheduledDeadline>(
            "SELECT * FROM scheduled_deadlines WHERE fire_at <= $1 AND claimed_at IS NULL \
             ORDER BY fire_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DomainError::from)
    }

    // -- writes ------------------------------------------------------------

    pub async fn lock_auction_row<'a>(
        &self,
        tx: &mut Transaction<'a, Postgres>,
        auction_id: AuctionId,
    ) -> Result<Auction, DomainError> {
        sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE id = $1 FOR UPDATE")
            .bind(auction_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "auction" })
    }

    pub async fn insert_auction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        auction: &Auction,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO auctions (id, channel_id, seller_id, product_id, starting_price, \
             buyout_price, current_bid, highest_bidder_id, duration_seconds, started_at, \
             ends_at, extended_count, status) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(auction.id)
        .bind(auction.channel_id)
        .bind(auction.seller_id)
        .bind(auction.product_id)
        .bind(auction.starting_price)
        .bind(auction.buyout_price)
        .bind(auction.current_bid)
        .bind(auction.highest_bidder_id)
        .bind(auction.duration_seconds)
        .bind(auction.started_at)
        .bind(auction.ends_at)
        .bind(auction.extended_count)
        .bind(auction.status)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn insert_bid(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        bid: &Bid,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO bids (id, auction_id, bidder_id, amount, placed_at) \
             VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(bid.id)
        .bind(bid.auction_id)
        .bind(bid.bidder_id)
        .bind(bid.amount)
        .bind(bid.placed_at)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn update_auction_on_bid(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        auction_id: AuctionId,
        current_bid: Decimal,
        highest_bidder_id: UserId,
        ends_at: DateTime<Utc>,
        extended_count: i32,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE auctions SET current_bid = $2, highest_bidder_id = $3, ends_at = $4, \
             extended_count = $5 WHERE id = $1",
        )
        .bind(auction_id)
        .bind(current_bid)
        .bind(highest_bidder_id)
        .bind(ends_at)
        .bind(extended_count)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn set_auction_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        auction_id: AuctionId,
        status: AuctionStatus,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE auctions SET status = $2 WHERE id = $1")
            .bind(auction_id)
            .bind(status)
            .execute(&mut **tx)
            .await
            .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn insert_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO orders (id, auction_id, seller_id, buyer_id, final_price, \
             platform_fee, seller_payout, payment_status, payment_deadline, shipped_at, \
             created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(order.id)
        .bind(order.auction_id)
        .bind(order.seller_id)
        .bind(order.buyer_id)
        .bind(order.final_price)
        .bind(order.platform_fee)
        .bind(order.seller_payout)
        .bind(order.payment_status)
        .bind(order.payment_deadline)
        .bind(order.shipped_at)
        .bind(order.created_at)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn set_order_payment_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE orders SET payment_status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(status)
            .execute(&mut **tx)
            .await
            .map_err(DomainError::from)?;
        Ok(())
    }

    pub async fn mark_order_shipped(
        &self,
        order_id: OrderId,
        seller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Order, DomainError> {
        let mut tx = self.begin().await?;
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DomainError::from)?
            .ok_or(DomainError::NotFound { entity: "order" })?;
        if order.seller_id != seller_id {
            return Err(DomainError::forbidden("mark_shipped"));
        }
        if order.payment_status != PaymentStatus::Paid {
            return Err(DomainError::conflict("order not paid"));
        }
        sqlx::query("UPDATE orders SET shipped_at = $2 WHERE id = $1")
            .bind(order_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(DomainError::from)?;
        tx.commit().await.map_err(DomainError::from)?;
        Ok(Order {
            shipped_at: Some(now),
            ..order
        })
    }

    pub async fn insert_deadline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: DeadlineKind,
        target_id: uuid::Uuid,
        fire_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO scheduled_deadlines (kind, target_id, fire_at) VALUES ($1, $2, $3)",
        )
        .bind(kind)
        .bind(target_id)
        .bind(fire_at)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    /// Deletes any unclaimed deadline row matching `(kind, target_id)`, used
    /// to cancel a pending `auction_close` when a buyout or early close
    /// supersedes it.
    pub async fn cancel_deadline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: DeadlineKind,
        target_id: uuid::Uuid,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "DELETE FROM scheduled_deadlines WHERE kind = $1 AND target_id = $2 \
             AND claimed_at IS NULL",
        )
        .bind(kind)
        .bind(target_id)
        .execute(&mut **tx)
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }

    /// Conditionally claims a deadline row: the update must affect exactly
    /// one row or another worker already claimed it.
    pub async fn claim_deadline(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE scheduled_deadlines SET claimed_at = $2 WHERE id = $1 AND claimed_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DomainError::from)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_deadline(&self, id: i64) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM scheduled_deadlines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DomainError::from)?;
        Ok(())
    }

    /// Clears a claim and bumps the retry count after a handler failure,
    /// rescheduling for `retry_at`. Moves to the dead-letter state (retained
    /// but never reclaimed) once `retry_count` would exceed `max_retries`.
    pub async fn release_deadline_for_retry(
        &self,
        id: i64,
        retry_at: DateTime<Utc>,
        error: &str,
        max_retries: i32,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE scheduled_deadlines SET claimed_at = NULL, fire_at = $2, \
             retry_count = retry_count + 1, last_error = $3 \
             WHERE id = $1 AND retry_count < $4",
        )
        .bind(id)
        .bind(retry_at)
        .bind(error)
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .map_err(DomainError::from)?;
        Ok(result.rows_affected() == 1)
    }

    /// Clears stale claims older than the lease so another worker can
    /// retry them; used by the scheduler's lease watchdog.
    pub async fn clear_stale_claims(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "UPDATE scheduled_deadlines SET claimed_at = NULL \
             WHERE claimed_at IS NOT NULL AND claimed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(DomainError::from)?;
        Ok(result.rows_affected())
    }

    pub async fn insert_message(
        &self,
        channel_id: ChannelId,
        author_id: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Message, DomainError> {
        sqlx::query_as::<_, Message>(
            "INSERT INTO messages (channel_id, author_id, content, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(channel_id)
        .bind(author_id)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DomainError::from)
    }

    pub async fn set_channel_highlight(
        &self,
        channel_id: ChannelId,
        product_id: Option<ProductId>,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE channels SET highlighted_product_id = $2 WHERE id = $1")
            .bind(channel_id)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(DomainError::from)?;
        Ok(())
    }
}

/// Transient, `transient_serialization_failure` signals that the caller
/// should retry: Postgres error codes `40001` (serialization_failure) and
/// `40P01` (deadlock_detected).
#[must_use]
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(db_err.code().as_deref(), Some("40001" | "40P01")),
        _ => false,
    }
}
