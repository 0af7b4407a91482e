//! The durable deadline scheduler: a timer wheel backed by
//! `scheduled_deadlines` rows rather than in-memory timers, so that pending
//! auction closes and payment expirations survive a process restart.

use std::time::Duration as StdDuration;

use auctionhouse_eyre::eyre;
use chrono::{
    Duration,
    Utc,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    instrument,
    warn,
};

use crate::{
    auction::Engine,
    error::DomainError,
    ids::{
        AuctionId,
        OrderId,
    },
    metrics as m,
    store::{
        DeadlineKind,
        PaymentStatus,
        ScheduledDeadline,
        Store,
    },
};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub poll_interval: StdDuration,
    pub lease: Duration,
    pub max_retries: i32,
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_secs(1),
            lease: Duration::seconds(60),
            max_retries: 10,
            batch_size: 100,
        }
    }
}

pub struct Scheduler {
    store: Store,
    engine: Engine,
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Store, engine: Engine, config: SchedulerConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Runs the poll loop until `cancel` fires. Structurally the same shape
    /// as the rest of the service's background tasks: a plain
    /// `tokio::time::interval` loop selected against a cancellation token,
    /// reporting failure through `eyre::Result`.
    pub async fn run(self, cancel: CancellationToken) -> eyre::Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(error) = self.clear_stale_claims().await {
                        warn!(%error, "failed to clear stale scheduler claims");
                    }
                    if let Err(error) = self.poll_once().await {
                        warn!(%error, "scheduler poll failed");
                    }
                }
            }
        }
    }

    async fn clear_stale_claims(&self) -> Result<(), DomainError> {
        let cutoff = Utc::now() - self.config.lease;
        let cleared = self.store.clear_stale_claims(cutoff).await?;
        if cleared > 0 {
            warn!(count = cleared, "reclaimed stale scheduler leases");
        }
        Ok(())
    }

    async fn poll_once(&self) -> Result<(), DomainError> {
        let now = Utc::now();
        let due = self.store.due_deadlines(now, self.config.batch_size).await?;
        for deadline in due {
            self.try_dispatch(deadline, now).await;
        }
        Ok(())
    }

    #[instrument(skip(self, deadline), fields(id = deadline.id, kind = ?deadline.kind))]
    async fn try_dispatch(&self, deadline: ScheduledDeadline, now: chrono::DateTime<Utc>) {
        match self.store.claim_deadline(deadline.id, now).await {
            Ok(true) => {}
            Ok(false) => return, // another worker claimed it first
            Err(error) => {
                warn!(%error, "failed to claim scheduled deadline");
                return;
            }
        }

        let result = self.dispatch(&deadline, now).await;
        match result {
            Ok(()) => {
                metrics::counter!(m::SCHEDULER_DEADLINES_DISPATCHED).increment(1);
                if let Err(error) = self.store.delete_deadline(deadline.id).await {
                    warn!(%error, "failed to delete completed scheduled deadline");
                }
            }
            Err(error) => {
                let retry_at = now + backoff_for(deadline.retry_count);
                let released = self
                    .store
                    .release_deadline_for_retry(
                        deadline.id,
                        retry_at,
                        &error.to_string(),
                        self.config.max_retries,
                    )
                    .await;
                match released {
                    Ok(true) => warn!(%error, retries = deadline.retry_count + 1, "scheduled deadline handler failed, will retry"),
                    Ok(false) => {
                        metrics::counter!(m::SCHEDULER_DEADLINES_DEAD_LETTERED).increment(1);
                        warn!(%error, "scheduled deadline exhausted retries, moved to dead letter");
                    }
                    Err(e) => warn!(error = %e, "failed to release scheduled deadline for retry"),
                }
            }
        }
    }

    async fn dispatch(&self, deadline: &ScheduledDeadline, now: chrono::DateTime<Utc>) -> eyre::Result<()> {
        match deadline.kind {
            DeadlineKind::AuctionClose => {
                self.engine
                    .close_scheduled(AuctionId(deadline.target_id), now)
                    .await
                    .map_err(|e| eyre::eyre!("{e}"))?;
            }
            DeadlineKind::PaymentExpire => {
                self.expire_payment(OrderId(deadline.target_id), now).await?;
            }
        }
        Ok(())
    }

    async fn expire_payment(&self, order_id: OrderId, now: chrono::DateTime<Utc>) -> eyre::Result<()> {
        let order = self.store.order_by_id(order_id).await.map_err(|e| eyre::eyre!("{e}"))?;
        if order.payment_status != PaymentStatus::Pending {
            // already paid, failed, or refunded by the time this fired; no-op.
            return Ok(());
        }
        let mut tx = self.store.begin().await.map_err(|e| eyre::eyre!("{e}"))?;
        self.store
            .set_order_payment_status(&mut tx, order_id, PaymentStatus::Failed)
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        tx.commit().await.map_err(|e| eyre::eyre!("{e}"))?;
        metrics::counter!(m::ORDERS_EXPIRED).increment(1);

        let auction = self
            .store
            .auction_by_id(order.auction_id)
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        self.engine
            .bus()
            .publish(
                auction.channel_id,
                crate::event_bus::EventPayload::OrderExpired { order_id },
                now,
            )
            .await;
        Ok(())
    }
}

/// Capped exponential backoff: `1s * 2^retry_count`, capped at 60s.
fn backoff_for(retry_count: i32) -> Duration {
    let capped_exponent = retry_count.clamp(0, 6); // 2^6 = 64 already exceeds the 60s cap
    let seconds = (1i64 << capped_exponent).min(60);
    Duration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_at_sixty_seconds() {
        assert_eq!(backoff_for(0), Duration::seconds(1));
        assert_eq!(backoff_for(1), Duration::seconds(2));
        assert_eq!(backoff_for(10), Duration::seconds(60));
    }
}
