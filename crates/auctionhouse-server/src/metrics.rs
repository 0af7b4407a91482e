//! Crate-specific metrics functionality.
//!
//! Registers metrics and lists the constants used as metric names throughout
//! the crate, following the `metrics` facade directly rather than through any
//! bespoke wrapper.

use metrics::{
    describe_counter,
    Unit,
};

pub const AUCTIONS_STARTED: &str = "auctionhouse_auctions_started";
pub const BIDS_ACCEPTED: &str = "auctionhouse_bids_accepted";
pub const BIDS_REJECTED: &str = "auctionhouse_bids_rejected";
pub const AUCTIONS_EXTENDED: &str = "auctionhouse_auctions_extended";
pub const AUCTIONS_CLOSED: &str = "auctionhouse_auctions_closed";
pub const AUCTIONS_CANCELLED: &str = "auctionhouse_auctions_cancelled";
pub const ORDERS_CREATED: &str = "auctionhouse_orders_created";
pub const ORDERS_EXPIRED: &str = "auctionhouse_orders_expired";
pub const SCHEDULER_DEADLINES_DISPATCHED: &str = "auctionhouse_scheduler_deadlines_dispatched";
pub const SCHEDULER_DEADLINES_DEAD_LETTERED: &str =
    "auctionhouse_scheduler_deadlines_dead_lettered";
pub const SUBSCRIBER_SLOW_CONSUMER_DISCONNECTS: &str =
    "auctionhouse_subscriber_slow_consumer_disconnects";
pub const MESSAGES_RATE_LIMITED: &str = "auctionhouse_messages_rate_limited";
pub const STORE_TRANSIENT_RETRIES: &str = "auctionhouse_store_transient_retries";

/// Registers every metric this crate emits, giving each a human-readable
/// description. Called once at startup, after telemetry is initialized and
/// before the service starts handling commands.
pub fn register() {
    describe_counter!(
        AUCTIONS_STARTED,
        Unit::Count,
        "The number of auctions started"
    );
    describe_counter!(
        BIDS_ACCEPTED,
        Unit::Count,
        "The number of bids accepted across all auctions"
    );
    describe_counter!(
        BIDS_REJECTED,
        Unit::Count,
        "The number of bids rejected across all auctions, labelled by reason"
    );
    describe_counter!(
        AUCTIONS_EXTENDED,
        Unit::Count,
        "The number of anti-snipe extensions applied"
    );
    describe_counter!(
        AUCTIONS_CLOSED,
        Unit::Count,
        "The number of auctions closed, labelled by whether there was a winner"
    );
    describe_counter!(
        AUCTIONS_CANCELLED,
        Unit::Count,
        "The number of auctions cancelled before any bid was placed"
    );
    describe_counter!(
        ORDERS_CREATED,
        Unit::Count,
        "The number of orders created on auction close"
    );
    describe_counter!(
        ORDERS_EXPIRED,
        Unit::Count,
        "The number of orders whose payment deadline expired unpaid"
    );
    describe_counter!(
        SCHEDULER_DEADLINES_DISPATCHED,
        Unit::Count,
        "The number of scheduled deadlines successfully dispatched"
    );
    describe_counter!(
        SCHEDULER_DEADLINES_DEAD_LETTERED,
        Unit::Count,
        "The number of scheduled deadlines moved to the dead-letter state after exhausting \
         retries"
    );
    describe_counter!(
        SUBSCRIBER_SLOW_CONSUMER_DISCONNECTS,
        Unit::Count,
        "The number of subscriber connections closed for being a slow consumer"
    );
    describe_counter!(
        MESSAGES_RATE_LIMITED,
        Unit::Count,
        "The number of chat messages rejected for exceeding the per-user rate limit"
    );
    describe_counter!(
        STORE_TRANSIENT_RETRIES,
        Unit::Count,
        "The number of internal retries issued after a transient store serialization conflict"
    );
}
