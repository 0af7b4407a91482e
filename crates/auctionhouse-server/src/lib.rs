//! `auctionhouse-server` is the real-time session and auction engine behind
//! a live shopping platform: a seller broadcasts an interactive video
//! session ("channel") to many buyers, pushes products into it, and runs
//! real-time English auctions with bid-triggered time extensions, optional
//! instant buyout, and deterministic order creation on close.
//!
//! This crate is deliberately scoped to that core: the auction state
//! machine ([`auction`]), the per-channel event fan-out ([`event_bus`]), the
//! WebSocket subscription endpoint ([`gateway`]), the durable deadline
//! scheduler ([`scheduler`]), and the authenticated command surface
//! ([`commands`]) sitting on top of a transactional store ([`store`]).
//! Video ingest, token minting for the conferencing SDK, and payment
//! capture are external collaborators; this crate only carries the
//! passthrough credentials for them (see [`Config`]).
//!
//! # Example
//!
//! ```no_run
//! # use auctionhouse_server::{
//! #     config,
//! #     telemetry,
//! #     Config,
//! # };
//! # tokio_test::block_on(async {
//! let cfg: Config = config::get().expect("failed to read configuration");
//! telemetry::init(&cfg).expect("failed to initialize telemetry");
//! # })
//! ```

pub mod auction;
pub mod auth;
mod build_info;
pub mod commands;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod ids;
pub mod metrics;
pub mod money;
pub mod rate_limit;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod telemetry;

pub use build_info::BUILD_INFO;
pub use config::Config;

use std::time::Duration as StdDuration;

use auctionhouse_eyre::eyre::{
    self,
    WrapErr as _,
};
use chrono::Duration;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::{
    auction::{
        Engine,
        EngineConfig,
    },
    auth::Authenticator,
    event_bus::EventBus,
    rate_limit::ChatRateLimiter,
    scheduler::{
        Scheduler,
        SchedulerConfig,
    },
    state::AppState,
    store::Store,
};

/// Everything needed to run the service: a bound listener task and the
/// scheduler's background task, both cancellable through one token.
pub struct Service {
    pub state: AppState,
    pub scheduler_handle: tokio::task::JoinHandle<eyre::Result<()>>,
    pub cancel: CancellationToken,
}

/// Wires the store, event bus, auction engine, rate limiter and scheduler
/// from `config`, migrates the database, and spawns the scheduler's poll
/// loop. Returns the [`AppState`] consumed by [`commands::router`] and a
/// handle to the scheduler task.
///
/// # Errors
/// Returns an error if the store cannot be reached or migrated, or if the
/// configured rate limit spec fails to parse.
pub async fn build(config: &Config) -> eyre::Result<Service> {
    let store = Store::connect(config.database_url.expose())
        .await
        .wrap_err("failed to connect to the persistent store")?;
    store.migrate().await.wrap_err("failed to run database migrations")?;

    let bus = EventBus::new(config.subscriber_queue_max);
    let authenticator = Authenticator::new(config.jwt_signing_secret.expose());

    let engine_config = EngineConfig {
        min_increment: Decimal::ONE,
        snipe_window: Duration::seconds(config.auction_extend_threshold_seconds),
        extend_by: Duration::seconds(config.auction_extend_seconds),
        payment_window: Duration::seconds(config.order_payment_window_seconds),
        platform_fee_bps: config.platform_fee_bps,
    };
    let engine = Engine::new(store.clone(), bus.clone(), engine_config);

    let (rate_count, rate_window) = crate::config::parse_rate_limit(&config.message_rate_limit)
        .map_err(|e| eyre::eyre!(e))
        .wrap_err("invalid message_rate_limit")?;
    let rate_limiter = std::sync::Arc::new(ChatRateLimiter::new(rate_count, rate_window));

    let scheduler = Scheduler::new(
        store.clone(),
        engine.clone(),
        SchedulerConfig {
            poll_interval: StdDuration::from_millis(config.scheduler_poll_ms),
            lease: Duration::seconds(config.scheduler_lease_seconds),
            max_retries: config.scheduler_max_retries,
            batch_size: 100,
        },
    );

    let cancel = CancellationToken::new();
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(scheduler.run(scheduler_cancel));

    let state = AppState {
        store,
        bus,
        engine,
        authenticator,
        rate_limiter,
        message_max_len: config.message_max_len,
        subscriber_queue_max: config.subscriber_queue_max,
        subscriber_idle: StdDuration::from_secs(config.subscriber_idle_seconds),
        command_timeout: StdDuration::from_secs(config.command_timeout_seconds),
    };

    Ok(Service {
        state,
        scheduler_handle,
        cancel,
    })
}

/// A secret-wrapper convenience extension used by [`build`]; kept here
/// rather than on [`secrecy::SecretString`] directly since this crate does
/// not own that type.
trait ExposeSecretStr {
    fn expose(&self) -> &str;
}

impl ExposeSecretStr for secrecy::SecretString {
    fn expose(&self) -> &str {
        secrecy::ExposeSecret::expose_secret(self)
    }
}
