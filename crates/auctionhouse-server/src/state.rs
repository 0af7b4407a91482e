//! The shared application state threaded through every axum handler and
//! the subscription gateway.

use std::{
    sync::Arc,
    time::Duration,
};

use axum::extract::FromRef;

use crate::{
    auction::Engine,
    auth::Authenticator,
    event_bus::EventBus,
    rate_limit::SharedChatRateLimiter,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub bus: EventBus,
    pub engine: Engine,
    pub authenticator: Authenticator,
    pub rate_limiter: SharedChatRateLimiter,
    pub message_max_len: usize,
    pub subscriber_queue_max: usize,
    pub subscriber_idle: Duration,
    pub command_timeout: Duration,
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

impl FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for EventBus {
    fn from_ref(state: &AppState) -> Self {
        state.bus.clone()
    }
}

impl FromRef<AppState> for Engine {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for SharedChatRateLimiter {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.rate_limiter)
    }
}
