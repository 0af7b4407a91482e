//! The command surface: thin axum handlers that validate input, pull the
//! authenticated caller from the `Authenticated` extractor, invoke the
//! relevant engine method, and let `DomainError`'s `IntoResponse` impl
//! translate failures to HTTP status codes and JSON bodies.

mod auctions;
mod channel;
mod messages;
mod orders;

use axum::{
    extract::{
        Request,
        State,
    },
    middleware::{
        self,
        Next,
    },
    response::{
        IntoResponse as _,
        Response,
    },
    routing::{
        get,
        post,
    },
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    error::DomainError,
    gateway,
    state::AppState,
};

/// Enforces the end-to-end command deadline (§5): a command that has not
/// produced a response within `state.command_timeout` is aborted and
/// reported as [`DomainError::Timeout`] rather than left to hang. Applied
/// to every command route but not to `/ws`, whose connections are
/// expected to run for the lifetime of the subscription.
async fn command_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(state.command_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => DomainError::Timeout.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    let commands = Router::new()
        .route("/auctions", post(auctions::start))
        .route("/auctions/:auction_id/bid", post(auctions::bid))
        .route("/auctions/:auction_id/buyout", post(auctions::buyout))
        .route("/auctions/:auction_id/close", post(auctions::close_early))
        .route("/auctions/:auction_id/cancel", post(auctions::cancel))
        .route(
            "/channels/:channel_id/highlight",
            post(channel::highlight_product),
        )
        .route(
            "/channels/:channel_id/highlight",
            axum::routing::delete(channel::unhighlight),
        )
        .route("/channels/:channel_id/messages", post(messages::send))
        .route("/channels/:channel_id/messages", get(messages::list))
        .route("/orders", get(orders::list))
        .route("/orders/:order_id/ship", post(orders::mark_shipped))
        .layer(middleware::from_fn_with_state(state.clone(), command_timeout));

    commands
        .route("/ws", get(gateway::attach))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
