use axum::extract::{
    Path,
    Query,
    State,
};
use serde::Deserialize;

use crate::{
    auth::Authenticated,
    error::DomainError,
    ids::OrderId,
    state::AppState,
    store::Order,
};

pub async fn mark_shipped(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(order_id): Path<OrderId>,
) -> Result<axum::Json<Order>, DomainError> {
    let order = state
        .store
        .mark_order_shipped(order_id, claims.sub, chrono::Utc::now())
        .await?;
    Ok(axum::Json(order))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Lists orders where the caller is either the buyer or the seller, most
/// recent first.
pub async fn list(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<axum::Json<Vec<Order>>, DomainError> {
    let limit = query.limit.clamp(1, 100);
    let orders = state.store.orders_for_user(claims.sub, limit).await?;
    Ok(axum::Json(orders))
}
