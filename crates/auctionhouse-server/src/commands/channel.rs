use axum::extract::{
    Path,
    State,
};
use serde::Deserialize;

use crate::{
    auth::Authenticated,
    error::DomainError,
    event_bus::EventPayload,
    ids::{
        ChannelId,
        ProductId,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct HighlightRequest {
    product_id: ProductId,
}

async fn require_host(state: &AppState, channel_id: ChannelId, caller: crate::ids::UserId) -> Result<(), DomainError> {
    let channel = state.store.channel_by_id(channel_id).await?;
    if channel.host_id != caller {
        return Err(DomainError::forbidden("channel host action"));
    }
    Ok(())
}

pub async fn highlight_product(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(channel_id): Path<ChannelId>,
    axum::Json(req): axum::Json<HighlightRequest>,
) -> Result<axum::http::StatusCode, DomainError> {
    require_host(&state, channel_id, claims.sub).await?;
    state.store.product_by_id(req.product_id).await?;
    state
        .store
        .set_channel_highlight(channel_id, Some(req.product_id))
        .await?;
    state
        .bus
        .publish(
            channel_id,
            EventPayload::ProductHighlighted {
                product_id: req.product_id,
            },
            chrono::Utc::now(),
        )
        .await;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn unhighlight(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(channel_id): Path<ChannelId>,
) -> Result<axum::http::StatusCode, DomainError> {
    require_host(&state, channel_id, claims.sub).await?;
    state.store.set_channel_highlight(channel_id, None).await?;
    state
        .bus
        .publish(channel_id, EventPayload::ProductUnhighlighted, chrono::Utc::now())
        .await;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
