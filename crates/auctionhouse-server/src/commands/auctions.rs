use axum::{
    extract::{
        Path,
        State,
    },
    Json,
};
use rust_decimal::Decimal;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    auth::{
        self,
        Authenticated,
    },
    error::DomainError,
    ids::{
        AuctionId,
        ChannelId,
        ProductId,
    },
    state::AppState,
    store::Auction,
};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    channel_id: ChannelId,
    product_id: ProductId,
    duration_seconds: i32,
    buyout_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    #[serde(flatten)]
    auction: Auction,
}

pub async fn start(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Json(req): Json<StartRequest>,
) -> Result<Json<AuctionResponse>, DomainError> {
    auth::require_role(&claims, "seller")?;
    let auction = state
        .engine
        .start(
            req.channel_id,
            claims.sub,
            req.product_id,
            req.duration_seconds,
            req.buyout_price,
            chrono::Utc::now(),
        )
        .await?;
    Ok(Json(AuctionResponse { auction }))
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    auction: Auction,
    extended: bool,
    ended: bool,
}

pub async fn bid(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(auction_id): Path<AuctionId>,
    Json(req): Json<BidRequest>,
) -> Result<Json<BidResponse>, DomainError> {
    let outcome = state
        .engine
        .bid(auction_id, claims.sub, req.amount, chrono::Utc::now())
        .await?;
    Ok(Json(BidResponse {
        auction: outcome.auction,
        extended: outcome.extended,
        ended: outcome.ended,
    }))
}

pub async fn buyout(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(auction_id): Path<AuctionId>,
) -> Result<Json<BidResponse>, DomainError> {
    let outcome = state
        .engine
        .buyout(auction_id, claims.sub, chrono::Utc::now())
        .await?;
    Ok(Json(BidResponse {
        auction: outcome.auction,
        extended: outcome.extended,
        ended: outcome.ended,
    }))
}

pub async fn close_early(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(auction_id): Path<AuctionId>,
) -> Result<axum::http::StatusCode, DomainError> {
    state
        .engine
        .close_early(auction_id, claims.sub, chrono::Utc::now())
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn cancel(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(auction_id): Path<AuctionId>,
) -> Result<axum::http::StatusCode, DomainError> {
    state
        .engine
        .cancel(auction_id, claims.sub, chrono::Utc::now())
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
