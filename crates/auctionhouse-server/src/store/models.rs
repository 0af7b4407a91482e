//! Row types mirroring the tables created by the migrations in
//! `migrations/`. Every monetary column is `rust_decimal::Decimal`; every
//! timestamp column is `chrono::DateTime<Utc>`.

use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use serde::{
    Deserialize,
    Serialize,
};

use crate::ids::{
    AuctionId,
    BidId,
    ChannelId,
    OrderId,
    ProductId,
    ShopId,
    UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Scheduled,
    Active,
    Ended,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub host_id: UserId,
    pub status: ChannelStatus,
    pub highlighted_product_id: Option<ProductId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub is_active: bool,
    pub price: Decimal,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Active,
    Ended,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub channel_id: ChannelId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub starting_price: Decimal,
    pub buyout_price: Option<Decimal>,
    pub current_bid: Decimal,
    pub highest_bidder_id: Option<UserId>,
    pub duration_seconds: i32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub extended_count: i32,
    pub status: AuctionStatus,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub auction_id: AuctionId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub final_price: Decimal,
    pub platform_fee: Decimal,
    pub seller_payout: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_deadline: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn is_shipped(&self) -> bool {
        self.shipped_at.is_some() && self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    AuctionClose,
    PaymentExpire,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledDeadline {
    pub id: i64,
    pub kind: DeadlineKind,
    pub target_id: uuid::Uuid,
    pub fire_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}
