//! Persistence for the storefront and the chat relay.
//!
//! [`Storage`] is implemented twice: [`MemoryStore`] keeps everything in maps
//! for a single process, [`SqliteStore`] keeps it in a SQLite file. Both
//! generate identifiers, fill defaults and enforce uniqueness and references
//! the same way, so callers cannot tell them apart.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatSession, NewChatMessage, NewChatSession};
use crate::entity::{
    Category, FlashSale, NewOrder, NewPartner, NewProduct, NewSubscription, NewUser,
    NewsletterSubscription, Order, Partner, Product, ProductQuery, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field already holds this value.
    #[error("{0}")]
    Conflict(String),

    /// A referenced record does not exist.
    #[error("{0}")]
    MissingReference(String),

    /// Input rejected before it reached storage.
    #[error("{0}")]
    Invalid(String),

    /// A stored row could not be mapped back into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lookups return `Ok(None)` (or an empty list) for absent records; errors are
/// reserved for rejected writes and backend failures.
#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    // Partners
    async fn get_partner(&self, id: &str) -> StoreResult<Option<Partner>>;
    /// Approved partners in the category with this slug.
    async fn get_partners_by_category(&self, category: &str) -> StoreResult<Vec<Partner>>;
    async fn create_partner(&self, partner: NewPartner) -> StoreResult<Partner>;
    async fn approve_partner(&self, id: &str) -> StoreResult<Option<Partner>>;

    // Categories
    async fn get_categories(&self) -> StoreResult<Vec<Category>>;
    async fn get_category(&self, id: &str) -> StoreResult<Option<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;

    // Products
    async fn get_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>>;
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>>;
    async fn get_products_by_partner(&self, partner_id: &str) -> StoreResult<Vec<Product>>;
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;

    // Orders
    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>>;
    async fn get_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>>;
    async fn create_order(&self, order: NewOrder) -> StoreResult<Order>;

    // Newsletter
    async fn subscribe_newsletter(
        &self,
        subscription: NewSubscription,
    ) -> StoreResult<NewsletterSubscription>;

    // Flash sales
    async fn get_active_flash_sale(&self) -> StoreResult<Option<FlashSale>>;

    // Chat
    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession>;
    /// Looks a session up by its client-facing token.
    async fn get_chat_session(&self, session_id: &str) -> StoreResult<Option<ChatSession>>;
    async fn update_chat_session_admin_mode(
        &self,
        session_id: &str,
        is_admin_mode: bool,
    ) -> StoreResult<()>;
    /// Persists a message and bumps the owning session's activity time.
    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage>;
    /// The `limit` most recent messages, oldest first. `limit == 0` returns all.
    async fn get_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>>;
    async fn update_chat_session_activity(&self, session_id: &str) -> StoreResult<()>;
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) const DEFAULT_MAX_PARTNERS: i64 = 2;

/// Catalog every fresh store starts with.
pub(crate) fn default_categories() -> Vec<Category> {
    const SEED: [(&str, &str, &str, &str); 4] = [
        (
            "Makeup",
            "makeup",
            "Premium makeup collections featuring innovative formulas and stunning color payoff",
            "https://images.unsplash.com/photo-1596462502278-27bfdc403348?auto=format&fit=crop&w=400&h=400",
        ),
        (
            "Beauty Tools",
            "beauty-tools",
            "Professional-grade brushes and tools trusted by makeup artists worldwide",
            "https://images.unsplash.com/photo-1573461160327-b450ce3d8e7f?auto=format&fit=crop&w=400&h=400",
        ),
        (
            "Mother Care",
            "mother-care",
            "Gentle, natural skincare products designed for expecting and new mothers",
            "https://images.unsplash.com/photo-1571019613454-1cb2f99b2d8b?auto=format&fit=crop&w=400&h=400",
        ),
        (
            "Pet Care",
            "pet-care",
            "Luxury grooming products that keep your pets looking and feeling their best",
            "https://images.unsplash.com/photo-1601758228041-f3b2795255f1?auto=format&fit=crop&w=400&h=400",
        ),
    ];

    SEED.iter()
        .map(|(name, slug, description, image_url)| Category {
            id: new_id(),
            name: (*name).to_string(),
            slug: (*slug).to_string(),
            description: Some((*description).to_string()),
            image_url: Some((*image_url).to_string()),
            max_partners: DEFAULT_MAX_PARTNERS,
            current_partners: 0,
        })
        .collect()
}

pub(crate) fn default_flash_sale(now: DateTime<Utc>) -> FlashSale {
    FlashSale {
        id: new_id(),
        name: "Sitewide Flash Sale".to_string(),
        discount_percentage: Decimal::new(3000, 2),
        start_time: now - Duration::days(1),
        end_time: now + Duration::days(2),
        active: true,
        created_at: now,
    }
}

/// Messages shared by both implementations so their errors read the same.
pub(crate) mod messages {
    pub const USER_EXISTS: &str = "a user with this username or email already exists";
    pub const ALREADY_SUBSCRIBED: &str = "this email is already subscribed";
    pub const SESSION_EXISTS: &str = "chat session already exists";
    pub const UNKNOWN_USER: &str = "referenced user does not exist";
    pub const UNKNOWN_PARTNER_OR_CATEGORY: &str =
        "referenced partner or category does not exist";
    pub const UNKNOWN_SESSION: &str = "chat session does not exist";

    pub fn category_full(slug: &str) -> String {
        format!("category {slug} already has its maximum number of partners")
    }
}
