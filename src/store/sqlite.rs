use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteRow},
    Row, SqlitePool,
};
use std::{path::Path, str::FromStr};
use tracing::info;

use super::{
    default_categories, default_flash_sale, messages, new_id, Storage, StoreError, StoreResult,
};
use crate::chat::{
    ChatMessage, ChatSession, MessageMetadata, MessageType, NewChatMessage, NewChatSession, Sender,
};
use crate::entity::{
    Category, FlashSale, NewOrder, NewPartner, NewProduct, NewSubscription, NewUser,
    NewsletterSubscription, Order, Partner, PartnerStatus, Product, ProductQuery, User,
};

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

const USER_COLUMNS: &str = "id, username, email, password, is_partner, created_at";
const PARTNER_COLUMNS: &str = "id, user_id, business_name, category, description, website, \
     commission_rate, status, credit_card_on_file, approved_at, created_at";
const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, image_url, max_partners, current_partners";
const PRODUCT_COLUMNS: &str = "id, partner_id, category_id, name, description, price, \
     sale_price, image_url, gallery_urls, in_stock, featured, rating, review_count, created_at";
const ORDER_COLUMNS: &str = "id, user_id, total_amount, status, delivery_confirmed, \
     delivery_confirmed_at, auto_approved_at, created_at";
const SESSION_COLUMNS: &str =
    "id, session_id, is_admin_mode, user_id, created_at, last_activity_at";
const MESSAGE_COLUMNS: &str =
    "id, session_id, sender, message, message_type, metadata, created_at";

impl SqliteStore {
    /// Opens (creating if missing) the database file at `db_path`.
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Creates the schema and seeds the default catalog into an empty database.
    pub async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                is_partner BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS partners (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                business_name TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                website TEXT,
                commission_rate TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                credit_card_on_file BOOLEAN NOT NULL DEFAULT 0,
                approved_at DATETIME,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_partners_category ON partners(category, status);

            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                image_url TEXT,
                max_partners INTEGER NOT NULL DEFAULT 2,
                current_partners INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                partner_id TEXT NOT NULL REFERENCES partners(id),
                category_id TEXT NOT NULL REFERENCES categories(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                price TEXT NOT NULL,
                sale_price TEXT,
                image_url TEXT NOT NULL,
                gallery_urls TEXT NOT NULL DEFAULT '[]',
                in_stock BOOLEAN NOT NULL DEFAULT 1,
                featured BOOLEAN NOT NULL DEFAULT 0,
                rating TEXT NOT NULL DEFAULT '0.00',
                review_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                total_amount TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                delivery_confirmed BOOLEAN NOT NULL DEFAULT 0,
                delivery_confirmed_at DATETIME,
                auto_approved_at DATETIME,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS newsletter (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                subscribed_at DATETIME NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS flash_sales (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                discount_percentage TEXT NOT NULL,
                start_time DATETIME NOT NULL,
                end_time DATETIME NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL UNIQUE,
                is_admin_mode BOOLEAN NOT NULL DEFAULT 0,
                user_id TEXT REFERENCES users(id),
                created_at DATETIME NOT NULL,
                last_activity_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL REFERENCES chat_sessions(session_id),
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                metadata TEXT,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.seed().await
    }

    async fn seed(&self) -> StoreResult<()> {
        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        if categories == 0 {
            info!("Seeding default categories");
            for category in default_categories() {
                sqlx::query(
                    r#"
                    INSERT INTO categories (id, name, slug, description, image_url, max_partners, current_partners)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&category.id)
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(&category.image_url)
                .bind(category.max_partners)
                .bind(category.current_partners)
                .execute(&self.pool)
                .await?;
            }
        }

        let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flash_sales")
            .fetch_one(&self.pool)
            .await?;
        if sales == 0 {
            let sale = default_flash_sale(Utc::now());
            sqlx::query(
                r#"
                INSERT INTO flash_sales (id, name, discount_percentage, start_time, end_time, active, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&sale.id)
            .bind(&sale.name)
            .bind(sale.discount_percentage.to_string())
            .bind(sale.start_time)
            .bind(sale.end_time)
            .bind(sale.active)
            .bind(sale.created_at)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

/// Maps constraint failures onto the same errors the memory store raises.
fn write_error(err: sqlx::Error, conflict: &str, missing: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(conflict.to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::MissingReference(missing.to_string());
        }
    }
    StoreError::Database(err)
}

fn decimal(row: &SqliteRow, column: &str) -> StoreResult<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn optional_decimal(row: &SqliteRow, column: &str) -> StoreResult<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| StoreError::Corrupt(format!("{column}: {e}"))))
        .transpose()
}

fn map_user(row: &SqliteRow) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
        is_partner: row.try_get("is_partner")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_partner(row: &SqliteRow) -> StoreResult<Partner> {
    let status: String = row.try_get("status")?;
    Ok(Partner {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        business_name: row.try_get("business_name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        website: row.try_get("website")?,
        commission_rate: decimal(row, "commission_rate")?,
        status: PartnerStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("partner status {status}")))?,
        credit_card_on_file: row.try_get("credit_card_on_file")?,
        approved_at: row.try_get("approved_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_category(row: &SqliteRow) -> StoreResult<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        max_partners: row.try_get("max_partners")?,
        current_partners: row.try_get("current_partners")?,
    })
}

fn map_product(row: &SqliteRow) -> StoreResult<Product> {
    let gallery: String = row.try_get("gallery_urls")?;
    Ok(Product {
        id: row.try_get("id")?,
        partner_id: row.try_get("partner_id")?,
        category_id: row.try_get("category_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: decimal(row, "price")?,
        sale_price: optional_decimal(row, "sale_price")?,
        image_url: row.try_get("image_url")?,
        gallery_urls: serde_json::from_str(&gallery)
            .map_err(|e| StoreError::Corrupt(format!("gallery_urls: {e}")))?,
        in_stock: row.try_get("in_stock")?,
        featured: row.try_get("featured")?,
        rating: decimal(row, "rating")?,
        review_count: row.try_get("review_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_order(row: &SqliteRow) -> StoreResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total_amount: decimal(row, "total_amount")?,
        status: row.try_get("status")?,
        delivery_confirmed: row.try_get("delivery_confirmed")?,
        delivery_confirmed_at: row.try_get("delivery_confirmed_at")?,
        auto_approved_at: row.try_get("auto_approved_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_flash_sale(row: &SqliteRow) -> StoreResult<FlashSale> {
    Ok(FlashSale {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        discount_percentage: decimal(row, "discount_percentage")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_session(row: &SqliteRow) -> StoreResult<ChatSession> {
    Ok(ChatSession {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        is_admin_mode: row.try_get("is_admin_mode")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}

fn map_message(row: &SqliteRow) -> StoreResult<ChatMessage> {
    let sender: String = row.try_get("sender")?;
    let message_type: String = row.try_get("message_type")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(ChatMessage {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        sender: Sender::parse(&sender)
            .ok_or_else(|| StoreError::Corrupt(format!("message sender {sender}")))?,
        message: row.try_get("message")?,
        message_type: MessageType::parse(&message_type)
            .ok_or_else(|| StoreError::Corrupt(format!("message type {message_type}")))?,
        metadata: metadata
            .map(|raw| serde_json::from_str::<MessageMetadata>(&raw))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("message metadata: {e}")))?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Storage for SqliteStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_user)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_user)
            .transpose()
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = User {
            id: new_id(),
            username: user.username,
            email: user.email,
            password: user.password,
            is_partner: user.is_partner,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password, is_partner, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.is_partner)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::USER_EXISTS, messages::UNKNOWN_USER))?;

        Ok(user)
    }

    async fn get_partner(&self, id: &str) -> StoreResult<Option<Partner>> {
        sqlx::query(&format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_partner)
            .transpose()
    }

    async fn get_partners_by_category(&self, category: &str) -> StoreResult<Vec<Partner>> {
        sqlx::query(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE category = ? AND status = 'approved' ORDER BY created_at"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_partner)
        .collect()
    }

    async fn create_partner(&self, partner: NewPartner) -> StoreResult<Partner> {
        let partner = Partner {
            id: new_id(),
            user_id: partner.user_id,
            business_name: partner.business_name,
            category: partner.category,
            description: partner.description,
            website: partner.website,
            commission_rate: partner.commission_rate,
            status: PartnerStatus::Pending,
            credit_card_on_file: false,
            approved_at: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO partners (id, user_id, business_name, category, description, website,
                                  commission_rate, status, credit_card_on_file, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&partner.id)
        .bind(&partner.user_id)
        .bind(&partner.business_name)
        .bind(&partner.category)
        .bind(&partner.description)
        .bind(&partner.website)
        .bind(partner.commission_rate.to_string())
        .bind(partner.status.as_str())
        .bind(partner.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::USER_EXISTS, messages::UNKNOWN_USER))?;

        Ok(partner)
    }

    async fn approve_partner(&self, id: &str) -> StoreResult<Option<Partner>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(&format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let partner = map_partner(&row)?;
        if partner.status == PartnerStatus::Approved {
            return Ok(Some(partner));
        }

        let capacity: Option<(i64, i64)> = sqlx::query_as(
            "SELECT current_partners, max_partners FROM categories WHERE slug = ?",
        )
        .bind(&partner.category)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((current, max)) = capacity {
            if current >= max {
                return Err(StoreError::Conflict(messages::category_full(
                    &partner.category,
                )));
            }
            sqlx::query("UPDATE categories SET current_partners = current_partners + 1 WHERE slug = ?")
                .bind(&partner.category)
                .execute(&mut *tx)
                .await?;
        }

        let approved = Partner {
            status: PartnerStatus::Approved,
            approved_at: Some(Utc::now()),
            ..partner
        };
        sqlx::query("UPDATE partners SET status = ?, approved_at = ? WHERE id = ?")
            .bind(approved.status.as_str())
            .bind(approved.approved_at)
            .bind(&approved.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(approved))
    }

    async fn get_categories(&self) -> StoreResult<Vec<Category>> {
        sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY rowid"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_category)
            .collect()
    }

    async fn get_category(&self, id: &str) -> StoreResult<Option<Category>> {
        sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_category)
            .transpose()
    }

    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_category)
            .transpose()
    }

    async fn get_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>> {
        // Unknown slugs leave the category filter off, matching the memory store.
        let category_id = match query.category.as_deref() {
            Some(slug) => self.get_category_by_slug(slug).await?.map(|c| c.id),
            None => None,
        };

        sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE (?1 IS NULL OR category_id = ?1)
              AND (?2 IS NULL OR featured = ?2)
            ORDER BY rowid
            LIMIT ?3
            "#
        ))
        .bind(category_id)
        .bind(query.featured)
        .bind(i64::try_from(query.limit()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_product)
        .collect()
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_product)
            .transpose()
    }

    async fn get_products_by_partner(&self, partner_id: &str) -> StoreResult<Vec<Product>> {
        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE partner_id = ? ORDER BY rowid"
        ))
        .bind(partner_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_product)
        .collect()
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let product = Product {
            id: new_id(),
            partner_id: product.partner_id,
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            price: product.price,
            sale_price: product.sale_price,
            image_url: product.image_url,
            gallery_urls: product.gallery_urls,
            in_stock: product.in_stock.unwrap_or(true),
            featured: product.featured.unwrap_or(false),
            rating: Decimal::new(0, 2),
            review_count: 0,
            created_at: Utc::now(),
        };
        let gallery = serde_json::to_string(&product.gallery_urls)
            .map_err(|e| StoreError::Invalid(format!("galleryUrls: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, partner_id, category_id, name, description, price, sale_price,
                                  image_url, gallery_urls, in_stock, featured, rating, review_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.partner_id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(product.sale_price.map(|p| p.to_string()))
        .bind(&product.image_url)
        .bind(gallery)
        .bind(product.in_stock)
        .bind(product.featured)
        .bind(product.rating.to_string())
        .bind(product.review_count)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                messages::UNKNOWN_PARTNER_OR_CATEGORY,
                messages::UNKNOWN_PARTNER_OR_CATEGORY,
            )
        })?;

        Ok(product)
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(map_order)
            .transpose()
    }

    async fn get_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_order)
        .collect()
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
        let order = Order {
            id: new_id(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            status: "pending".to_string(),
            delivery_confirmed: false,
            delivery_confirmed_at: None,
            auto_approved_at: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount, status, delivery_confirmed, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(order.total_amount.to_string())
        .bind(&order.status)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::UNKNOWN_USER, messages::UNKNOWN_USER))?;

        Ok(order)
    }

    async fn subscribe_newsletter(
        &self,
        subscription: NewSubscription,
    ) -> StoreResult<NewsletterSubscription> {
        let subscription = NewsletterSubscription {
            id: new_id(),
            email: subscription.email,
            subscribed_at: Utc::now(),
            active: true,
        };
        sqlx::query(
            "INSERT INTO newsletter (id, email, subscribed_at, active) VALUES (?, ?, ?, 1)",
        )
        .bind(&subscription.id)
        .bind(&subscription.email)
        .bind(subscription.subscribed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::ALREADY_SUBSCRIBED, messages::ALREADY_SUBSCRIBED))?;

        Ok(subscription)
    }

    async fn get_active_flash_sale(&self) -> StoreResult<Option<FlashSale>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, discount_percentage, start_time, end_time, active, created_at
            FROM flash_sales
            WHERE active = 1 AND start_time <= ?1 AND end_time >= ?1
            ORDER BY rowid
            LIMIT 1
            "#,
        )
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_flash_sale).transpose()
    }

    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: new_id(),
            session_id: session.session_id,
            is_admin_mode: session.is_admin_mode,
            user_id: session.user_id,
            created_at: now,
            last_activity_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, session_id, is_admin_mode, user_id, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.session_id)
        .bind(session.is_admin_mode)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::SESSION_EXISTS, messages::UNKNOWN_USER))?;

        Ok(session)
    }

    async fn get_chat_session(&self, session_id: &str) -> StoreResult<Option<ChatSession>> {
        sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = ?"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(map_session)
        .transpose()
    }

    async fn update_chat_session_admin_mode(
        &self,
        session_id: &str,
        is_admin_mode: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE chat_sessions SET is_admin_mode = ?, last_activity_at = ? WHERE session_id = ?",
        )
        .bind(is_admin_mode)
        .bind(Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        message.validate().map_err(StoreError::Invalid)?;

        let message = ChatMessage {
            id: new_id(),
            session_id: message.session_id,
            sender: message.sender,
            message: message.message,
            message_type: message.message_type,
            metadata: message.metadata,
            created_at: Utc::now(),
        };
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Invalid(format!("metadata: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, session_id, sender, message, message_type, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.sender.as_str())
        .bind(&message.message)
        .bind(message.message_type.as_str())
        .bind(metadata)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, messages::SESSION_EXISTS, messages::UNKNOWN_SESSION))?;

        self.update_chat_session_activity(&message.session_id).await?;
        Ok(message)
    }

    async fn get_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM chat_messages
            WHERE session_id = ?
            ORDER BY created_at DESC, seq DESC
            LIMIT ?
            "#
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows.iter().map(map_message).collect::<StoreResult<Vec<_>>>()?;
        // Oldest to newest.
        messages.reverse();
        Ok(messages)
    }

    async fn update_chat_session_activity(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE chat_sessions SET last_activity_at = ? WHERE session_id = ?")
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl SqliteStore {
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("shopglow.db")).await.unwrap();
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn seeded_catalog() {
        let (_dir, store) = open().await;
        contract::seeded_catalog(&store).await;
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (_dir, store) = open().await;
        store.init().await.unwrap();
        assert_eq!(store.get_categories().await.unwrap().len(), 4);
        let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flash_sales")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(sales, 1);
    }

    #[tokio::test]
    async fn users_are_unique() {
        let (_dir, store) = open().await;
        contract::users_are_unique(&store).await;
    }

    #[tokio::test]
    async fn partner_lifecycle() {
        let (_dir, store) = open().await;
        contract::partner_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn product_listing() {
        let (_dir, store) = open().await;
        contract::product_listing(&store).await;
    }

    #[tokio::test]
    async fn products_keep_insertion_order() {
        let (_dir, store) = open().await;
        contract::products_keep_insertion_order(&store).await;
    }

    #[tokio::test]
    async fn orders_and_newsletter() {
        let (_dir, store) = open().await;
        contract::orders_and_newsletter(&store).await;
    }

    #[tokio::test]
    async fn chat_history() {
        let (_dir, store) = open().await;
        contract::chat_history(&store).await;
    }

    #[tokio::test]
    async fn metadata_survives_storage() {
        let (_dir, store) = open().await;
        store
            .create_chat_session(NewChatSession {
                session_id: "s".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let saved = store
            .create_chat_message(NewChatMessage {
                session_id: "s".into(),
                sender: Sender::Assistant,
                message: "Try these".into(),
                message_type: MessageType::ProductRecommendation,
                metadata: Some(MessageMetadata::ProductRecommendation {
                    product_ids: vec!["p1".into(), "p2".into()],
                }),
            })
            .await
            .unwrap();

        let history = store.get_chat_messages("s", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, saved.id);
        assert_eq!(history[0].metadata, saved.metadata);
        let session = store.get_chat_session("s").await.unwrap().unwrap();
        assert!(session.last_activity_at >= saved.created_at);
    }
}
