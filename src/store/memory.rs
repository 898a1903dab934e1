use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    default_categories, default_flash_sale, messages, new_id, Storage, StoreError, StoreResult,
};
use crate::chat::{ChatMessage, ChatSession, NewChatMessage, NewChatSession};
use crate::entity::{
    Category, FlashSale, NewOrder, NewPartner, NewProduct, NewSubscription, NewUser,
    NewsletterSubscription, Order, Partner, PartnerStatus, Product, ProductQuery, User,
};

/// Single-process store. Records live in maps keyed by id; secondary lookups
/// scan. Collections whose listing order matters keep insertion order.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, User>,
    partners: HashMap<String, Partner>,
    categories: Vec<Category>,
    products: HashMap<String, Product>,
    /// Product ids in insertion order.
    product_order: Vec<String>,
    orders: HashMap<String, Order>,
    newsletter: HashMap<String, NewsletterSubscription>,
    flash_sales: Vec<FlashSale>,
    /// Keyed by the client-facing session token.
    sessions: HashMap<String, ChatSession>,
    /// Per session token, in insertion order.
    messages: HashMap<String, Vec<ChatMessage>>,
}

impl MemoryStore {
    /// A store seeded with the default catalog and flash sale.
    pub fn new() -> Self {
        let inner = Inner {
            categories: default_categories(),
            flash_sales: vec![default_flash_sale(Utc::now())],
            ..Default::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn products_in_order(&self) -> impl Iterator<Item = &Product> {
        self.product_order
            .iter()
            .filter_map(|id| self.products.get(id))
    }

    fn touch_session(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.last_activity_at = Utc::now();
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.write();
        if inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Conflict(messages::USER_EXISTS.into()));
        }

        let user = User {
            id: new_id(),
            username: user.username,
            email: user.email,
            password: user.password,
            is_partner: user.is_partner,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_partner(&self, id: &str) -> StoreResult<Option<Partner>> {
        Ok(self.read().partners.get(id).cloned())
    }

    async fn get_partners_by_category(&self, category: &str) -> StoreResult<Vec<Partner>> {
        let mut partners: Vec<_> = self
            .read()
            .partners
            .values()
            .filter(|p| p.category == category && p.status == PartnerStatus::Approved)
            .cloned()
            .collect();
        partners.sort_by_key(|p| p.created_at);
        Ok(partners)
    }

    async fn create_partner(&self, partner: NewPartner) -> StoreResult<Partner> {
        let mut inner = self.write();
        if !inner.users.contains_key(&partner.user_id) {
            return Err(StoreError::MissingReference(messages::UNKNOWN_USER.into()));
        }

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
        inner.partners.insert(partner.id.clone(), partner.clone());
        Ok(partner)
    }

    async fn approve_partner(&self, id: &str) -> StoreResult<Option<Partner>> {
        let mut inner = self.write();
        let Some(partner) = inner.partners.get(id).cloned() else {
            return Ok(None);
        };
        if partner.status == PartnerStatus::Approved {
            return Ok(Some(partner));
        }

        if let Some(category) = inner
            .categories
            .iter_mut()
            .find(|c| c.slug == partner.category)
        {
            if category.current_partners >= category.max_partners {
                return Err(StoreError::Conflict(messages::category_full(
                    &partner.category,
                )));
            }
            category.current_partners += 1;
        }

        let approved = Partner {
            status: PartnerStatus::Approved,
            approved_at: Some(Utc::now()),
            ..partner
        };
        inner.partners.insert(approved.id.clone(), approved.clone());
        Ok(Some(approved))
    }

    async fn get_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.read().categories.clone())
    }

    async fn get_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.read().categories.iter().find(|c| c.id == id).cloned())
    }

    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .read()
            .categories
            .iter()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn get_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>> {
        let inner = self.read();
        let category_id = query
            .category
            .as_deref()
            .and_then(|slug| inner.categories.iter().find(|c| c.slug == slug))
            .map(|c| c.id.clone());

        Ok(inner
            .products_in_order()
            .filter(|p| category_id.as_ref().map_or(true, |id| &p.category_id == id))
            .filter(|p| query.featured.map_or(true, |f| p.featured == f))
            .take(query.limit())
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.read().products.get(id).cloned())
    }

    async fn get_products_by_partner(&self, partner_id: &str) -> StoreResult<Vec<Product>> {
        Ok(self
            .read()
            .products_in_order()
            .filter(|p| p.partner_id == partner_id)
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let mut inner = self.write();
        if !inner.partners.contains_key(&product.partner_id)
            || !inner.categories.iter().any(|c| c.id == product.category_id)
        {
            return Err(StoreError::MissingReference(
                messages::UNKNOWN_PARTNER_OR_CATEGORY.into(),
            ));
        }

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
        inner.product_order.push(product.id.clone());
        inner.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.read().orders.get(id).cloned())
    }

    async fn get_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<_> = self
            .read()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
        let mut inner = self.write();
        if !inner.users.contains_key(&order.user_id) {
            return Err(StoreError::MissingReference(messages::UNKNOWN_USER.into()));
        }

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
        inner.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn subscribe_newsletter(
        &self,
        subscription: NewSubscription,
    ) -> StoreResult<NewsletterSubscription> {
        let mut inner = self.write();
        if inner
            .newsletter
            .values()
            .any(|s| s.email == subscription.email)
        {
            return Err(StoreError::Conflict(messages::ALREADY_SUBSCRIBED.into()));
        }

        let subscription = NewsletterSubscription {
            id: new_id(),
            email: subscription.email,
            subscribed_at: Utc::now(),
            active: true,
        };
        inner
            .newsletter
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get_active_flash_sale(&self) -> StoreResult<Option<FlashSale>> {
        let now = Utc::now();
        Ok(self
            .read()
            .flash_sales
            .iter()
            .find(|s| s.is_running(now))
            .cloned())
    }

    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession> {
        let mut inner = self.write();
        if inner.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(messages::SESSION_EXISTS.into()));
        }
        if let Some(user_id) = &session.user_id {
            if !inner.users.contains_key(user_id) {
                return Err(StoreError::MissingReference(messages::UNKNOWN_USER.into()));
            }
        }

        let now = Utc::now();
        let session = ChatSession {
            id: new_id(),
            session_id: session.session_id,
            is_admin_mode: session.is_admin_mode,
            user_id: session.user_id,
            created_at: now,
            last_activity_at: now,
        };
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get_chat_session(&self, session_id: &str) -> StoreResult<Option<ChatSession>> {
        Ok(self.read().sessions.get(session_id).cloned())
    }

    async fn update_chat_session_admin_mode(
        &self,
        session_id: &str,
        is_admin_mode: bool,
    ) -> StoreResult<()> {
        let mut inner = self.write();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.is_admin_mode = is_admin_mode;
            session.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        message.validate().map_err(StoreError::Invalid)?;

        let mut inner = self.write();
        if !inner.sessions.contains_key(&message.session_id) {
            return Err(StoreError::MissingReference(messages::UNKNOWN_SESSION.into()));
        }

        let message = ChatMessage {
            id: new_id(),
            session_id: message.session_id,
            sender: message.sender,
            message: message.message,
            message_type: message.message_type,
            metadata: message.metadata,
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());
        inner.touch_session(&message.session_id);
        Ok(message)
    }

    async fn get_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        let inner = self.read();
        let Some(history) = inner.messages.get(session_id) else {
            return Ok(Vec::new());
        };

        // Stable sort keeps insertion order for equal timestamps.
        let mut history = history.clone();
        history.sort_by_key(|m| m.created_at);
        if limit > 0 && history.len() > limit {
            history.drain(..history.len() - limit);
        }
        Ok(history)
    }

    async fn update_chat_session_activity(&self, session_id: &str) -> StoreResult<()> {
        self.write().touch_session(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn seeded_catalog() {
        contract::seeded_catalog(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn users_are_unique() {
        contract::users_are_unique(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn partner_lifecycle() {
        contract::partner_lifecycle(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn product_listing() {
        contract::product_listing(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn products_keep_insertion_order() {
        contract::products_keep_insertion_order(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn orders_and_newsletter() {
        contract::orders_and_newsletter(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn chat_history() {
        contract::chat_history(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn mismatched_metadata_is_rejected() {
        let store = MemoryStore::new();
        store
            .create_chat_session(NewChatSession {
                session_id: "s".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut msg = NewChatMessage::text("s", crate::chat::Sender::User, "hi");
        msg.message_type = crate::chat::MessageType::ProductRecommendation;
        let err = store.create_chat_message(msg).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
