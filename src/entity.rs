use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest and highest commission a partner may negotiate, in percent.
pub const MIN_COMMISSION_RATE: Decimal = Decimal::from_parts(800, 0, 0, false, 2);
pub const MAX_COMMISSION_RATE: Decimal = Decimal::from_parts(1500, 0, 0, false, 2);

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub is_partner: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_partner: bool,
}

impl NewUser {
    /// Trims and lower-cases the email, then checks the remaining fields.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        if self.username.is_empty() {
            return Err("username is required".into());
        }
        if !is_valid_email(&self.email) {
            return Err("invalid email address".into());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl PartnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerStatus::Pending => "pending",
            PartnerStatus::Approved => "approved",
            PartnerStatus::Rejected => "rejected",
            PartnerStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PartnerStatus::Pending),
            "approved" => Some(PartnerStatus::Approved),
            "rejected" => Some(PartnerStatus::Rejected),
            "suspended" => Some(PartnerStatus::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for PartnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    pub id: String,
    pub user_id: String,
    pub business_name: String,
    /// Category slug, e.g. `makeup` or `pet-care`.
    pub category: String,
    pub description: String,
    pub website: Option<String>,
    pub commission_rate: Decimal,
    pub status: PartnerStatus,
    pub credit_card_on_file: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPartner {
    pub user_id: String,
    pub business_name: String,
    pub category: String,
    pub description: String,
    pub website: Option<String>,
    pub commission_rate: Decimal,
}

impl NewPartner {
    pub fn validate(&self) -> Result<(), String> {
        if self.business_name.trim().is_empty() {
            return Err("businessName is required".into());
        }
        if self.category.trim().is_empty() {
            return Err("category is required".into());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".into());
        }
        if self.commission_rate < MIN_COMMISSION_RATE || self.commission_rate > MAX_COMMISSION_RATE
        {
            return Err(format!(
                "commissionRate must be between {MIN_COMMISSION_RATE} and {MAX_COMMISSION_RATE}"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub max_partners: i64,
    pub current_partners: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub partner_id: String,
    pub category_id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub image_url: String,
    pub gallery_urls: Vec<String>,
    pub in_stock: bool,
    pub featured: bool,
    pub rating: Decimal,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub partner_id: String,
    pub category_id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub image_url: String,
    #[serde(default)]
    pub gallery_urls: Vec<String>,
    pub in_stock: Option<bool>,
    pub featured: Option<bool>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.price.is_sign_negative() {
            return Err("price must not be negative".into());
        }
        if let Some(sale) = self.sale_price {
            if sale.is_sign_negative() || sale > self.price {
                return Err("salePrice must be between 0 and price".into());
            }
        }
        Ok(())
    }
}

/// Filters accepted by the product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub limit: Option<usize>,
    /// Category slug.
    pub category: Option<String>,
    pub featured: Option<bool>,
}

pub const DEFAULT_PRODUCT_LIMIT: usize = 20;

impl ProductQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PRODUCT_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub total_amount: Decimal,
    pub status: String,
    pub delivery_confirmed: bool,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub auto_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: String,
    pub total_amount: Decimal,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), String> {
        if self.total_amount.is_sign_negative() {
            return Err("totalAmount must not be negative".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSale {
    pub id: String,
    pub name: String,
    pub discount_percentage: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl FlashSale {
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active && self.start_time <= now && self.end_time >= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterSubscription {
    pub id: String,
    pub email: String,
    pub subscribed_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
    pub email: String,
}

/// Basic shape check: something@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("user.name@domain.co.uk"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("test@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("test@domain"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn new_user_is_normalized() {
        let user = NewUser {
            username: "  layla ".into(),
            email: " Layla@Example.COM ".into(),
            password: "sufficiently-long".into(),
            is_partner: false,
        }
        .normalize()
        .unwrap();
        assert_eq!(user.username, "layla");
        assert_eq!(user.email, "layla@example.com");
    }

    #[test]
    fn short_password_is_rejected() {
        let err = NewUser {
            username: "layla".into(),
            email: "layla@example.com".into(),
            password: "short".into(),
            is_partner: false,
        }
        .normalize()
        .unwrap_err();
        assert!(err.contains("password"));
    }

    #[test]
    fn commission_rate_bounds() {
        let mut partner = NewPartner {
            user_id: "u1".into(),
            business_name: "Glow Labs".into(),
            category: "makeup".into(),
            description: "Mineral makeup".into(),
            website: None,
            commission_rate: Decimal::new(800, 2),
        };
        assert!(partner.validate().is_ok());
        partner.commission_rate = Decimal::new(1500, 2);
        assert!(partner.validate().is_ok());
        partner.commission_rate = Decimal::new(1501, 2);
        assert!(partner.validate().is_err());
        partner.commission_rate = Decimal::new(7, 0);
        assert!(partner.validate().is_err());
    }

    #[test]
    fn password_is_never_serialized() {
        let user = User {
            id: "u1".into(),
            username: "layla".into(),
            email: "layla@example.com".into(),
            password: "hunter22hunter22".into(),
            is_partner: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["isPartner"], false);
    }

    #[test]
    fn flash_sale_window() {
        let now = Utc::now();
        let mut sale = FlashSale {
            id: "f1".into(),
            name: "Sale".into(),
            discount_percentage: Decimal::new(3000, 2),
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(2),
            active: true,
            created_at: now,
        };
        assert!(sale.is_running(now));
        assert!(!sale.is_running(now + Duration::days(3)));
        sale.active = false;
        assert!(!sale.is_running(now));
    }
}
