use std::fmt::Write as _;

use crate::chat::{ChatMessage, PromptRole};
use crate::compliance::{format_price_aed, BUSINESS_HOURS};
use crate::entity::{Category, FlashSale, Product};

use super::completion::PromptMessage;

/// Prior turns replayed to the completion service.
pub const HISTORY_WINDOW: usize = 6;

const DESCRIPTION_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub total_products: usize,
    pub total_partners: usize,
    pub active_flash_sales: usize,
}

/// Snapshot handed to the responder for a single inbound message. Built fresh
/// for every message.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub flash_sale: Option<FlashSale>,
    /// Prior messages, oldest first, excluding the one being answered.
    pub history: Vec<ChatMessage>,
    pub is_admin_mode: bool,
    pub stats: Option<SiteStats>,
}

/// System prompt followed by the recent history window and the new message.
pub fn build_messages(context: &ChatContext, user_text: &str) -> Vec<PromptMessage> {
    let system = if context.is_admin_mode {
        admin_system_prompt(context)
    } else {
        customer_system_prompt(context)
    };

    let skip = context.history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
    messages.push(PromptMessage::new(PromptRole::System, system));
    messages.extend(
        context
            .history
            .iter()
            .skip(skip)
            .map(|m| PromptMessage::new(m.sender.prompt_role(), m.message.clone())),
    );
    messages.push(PromptMessage::new(PromptRole::User, user_text));
    messages
}

fn catalog_summary(context: &ChatContext) -> String {
    let products = if context.products.is_empty() {
        "Product catalog is being loaded.".to_string()
    } else {
        let listing = context
            .products
            .iter()
            .map(|p| {
                let preview: String = p.description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
                format!("{} ({}) - {}", p.name, format_price_aed(p.price), preview)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Available products ({} total): {}",
            context.products.len(),
            listing
        )
    };

    let categories = if context.categories.is_empty() {
        "Categories: makeup, beauty-tools, mother-care, pet-care".to_string()
    } else {
        let names: Vec<_> = context.categories.iter().map(|c| c.name.as_str()).collect();
        format!("Categories: {}", names.join(", "))
    };

    let sale = match &context.flash_sale {
        Some(sale) => format!(
            "Current flash sale: {} with {}% discount",
            sale.name, sale.discount_percentage
        ),
        None => "No active flash sale currently.".to_string(),
    };

    format!("{products}\n\n{categories}\n\n{sale}")
}

pub fn customer_system_prompt(context: &ChatContext) -> String {
    let mut prompt = String::from(
        "You are Violet, the shopping assistant for Shop&Glow, a curated marketplace for \
         beauty, mother care and pet grooming products operating under UAE regulations and \
         Islamic values.\n\n\
         Rules you must follow:\n\
         1. Halal: only recommend halal-certified or clearly halal-compliant products. Ask about \
         halal requirements when suggesting cosmetics or personal care items. Never recommend \
         pork-derived, alcohol-based or non-halal animal ingredients. If a product's halal \
         status is unknown, say so and suggest contacting support.\n\
         2. Culture: respect Islamic values and UAE norms, use respectful language, and be \
         mindful of Ramadan, Eid and other observances.\n\
         3. Age and modesty: do not give beauty advice to users under 16 without referring to \
         parental guidance; respect modesty in every recommendation.\n\
         4. Business: quote prices in UAE Dirhams (AED), mention that 5% UAE VAT applies, refer \
         to UAE consumer protection law for returns and warranties, and make no false claims.\n\
         5. Never recommend products not verified for UAE import, never suggest DIY treatments \
         that may breach health regulations, never push excessive spending, and never discuss \
         politics or sensitive regional issues.\n\n\
         Personality: professional, respectful, culturally aware and knowledgeable about halal \
         beauty and wellness.\n\n\
         Current Shop&Glow information:\n",
    );
    prompt.push_str(&catalog_summary(context));
    prompt.push_str(
        "\n\nInclude these disclaimers when relevant:\n\
         - \"All prices shown include 5% UAE VAT\"\n\
         - \"Halal certification status available on request\"\n\
         - \"Subject to UAE import regulations and customs\"\n\
         - \"Returns policy complies with UAE consumer protection laws\"\n\n\
         Always put respect for local values, religious requirements and regulation ahead of sales.\n\n",
    );
    prompt.push_str(BUSINESS_HOURS);
    prompt
}

pub fn admin_system_prompt(context: &ChatContext) -> String {
    let stats = match context.stats {
        Some(stats) => format!(
            "Current stats: {} products, {} partners, {} active flash sales",
            stats.total_products, stats.total_partners, stats.active_flash_sales
        ),
        None => "Website statistics are being loaded.".to_string(),
    };

    let mut prompt = String::from(
        "You are Violet in ADMIN MODE for the Shop&Glow marketplace, assisting the site owner \
         with business intelligence, technical support and management.\n\n\
         Capabilities:\n\
         1. Analytics: website performance, customer behaviour, sales trends\n\
         2. Products: inventory, pricing strategy, product performance\n\
         3. Partners: performance, commission tracking, approval workflow\n\
         4. Technical support: errors, performance issues, optimisation\n\
         5. Strategy: growth, marketing and optimisation recommendations\n\n",
    );
    let _ = writeln!(prompt, "Current Shop&Glow status:\n{stats}\n");
    prompt.push_str(
        "Marketplace facts:\n\
         - Multi-vendor marketplace with curated partners\n\
         - Commission between 8% and 15% depending on category and performance\n\
         - At most 2 partners per category\n\
         - Real-time chat over WebSocket\n\n\
         Be analytical and specific: give actionable recommendations, cite the metrics above \
         when useful, and weigh the business impact of every suggestion.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{MessageType, Sender};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn message(sender: Sender, text: &str) -> ChatMessage {
        ChatMessage {
            id: text.to_string(),
            session_id: "s".into(),
            sender,
            message: text.to_string(),
            message_type: MessageType::Text,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    fn product(name: &str, price: Decimal) -> Product {
        Product {
            id: name.into(),
            partner_id: "p".into(),
            category_id: "c".into(),
            name: name.into(),
            description: "A very long description that definitely runs past the fifty character preview".into(),
            price,
            sale_price: None,
            image_url: String::new(),
            gallery_urls: vec![],
            in_stock: true,
            featured: false,
            rating: Decimal::ZERO,
            review_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_is_windowed_oldest_first() {
        let history: Vec<_> = (0..9)
            .map(|i| {
                let sender = match i % 3 {
                    0 => Sender::User,
                    1 => Sender::Assistant,
                    _ => Sender::Admin,
                };
                message(sender, &format!("turn {i}"))
            })
            .collect();
        let context = ChatContext {
            history,
            ..Default::default()
        };

        let messages = build_messages(&context, "latest");
        assert_eq!(messages.len(), HISTORY_WINDOW + 2);
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[1].content, "turn 3");
        assert_eq!(messages[1].role, PromptRole::User);
        assert_eq!(messages[2].role, PromptRole::Assistant);
        // Admin turns replay as user turns.
        assert_eq!(messages[3].role, PromptRole::User);
        assert_eq!(messages[6].content, "turn 8");
        assert_eq!(messages[7], PromptMessage::new(PromptRole::User, "latest"));
    }

    #[test]
    fn customer_prompt_lists_catalog() {
        let context = ChatContext {
            products: vec![product("Rose Lip Tint", Decimal::new(100, 0))],
            ..Default::default()
        };
        let prompt = customer_system_prompt(&context);
        assert!(prompt.contains("Available products (1 total)"));
        assert!(prompt.contains("Rose Lip Tint (AED 105.00 (inc. 5% VAT)) - A very long description that definitely runs past"));
        assert!(!prompt.contains("fifty character preview"));
        assert!(prompt.contains("Categories: makeup, beauty-tools, mother-care, pet-care"));
        assert!(prompt.contains("No active flash sale currently."));
        assert!(prompt.ends_with(BUSINESS_HOURS));
    }

    #[test]
    fn admin_prompt_carries_stats() {
        let context = ChatContext {
            is_admin_mode: true,
            stats: Some(SiteStats {
                total_products: 12,
                total_partners: 3,
                active_flash_sales: 1,
            }),
            ..Default::default()
        };
        let messages = build_messages(&context, "How are sales?");
        assert!(messages[0].content.contains("ADMIN MODE"));
        assert!(messages[0]
            .content
            .contains("Current stats: 12 products, 3 partners, 1 active flash sales"));
    }
}
