use std::sync::Arc;

use tracing::{error, warn};

use crate::compliance::{self, STANDING_DISCLAIMER};

use super::completion::Completion;
use super::prompt::{build_messages, ChatContext};

pub const ADMIN_TRIGGERS: &[&str] = &["violet-admin-2024", "admin-mode-violet", "shopglow-admin"];

pub const ADMIN_WELCOME: &str = "🔐 Admin mode activated! Hello admin, I'm Violet, your Shop&Glow management assistant. I can help you with:\n\n• Website analytics and performance insights\n• Product and inventory management\n• Partner relationship monitoring\n• Customer behavior analysis\n• Error detection and troubleshooting\n• Business optimization recommendations\n\nHow can I assist you with managing Shop&Glow today?";

pub const OFFLINE_CUSTOMER: &str = "Assalamu Alaikum! I'm Violet, your Shop&Glow assistant. AI chat features are currently offline, but you can browse our premium halal-certified beauty products, mother care items, and pet grooming supplies that comply with UAE regulations. Use the navigation menu to explore our curated collections! All prices include 5% UAE VAT.";

pub const OFFLINE_ADMIN: &str = "Admin mode is available, but AI features require an OpenAI API key. You can still access all Shop&Glow management features through the interface.";

pub const COMPLIANCE_REDIRECT: &str = "I apologize, but I need to ensure my response complies with UAE regulations. Let me provide you with appropriate assistance while respecting local guidelines. How can I help you find halal-certified, UAE-compliant products?";

pub const EMPTY_COMPLETION: &str = "I'm having trouble responding right now. Please try again.";

const TECHNICAL_DIFFICULTIES: &str =
    "I'm experiencing technical difficulties. Please try again in a moment.";

/// Text of the reply when the completion call fails.
pub fn failure_reply() -> String {
    format!("{TECHNICAL_DIFFICULTIES} {STANDING_DISCLAIMER}")
}

pub fn detect_admin_trigger(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ADMIN_TRIGGERS.iter().any(|t| lowered.contains(t))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    /// The session should switch to admin mode once this reply is stored.
    pub enter_admin_mode: bool,
}

impl Reply {
    fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            enter_admin_mode: false,
        }
    }
}

/// Turns one inbound message into one assistant reply. Never fails: every
/// error path yields a fixed message.
pub struct Responder {
    completion: Option<Arc<dyn Completion>>,
}

impl Responder {
    pub fn new(completion: Option<Arc<dyn Completion>>) -> Self {
        Self { completion }
    }

    /// A responder with no completion service behind it.
    pub fn offline() -> Self {
        Self::new(None)
    }

    pub fn is_online(&self) -> bool {
        self.completion.is_some()
    }

    pub async fn respond(&self, text: &str, context: &ChatContext) -> Reply {
        if !context.is_admin_mode && detect_admin_trigger(text) {
            return Reply {
                message: ADMIN_WELCOME.to_string(),
                enter_admin_mode: true,
            };
        }

        let Some(completion) = &self.completion else {
            let fallback = if context.is_admin_mode {
                OFFLINE_ADMIN
            } else {
                OFFLINE_CUSTOMER
            };
            return Reply::plain(fallback);
        };

        let messages = build_messages(context, text);
        let content = match completion.complete(&messages).await {
            Ok(Some(content)) if !content.trim().is_empty() => content,
            Ok(_) => EMPTY_COMPLETION.to_string(),
            Err(e) => {
                error!(error = %e, "Completion request failed");
                return Reply::plain(failure_reply());
            }
        };

        if context.is_admin_mode {
            return Reply::plain(content);
        }

        let verdict = compliance::check_message(&content, true);
        if !verdict.is_compliant {
            warn!(violations = ?verdict.violations, "Replacing non-compliant reply");
            return Reply::plain(COMPLIANCE_REDIRECT);
        }

        match verdict.required_disclaimer {
            Some(disclaimer) => Reply::plain(format!("{content}\n\n*{disclaimer}*")),
            None => Reply::plain(content),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeCompletion;
    use super::*;
    use crate::chat::PromptRole;
    use crate::compliance::{HALAL_DISCLAIMER, VAT_DISCLAIMER};

    fn responder(fake: &Arc<FakeCompletion>) -> Responder {
        Responder::new(Some(fake.clone() as Arc<dyn Completion>))
    }

    fn admin_context() -> ChatContext {
        ChatContext {
            is_admin_mode: true,
            ..Default::default()
        }
    }

    #[test]
    fn triggers_match_anywhere_in_any_case() {
        assert!(detect_admin_trigger("violet-admin-2024"));
        assert!(detect_admin_trigger("hey SHOPGLOW-ADMIN please"));
        assert!(!detect_admin_trigger("shopglow admin"));
    }

    #[tokio::test]
    async fn trigger_enters_admin_mode_without_completion() {
        let fake = Arc::new(FakeCompletion::replying("unused"));
        let online = responder(&fake);
        assert!(online.is_online());
        let reply = online
            .respond("violet-admin-2024", &ChatContext::default())
            .await;
        assert_eq!(reply.message, ADMIN_WELCOME);
        assert!(reply.enter_admin_mode);
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn trigger_in_admin_mode_is_a_normal_message() {
        let fake = Arc::new(FakeCompletion::replying("Sales are up."));
        let reply = responder(&fake)
            .respond("violet-admin-2024", &admin_context())
            .await;
        assert_eq!(reply, Reply::plain("Sales are up."));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn offline_fallbacks_depend_on_mode() {
        let offline = Responder::offline();
        assert!(!offline.is_online());
        let reply = offline.respond("Hello", &ChatContext::default()).await;
        assert_eq!(reply, Reply::plain(OFFLINE_CUSTOMER));

        let reply = offline.respond("Hello", &admin_context()).await;
        assert_eq!(reply, Reply::plain(OFFLINE_ADMIN));

        // The trigger still works offline.
        let reply = offline
            .respond("admin-mode-violet", &ChatContext::default())
            .await;
        assert!(reply.enter_admin_mode);
    }

    #[tokio::test]
    async fn completion_failure_becomes_apology() {
        let fake = Arc::new(FakeCompletion::failing(503));
        let reply = responder(&fake)
            .respond("Hello", &ChatContext::default())
            .await;
        assert_eq!(reply, Reply::plain(failure_reply()));
        assert!(reply.message.ends_with(STANDING_DISCLAIMER));
    }

    #[tokio::test]
    async fn customer_reply_gets_disclaimer() {
        let fake = Arc::new(FakeCompletion::replying("Our lipstick range is lovely."));
        let reply = responder(&fake)
            .respond("lipstick?", &ChatContext::default())
            .await;
        assert_eq!(reply.message, "Our lipstick range is lovely.");

        let fake = Arc::new(FakeCompletion::replying("Try our makeup line."));
        let reply = responder(&fake)
            .respond("lipstick?", &ChatContext::default())
            .await;
        assert_eq!(
            reply.message,
            format!("Try our makeup line.\n\n*{HALAL_DISCLAIMER}*")
        );

        let fake = Arc::new(FakeCompletion::replying("The price is AED 40."));
        let reply = responder(&fake)
            .respond("how much?", &ChatContext::default())
            .await;
        assert!(reply.message.ends_with(&format!("*{VAT_DISCLAIMER}*")));
    }

    #[tokio::test]
    async fn non_compliant_reply_is_redirected() {
        let fake = Arc::new(FakeCompletion::replying("This alcohol-based toner is great"));
        let reply = responder(&fake)
            .respond("toner?", &ChatContext::default())
            .await;
        assert_eq!(reply, Reply::plain(COMPLIANCE_REDIRECT));
    }

    #[tokio::test]
    async fn admin_replies_skip_compliance() {
        let fake = Arc::new(FakeCompletion::replying("Gambling ads convert poorly."));
        let reply = responder(&fake).respond("ads?", &admin_context()).await;
        assert_eq!(reply.message, "Gambling ads convert poorly.");
    }

    #[tokio::test]
    async fn empty_completion_uses_placeholder() {
        let fake = Arc::new(FakeCompletion::empty());
        let reply = responder(&fake)
            .respond("Hello", &ChatContext::default())
            .await;
        assert_eq!(reply.message, EMPTY_COMPLETION);
    }

    #[tokio::test]
    async fn prompt_ends_with_user_text() {
        let fake = Arc::new(FakeCompletion::replying("ok"));
        responder(&fake)
            .respond("Do you ship to Sharjah?", &ChatContext::default())
            .await;
        let calls = fake.calls.lock().unwrap();
        let last = calls[0].last().unwrap();
        assert_eq!(last.role, PromptRole::User);
        assert_eq!(last.content, "Do you ship to Sharjah?");
    }
}
