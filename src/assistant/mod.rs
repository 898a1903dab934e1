//! Violet, the storefront chat assistant.

pub mod completion;
pub mod prompt;
pub mod responder;

pub use completion::{Completion, CompletionError, OpenAiClient, PromptMessage};
pub use prompt::{build_messages, ChatContext, SiteStats};
pub use responder::{detect_admin_trigger, Reply, Responder};

#[cfg(test)]
pub(crate) use responder::testing;
