use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use shopglow::assistant::responder::OFFLINE_CUSTOMER;
use shopglow::assistant::{Completion, CompletionError, PromptMessage, Responder};
use shopglow::chat::{NewChatSession, Sender};
use shopglow::compliance::HALAL_DISCLAIMER;
use shopglow::relay::{Relay, ServerEvent};
use shopglow::store::{MemoryStore, SqliteStore, Storage};

/// Replies with fixed text after an optional delay.
struct ScriptedCompletion {
    reply: &'static str,
    delay: Duration,
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, _: &[PromptMessage]) -> Result<Option<String>, CompletionError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(self.reply.to_string()))
    }
}

fn scripted(reply: &'static str, delay_ms: u64) -> Responder {
    let completion: Arc<dyn Completion> = Arc::new(ScriptedCompletion {
        reply,
        delay: Duration::from_millis(delay_ms),
    });
    Responder::new(Some(completion))
}

async fn open_session(store: &dyn Storage, token: &str) -> String {
    store
        .create_chat_session(NewChatSession {
            session_id: token.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .session_id
}

fn join(token: &str) -> String {
    format!(r#"{{"type":"join","sessionId":"{token}"}}"#)
}

fn say(text: &str) -> String {
    serde_json::json!({ "type": "message", "content": text }).to_string()
}

fn messages(events: &[ServerEvent]) -> Vec<&shopglow::chat::ChatMessage> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Message { message } => Some(message),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn halal_lipstick_question() {
    let store = Arc::new(MemoryStore::new());
    let token = open_session(store.as_ref(), "lipstick").await;
    let relay = Relay::new(
        store.clone(),
        Arc::new(scripted(
            "We carry a rose lipstick from our makeup collection.",
            0,
        )),
    );

    let mut conn = relay.connect();
    conn.handle_frame(&join(&token)).await;
    let events = conn.handle_frame(&say("Do you have halal lipstick?")).await;

    assert_eq!(events.len(), 2, "{events:?}");
    assert!(!events
        .iter()
        .any(|e| matches!(e, ServerEvent::AdminModeActivated { .. })));

    let sent = messages(&events);
    assert_eq!(sent[0].sender, Sender::User);
    assert_eq!(sent[0].message, "Do you have halal lipstick?");
    assert_eq!(sent[1].sender, Sender::Assistant);
    assert!(sent[1].message.contains(HALAL_DISCLAIMER));

    let stored = store.get_chat_messages(&token, 50).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].sender, Sender::User);
    assert_eq!(stored[1].sender, Sender::Assistant);
}

#[tokio::test]
async fn offline_reply_is_the_fixed_fallback() {
    let store = Arc::new(MemoryStore::new());
    let token = open_session(store.as_ref(), "offline").await;
    let relay = Relay::new(store, Arc::new(Responder::offline()));

    let mut conn = relay.connect();
    conn.handle_frame(&join(&token)).await;
    let events = conn.handle_frame(&say("Anything for my cat?")).await;

    assert_eq!(messages(&events)[1].message, OFFLINE_CUSTOMER);
}

#[tokio::test]
async fn history_is_ordered_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("chat.db")).await.unwrap();
    store.init().await.unwrap();
    let store = Arc::new(store);
    let token = open_session(store.as_ref(), "ordered").await;
    let relay = Relay::new(store.clone(), Arc::new(Responder::offline()));

    let mut conn = relay.connect();
    conn.handle_frame(&join(&token)).await;
    for text in ["first", "second", "third"] {
        conn.handle_frame(&say(text)).await;
    }

    let stored = store.get_chat_messages(&token, 50).await.unwrap();
    let texts: Vec<_> = stored
        .iter()
        .filter(|m| m.sender == Sender::User)
        .map(|m| m.message.as_str())
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);
    assert_eq!(stored.len(), 6);
    assert!(stored.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    let latest = store.get_chat_messages(&token, 2).await.unwrap();
    assert_eq!(latest[0].message, "third");
    assert_eq!(latest[1].sender, Sender::Assistant);
}

#[tokio::test]
async fn same_session_turns_do_not_interleave() {
    let store = Arc::new(MemoryStore::new());
    let token = open_session(store.as_ref(), "shared").await;
    let relay = Relay::new(store.clone(), Arc::new(scripted("Noted.", 30)));

    let mut tasks = Vec::new();
    for text in ["from tab one", "from tab two"] {
        let mut conn = relay.connect();
        let join_frame = join(&token);
        let frame = say(text);
        tasks.push(tokio::spawn(async move {
            conn.handle_frame(&join_frame).await;
            conn.handle_frame(&frame).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().len(), 2);
    }

    let stored = store.get_chat_messages(&token, 0).await.unwrap();
    let senders: Vec<_> = stored.iter().map(|m| m.sender).collect();
    assert_eq!(
        senders,
        [Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]
    );
}
