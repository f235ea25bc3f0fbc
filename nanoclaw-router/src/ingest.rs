//! Ingestion: persists chat metadata for every inbound event, and full message content for
//! chats that are registered. No filtering or triggering happens here — the batch builder
//! decides what a batch actually contains.

use nanoclaw_protocol::{ChatType, NormalizedMessage};
use nanoclaw_store::{MessageOrigin, Store, StoredMessage};

use crate::error::RouterError;

/// Persists one inbound event. Returns `true` when the chat is registered and the message
/// was newly inserted, signalling the caller to enqueue the chat on the work queue.
pub async fn ingest_event(store: &Store, msg: &NormalizedMessage) -> Result<bool, RouterError> {
    // A private chat's own display name is the other party's name; a group's display name
    // comes from platform discovery (`refresh_groups`), not from individual messages.
    let chat_name = match msg.chat_type {
        ChatType::Private => Some(msg.sender_display_name.as_str()),
        ChatType::Group => None,
    };
    store.upsert_chat(&msg.chat_id, chat_name, &msg.timestamp).await?;

    let Some(_workspace) = store.get_workspace(&msg.chat_id).await? else {
        return Ok(false);
    };

    let stored = StoredMessage {
        message_id: msg.id.clone(),
        chat_id: msg.chat_id.clone(),
        sender_id: msg.sender_id.clone(),
        sender_display_name: msg.sender_display_name.clone(),
        content: msg.content.clone(),
        timestamp: msg.timestamp.clone(),
        origin: MessageOrigin::FromOther,
    };
    let inserted = store.insert_message(&stored).await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanoclaw_store::RegisteredWorkspace;

    fn msg(id: &str, chat_id: &str, chat_type: ChatType) -> NormalizedMessage {
        NormalizedMessage {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: "u1".to_string(),
            sender_display_name: "Alice".to_string(),
            content: "hi".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            chat_type,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unregistered_chat_is_upserted_but_message_is_not_stored() {
        let store = Store::in_memory().unwrap();
        let enqueue = ingest_event(&store, &msg("m1", "chat-1", ChatType::Group)).await.unwrap();
        assert!(!enqueue);
        assert!(store.get_chat("chat-1").await.unwrap().is_some());
        assert!(store.get_messages_since("chat-1", "", "").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registered_chat_stores_the_message_and_signals_enqueue() {
        let store = Store::in_memory().unwrap();
        store
            .create_workspace(RegisteredWorkspace {
                chat_id: "chat-1".into(),
                display_name: "Team".into(),
                folder: "team".into(),
                trigger: "@Andy".into(),
                requires_trigger: true,
                is_main_session: false,
                allowed_users: None,
                added_at: "2026-01-01T00:00:00Z".into(),
                container_config: None,
            })
            .await
            .unwrap();

        let enqueue = ingest_event(&store, &msg("m1", "chat-1", ChatType::Group)).await.unwrap();
        assert!(enqueue);
        let messages = store.get_messages_since("chat-1", "", "").await.unwrap();
        assert_eq!(messages.len(), 1);

        let duplicate = ingest_event(&store, &msg("m1", "chat-1", ChatType::Group)).await.unwrap();
        assert!(!duplicate, "idempotent insert should not re-signal enqueue");
    }
}
