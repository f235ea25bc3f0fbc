//! Batch builder (C5): turns a chat's unprocessed messages into either a handled in-band
//! command or an XML prompt ready for the agent dispatcher.

use nanoclaw_config::OperatorConfig;
use nanoclaw_store::{RegisteredWorkspace, Store, StoredMessage};
use regex::Regex;

use crate::commands::{self, Command, RegisterRequest};
use crate::error::RouterError;

/// Sender id stamped on the synthetic message a scheduled task dispatch inserts, so the batch
/// builder can tell a scheduler-originated run from a user-triggered one downstream.
pub const SCHEDULER_SENDER_ID: &str = "scheduler";

pub struct Batch {
    pub correlation_id: String,
    pub prompt_xml: String,
    pub last_message_timestamp: String,
    pub is_scheduled_task: bool,
}

pub enum BatchOutcome {
    Ready(Batch),
    CommandHandled { reply: String },
    NoOp,
}

/// Builds the next batch for `chat_id`, or handles an in-band command found among its
/// unprocessed messages. `chat_id` must already be registered — the unregistered-chat
/// `/register` path is handled directly at ingestion, before a chat ever reaches the queue.
pub async fn build_batch(store: &Store, config: &OperatorConfig, chat_id: &str) -> Result<BatchOutcome, RouterError> {
    let Some(workspace) = store.get_workspace(chat_id).await? else {
        return Ok(BatchOutcome::NoOp);
    };

    let since = store.get_last_agent_timestamp(chat_id).await?.unwrap_or_default();
    let bot_prefix = format!("{}:", config.assistant_name);
    let messages = store.get_messages_since(chat_id, &since, &bot_prefix).await?;
    if messages.is_empty() {
        return Ok(BatchOutcome::NoOp);
    }

    // `allowed_users` is set only by a private `/register`, so its presence doubles as the
    // private-chat flag here — the workspace itself doesn't carry the platform chat type. When
    // set, it's also the access gate: a sender outside the list never reaches the batch at all.
    let is_private = workspace.allowed_users.is_some();
    let messages: Vec<StoredMessage> = match &workspace.allowed_users {
        Some(allowed) => messages.into_iter().filter(|m| allowed.contains(&m.sender_id)).collect(),
        None => messages,
    };
    if messages.is_empty() {
        return Ok(BatchOutcome::NoOp);
    }

    if let Some((msg, command)) = find_command(&messages) {
        let reply = dispatch_command(store, config, &workspace, msg, command).await?;
        store.advance_last_agent_timestamp(chat_id, &msg.timestamp).await?;
        return Ok(BatchOutcome::CommandHandled { reply });
    }

    if !workspace.is_main_session && !is_private && workspace.requires_trigger {
        let pattern = if workspace.trigger.is_empty() { config.trigger_pattern.as_str() } else { workspace.trigger.as_str() };
        let gate = trigger_regex(pattern);
        if !messages.iter().any(|m| gate.is_match(&m.content)) {
            return Ok(BatchOutcome::NoOp);
        }
    }

    let correlation_id = messages[0].message_id.clone();
    let last_message_timestamp = messages.last().expect("checked non-empty above").timestamp.clone();
    let is_scheduled_task = messages.iter().any(|m| m.sender_id == SCHEDULER_SENDER_ID);
    let prompt_xml = shape_prompt(&messages);
    Ok(BatchOutcome::Ready(Batch { correlation_id, prompt_xml, last_message_timestamp, is_scheduled_task }))
}

/// `/help` and `/new` only trigger from the first message of a batch; `/register` is scanned
/// for at any position, since a registration request can arrive after other chatter.
fn find_command(messages: &[StoredMessage]) -> Option<(&StoredMessage, Command)> {
    if let Some(first) = messages.first() {
        if let Some(cmd) = commands::parse_command(&first.content) {
            return Some((first, cmd));
        }
    }
    messages.iter().skip(1).find_map(|m| match commands::parse_command(&m.content) {
        Some(cmd @ Command::Register { .. }) => Some((m, cmd)),
        _ => None,
    })
}

async fn dispatch_command(
    store: &Store,
    config: &OperatorConfig,
    workspace: &RegisteredWorkspace,
    msg: &StoredMessage,
    command: Command,
) -> Result<String, RouterError> {
    match command {
        Command::Help => Ok(commands::help_text(&config.assistant_name)),
        Command::New => commands::handle_new(store, &msg.chat_id).await,
        Command::Register { folder } => {
            let is_private = workspace.allowed_users.is_some();
            commands::handle_register(
                store,
                config,
                RegisterRequest {
                    chat_id: &msg.chat_id,
                    chat_name: Some(&workspace.display_name),
                    sender_id: &msg.sender_id,
                    is_private,
                    explicit_folder: folder.as_deref(),
                },
            )
            .await
        }
    }
}

/// Anchored at the start of the message, case-insensitive, requiring a word boundary after
/// the literal trigger text.
fn trigger_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern);
    Regex::new(&format!(r"(?i)^{escaped}\b")).expect("escaped pattern is always valid")
}

fn shape_prompt(messages: &[StoredMessage]) -> String {
    let mut xml = String::from("<messages>");
    for m in messages {
        xml.push_str(&format!(
            "<message sender=\"{}\" time=\"{}\">{}</message>",
            escape_xml(&m.sender_display_name),
            escape_xml(&m.timestamp),
            escape_xml(&m.content)
        ));
    }
    xml.push_str("</messages>");
    xml
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanoclaw_store::MessageOrigin;

    fn config() -> OperatorConfig {
        std::env::set_var("NANOCLAW_ASSISTANT_NAME", "Andy");
        let config = OperatorConfig::from_env().unwrap();
        std::env::remove_var("NANOCLAW_ASSISTANT_NAME");
        config
    }

    async fn register_group(store: &Store, chat_id: &str, requires_trigger: bool, trigger: &str) {
        store
            .create_workspace(RegisteredWorkspace {
                chat_id: chat_id.to_string(),
                display_name: "Team".to_string(),
                folder: "team".to_string(),
                trigger: trigger.to_string(),
                requires_trigger,
                is_main_session: false,
                allowed_users: None,
                added_at: "2026-01-01T00:00:00Z".to_string(),
                container_config: None,
            })
            .await
            .unwrap();
    }

    async fn send(store: &Store, chat_id: &str, id: &str, content: &str, ts: &str) {
        send_from(store, chat_id, id, "u1", content, ts).await;
    }

    async fn send_from(store: &Store, chat_id: &str, id: &str, sender_id: &str, content: &str, ts: &str) {
        store
            .insert_message(&StoredMessage {
                message_id: id.to_string(),
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                sender_display_name: sender_id.to_string(),
                content: content.to_string(),
                timestamp: ts.to_string(),
                origin: MessageOrigin::FromOther,
            })
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn untriggered_group_message_produces_no_batch() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", true, "@Andy").await;
        send(&store, "g1", "m1", "hey everyone", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::NoOp => {}
            _ => panic!("expected NoOp"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn triggered_message_produces_xml_batch() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", true, "@Andy").await;
        send(&store, "g1", "m1", "@Andy what's up", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::Ready(batch) => {
                assert_eq!(batch.correlation_id, "m1");
                assert!(batch.prompt_xml.contains("@Andy what&apos;s up"));
                assert!(batch.prompt_xml.starts_with("<messages>"));
            }
            _ => panic!("expected a ready batch"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_requires_word_boundary() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", true, "@An").await;
        send(&store, "g1", "m1", "@Andy hello", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::NoOp => {}
            _ => panic!("@An should not match the longer token @Andy"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn help_command_is_intercepted_and_advances_cursor() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", true, "@Andy").await;
        send(&store, "g1", "m1", "/help", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::CommandHandled { reply } => assert!(reply.contains("/register")),
            _ => panic!("expected command handling"),
        }
        assert_eq!(store.get_last_agent_timestamp("g1").await.unwrap().unwrap(), "2026-01-01T00:00:01Z");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_trigger_falls_back_to_global_pattern() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", true, "").await;
        send(&store, "g1", "m1", "@Andy ping", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::Ready(_) => {}
            _ => panic!("expected the global trigger pattern to match"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_as_the_second_message_is_not_intercepted() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", false, "@Andy").await;
        send(&store, "g1", "m1", "hey @Andy", "2026-01-01T00:00:01Z").await;
        send(&store, "g1", "m2", "/new", "2026-01-01T00:00:02Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::Ready(batch) => assert!(batch.prompt_xml.contains("/new")),
            _ => panic!("/new mid-batch should flow through as ordinary content, not a command"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn register_as_the_second_message_is_still_intercepted() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", false, "@Andy").await;
        send(&store, "g1", "m1", "hey there", "2026-01-01T00:00:01Z").await;
        send(&store, "g1", "m2", "/register", "2026-01-01T00:00:02Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::CommandHandled { reply } => assert!(reply.contains("already registered")),
            _ => panic!("expected /register to be intercepted regardless of position"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_scheduler_synthetic_message_marks_the_batch_as_scheduled() {
        let store = Store::in_memory().unwrap();
        let config = config();
        register_group(&store, "g1", false, "@Andy").await;
        send_from(&store, "g1", "m1", SCHEDULER_SENDER_ID, "daily digest", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "g1").await.unwrap() {
            BatchOutcome::Ready(batch) => assert!(batch.is_scheduled_task),
            _ => panic!("expected a ready batch"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sender_outside_allowed_users_is_dropped_from_a_private_batch() {
        let store = Store::in_memory().unwrap();
        let config = config();
        store
            .create_workspace(RegisteredWorkspace {
                chat_id: "p1".to_string(),
                display_name: "Alice".to_string(),
                folder: "alice".to_string(),
                trigger: String::new(),
                requires_trigger: false,
                is_main_session: false,
                allowed_users: Some(vec!["u1".to_string()]),
                added_at: "2026-01-01T00:00:00Z".to_string(),
                container_config: None,
            })
            .await
            .unwrap();
        send_from(&store, "p1", "m1", "intruder", "hello", "2026-01-01T00:00:01Z").await;

        match build_batch(&store, &config, "p1").await.unwrap() {
            BatchOutcome::NoOp => {}
            _ => panic!("a sender outside allowed_users must never reach the batch"),
        }
    }
}
