use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use nanoclaw_messenger::{CommandSpec, Messenger, MessengerError};
use nanoclaw_protocol::{ChatType, NormalizedMessage};
use teloxide::payloads::{GetUpdatesSetters, SendMessageSetters};
use teloxide::requests::Requester;
use teloxide::types::{ChatId, MessageId, Update, UpdateKind};
use teloxide::Bot;
use tokio::sync::{mpsc, Mutex};

const BOT_TOKEN_ENV: &str = "NANOCLAW_TELEGRAM_BOT_TOKEN";

/// Telegram adapter. Push-based: the long-poll loop started in `start_listener` delivers
/// updates directly, so the router never needs to tail the store for this adapter.
pub struct TelegramMessenger {
    bot: Bot,
    status_messages: Mutex<HashMap<(String, String), MessageId>>,
}

impl TelegramMessenger {
    /// Reads the bot token from the environment. Fails fast rather than connecting with an
    /// empty token, per the adapter contract's "fail fast if credentials absent".
    pub fn from_env() -> Result<Self, MessengerError> {
        let token = env::var(BOT_TOKEN_ENV).map_err(|_| MessengerError::MissingCredentials)?;
        if token.trim().is_empty() {
            return Err(MessengerError::MissingCredentials);
        }
        Ok(Self { bot: Bot::new(token), status_messages: Mutex::new(HashMap::new()) })
    }

    fn chat_id(raw: &str) -> Result<ChatId, MessengerError> {
        raw.parse::<i64>().map(ChatId).map_err(|_| MessengerError::Send(format!("invalid chat id: {raw}")))
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn connect(&self) -> Result<(), MessengerError> {
        self.bot.get_me().await.map_err(|e| MessengerError::Connect(e.to_string()))?;
        Ok(())
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), MessengerError> {
        let id = Self::chat_id(chat_id)?;
        self.bot
            .send_message(id, text)
            .await
            .map_err(|e| MessengerError::Send(e.to_string()))?;
        Ok(())
    }

    async fn send_or_update_status(
        &self,
        chat_id: &str,
        correlation_id: &str,
        text: &str,
        is_first: bool,
        reply_to: Option<&str>,
    ) -> Result<(), MessengerError> {
        let id = Self::chat_id(chat_id)?;
        let key = (chat_id.to_string(), correlation_id.to_string());

        if !is_first {
            let existing = self.status_messages.lock().await.get(&key).copied();
            if let Some(message_id) = existing {
                match self.bot.edit_message_text(id, message_id, text).await {
                    Ok(_) => return Ok(()),
                    Err(err) => {
                        tracing::warn!(%chat_id, %correlation_id, error = %err, "status edit rejected, sending fresh message");
                    }
                }
            }
        }

        let mut request = self.bot.send_message(id, text);
        if let Some(reply) = reply_to.and_then(|r| r.parse::<i32>().ok()) {
            request = request.reply_parameters(teloxide::types::ReplyParameters::new(MessageId(reply)));
        }
        let sent = request.await.map_err(|e| MessengerError::Send(e.to_string()))?;
        self.status_messages.lock().await.insert(key, sent.id);
        Ok(())
    }

    async fn clear_status(&self, chat_id: &str, correlation_id: &str) {
        self.status_messages
            .lock()
            .await
            .remove(&(chat_id.to_string(), correlation_id.to_string()));
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), MessengerError> {
        let bot_commands: Vec<teloxide::types::BotCommand> = commands
            .iter()
            .map(|c| teloxide::types::BotCommand {
                command: c.name.clone(),
                description: c.description.clone(),
            })
            .collect();
        self.bot
            .set_my_commands(bot_commands)
            .await
            .map_err(|e| MessengerError::Connect(e.to_string()))?;
        Ok(())
    }

    async fn start_listener(&self, tx: mpsc::Sender<NormalizedMessage>) -> Result<(), MessengerError> {
        let bot = self.bot.clone();
        tokio::spawn(async move {
            let mut offset: i32 = 0;
            loop {
                let updates = match bot.get_updates().offset(offset).timeout(30).await {
                    Ok(updates) => updates,
                    Err(err) => {
                        tracing::warn!(error = %err, "telegram get_updates failed, backing off");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };
                for update in updates {
                    offset = offset.max(update.id.0 as i32 + 1);
                    if let Some(normalized) = normalize_update(update) {
                        if tx.send(normalized).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    fn needs_polling(&self) -> bool {
        false
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(30)
    }
}

fn normalize_update(update: Update) -> Option<NormalizedMessage> {
    let UpdateKind::Message(message) = update.kind else { return None };
    let content = message.text().map(str::to_string).or_else(|| {
        message.caption().map(str::to_string).or_else(|| {
            if message.photo().is_some() {
                Some("<media:image>".to_string())
            } else if message.video().is_some() {
                Some("<media:video>".to_string())
            } else if message.document().is_some() {
                Some("<media:document>".to_string())
            } else {
                None
            }
        })
    })?;
    let sender = message.from()?;
    let chat_type = if message.chat.is_private() { ChatType::Private } else { ChatType::Group };
    let sender_display_name = sender
        .username
        .clone()
        .unwrap_or_else(|| sender.first_name.clone());
    Some(NormalizedMessage {
        id: message.id.0.to_string(),
        chat_id: message.chat.id.0.to_string(),
        sender_id: sender.id.0.to_string(),
        sender_display_name,
        content,
        timestamp: message.date.to_rfc3339(),
        chat_type,
    })
}
