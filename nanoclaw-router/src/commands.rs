//! In-band slash commands: `/help`, `/new`, `/register [folder]`. Handling is fully
//! synchronous — no agent is spawned for these.

use nanoclaw_config::OperatorConfig;
use nanoclaw_store::{RegisteredWorkspace, Store};
use regex::Regex;

use crate::error::RouterError;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    New,
    Register { folder: Option<String> },
}

/// Recognises a command token at the start of `content`, case-insensitive on the token.
pub fn parse_command(content: &str) -> Option<Command> {
    let mut parts = content.trim().splitn(2, char::is_whitespace);
    let token = parts.next()?.to_lowercase();
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());
    match token.as_str() {
        "/help" => Some(Command::Help),
        "/new" => Some(Command::New),
        "/register" => Some(Command::Register { folder: rest.map(str::to_string) }),
        _ => None,
    }
}

pub fn help_text(assistant_name: &str) -> String {
    format!(
        "{assistant_name} commands:\n\
         /help — show this message\n\
         /new — start a fresh session for this chat\n\
         /register [folder] — register this chat so {assistant_name} responds here"
    )
}

/// Drops the stored session for a workspace. Chats that aren't registered have nothing to
/// drop; this is reported back rather than treated as an error.
pub async fn handle_new(store: &Store, chat_id: &str) -> Result<String, RouterError> {
    let Some(workspace) = store.get_workspace(chat_id).await? else {
        return Ok("This chat isn't registered yet — try /register first.".to_string());
    };
    store.clear_session(&workspace.folder).await?;
    Ok("Started a fresh session.".to_string())
}

pub struct RegisterRequest<'a> {
    pub chat_id: &'a str,
    pub chat_name: Option<&'a str>,
    pub sender_id: &'a str,
    pub is_private: bool,
    pub explicit_folder: Option<&'a str>,
}

/// `/register`: allowed on chats that aren't registered yet. A private chat becomes the main
/// session iff no main session exists; otherwise a normal workspace is created with the
/// configured global trigger pattern as its fallback (the per-workspace `trigger` field is
/// left empty, per the adopted resolution of the open question on trigger assignment).
pub async fn handle_register(
    store: &Store,
    config: &OperatorConfig,
    req: RegisterRequest<'_>,
) -> Result<String, RouterError> {
    if store.get_workspace(req.chat_id).await?.is_some() {
        return Ok("This chat is already registered.".to_string());
    }

    let main_exists = store.get_main_workspace().await?.is_some();
    let becomes_main = req.is_private && !main_exists;

    let folder = if becomes_main {
        config.main_workspace_folder.clone()
    } else {
        resolve_folder(req.explicit_folder, req.chat_name)
    };

    if store.get_workspace_by_folder(&folder).await?.is_some() {
        return Err(RouterError::Registration(format!("folder {folder:?} is already in use")));
    }

    let allowed_users = req.is_private.then(|| vec![req.sender_id.to_string()]);
    let display_name = req.chat_name.unwrap_or(req.chat_id).to_string();

    let workspace = RegisteredWorkspace {
        chat_id: req.chat_id.to_string(),
        display_name,
        folder: folder.clone(),
        trigger: String::new(),
        requires_trigger: !req.is_private,
        is_main_session: becomes_main,
        allowed_users,
        added_at: chrono::Utc::now().to_rfc3339(),
        container_config: None,
    };
    store.create_workspace(workspace).await?;

    if becomes_main {
        Ok(format!("Registered as the main session (folder {folder:?})."))
    } else {
        Ok(format!("Registered this chat (folder {folder:?})."))
    }
}

fn resolve_folder(explicit: Option<&str>, chat_name: Option<&str>) -> String {
    if let Some(explicit) = explicit {
        let sanitized = sanitize(explicit);
        if !sanitized.is_empty() {
            return sanitized;
        }
    }
    if let Some(name) = chat_name {
        let sanitized = sanitize(name);
        if !sanitized.is_empty() {
            return sanitized;
        }
    }
    format!("workspace-{}", uuid::Uuid::new_v4().simple())
}

fn sanitize(input: &str) -> String {
    let non_alnum = Regex::new("[^a-z0-9]+").expect("static pattern");
    let lower = input.to_lowercase();
    let collapsed = non_alnum.replace_all(&lower, "-");
    collapsed.trim_matches('-').to_string()
}
