//! Filesystem IPC record shapes.
//!
//! The directory a record is found in *is* the claim of origin; the JSON body is untrusted
//! and is validated by [`IpcRecord::parse`] before the router acts on it.

use serde::Deserialize;
use thiserror::Error;

use crate::container::ContainerConfig;
use crate::task::ContextMode;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown record type: {0}")]
    UnknownType(String),
}

/// One JSON record emitted by a running agent into its workspace's IPC directory.
#[derive(Clone, Debug, PartialEq)]
pub enum IpcRecord {
    Message {
        chat_jid: String,
        text: String,
    },
    Status {
        chat_jid: String,
        text: String,
    },
    ScheduleTask {
        prompt: String,
        schedule_type: String,
        schedule_value: String,
        target_jid: String,
        context_mode: Option<ContextMode>,
    },
    PauseTask {
        task_id: String,
    },
    ResumeTask {
        task_id: String,
    },
    CancelTask {
        task_id: String,
    },
    RefreshGroups,
    RegisterGroup {
        jid: String,
        name: String,
        folder: String,
        trigger: String,
        container_config: Option<ContainerConfig>,
    },
}

/// Raw on-disk shape: one `type` discriminant plus a flat bag of optional fields. Kept
/// separate from [`IpcRecord`] so field-presence validation produces a specific [`IpcError`]
/// rather than a generic serde message.
#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    chat_jid: Option<String>,
    text: Option<String>,
    prompt: Option<String>,
    schedule_type: Option<String>,
    schedule_value: Option<String>,
    target_jid: Option<String>,
    context_mode: Option<ContextMode>,
    task_id: Option<String>,
    jid: Option<String>,
    name: Option<String>,
    folder: Option<String>,
    trigger: Option<String>,
    container_config: Option<ContainerConfig>,
}

impl IpcRecord {
    pub fn parse(bytes: &[u8]) -> Result<Self, IpcError> {
        let raw: RawRecord = serde_json::from_slice(bytes)?;
        let req = |field: Option<String>, name: &'static str| field.ok_or(IpcError::MissingField(name));
        match raw.kind.as_str() {
            "message" => Ok(IpcRecord::Message {
                chat_jid: req(raw.chat_jid, "chat_jid")?,
                text: req(raw.text, "text")?,
            }),
            "status" => Ok(IpcRecord::Status {
                chat_jid: req(raw.chat_jid, "chat_jid")?,
                text: req(raw.text, "text")?,
            }),
            "schedule_task" => Ok(IpcRecord::ScheduleTask {
                prompt: req(raw.prompt, "prompt")?,
                schedule_type: req(raw.schedule_type, "schedule_type")?,
                schedule_value: req(raw.schedule_value, "schedule_value")?,
                target_jid: req(raw.target_jid, "target_jid")?,
                context_mode: raw.context_mode,
            }),
            "pause_task" => Ok(IpcRecord::PauseTask {
                task_id: req(raw.task_id, "task_id")?,
            }),
            "resume_task" => Ok(IpcRecord::ResumeTask {
                task_id: req(raw.task_id, "task_id")?,
            }),
            "cancel_task" => Ok(IpcRecord::CancelTask {
                task_id: req(raw.task_id, "task_id")?,
            }),
            "refresh_groups" => Ok(IpcRecord::RefreshGroups),
            "register_group" => Ok(IpcRecord::RegisterGroup {
                jid: req(raw.jid, "jid")?,
                name: req(raw.name, "name")?,
                folder: req(raw.folder, "folder")?,
                trigger: req(raw.trigger, "trigger")?,
                container_config: raw.container_config,
            }),
            other => Err(IpcError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_record() {
        let json = br#"{"type":"message","chat_jid":"123@g.us","text":"hi"}"#;
        let rec = IpcRecord::parse(json).unwrap();
        assert_eq!(
            rec,
            IpcRecord::Message {
                chat_jid: "123@g.us".into(),
                text: "hi".into()
            }
        );
    }

    #[test]
    fn missing_field_is_rejected() {
        let json = br#"{"type":"message","chat_jid":"123@g.us"}"#;
        let err = IpcRecord::parse(json).unwrap_err();
        assert!(matches!(err, IpcError::MissingField("text")));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = br#"{"type":"teleport"}"#;
        let err = IpcRecord::parse(json).unwrap_err();
        assert!(matches!(err, IpcError::UnknownType(_)));
    }

    #[test]
    fn refresh_groups_has_no_required_fields() {
        let json = br#"{"type":"refresh_groups"}"#;
        assert_eq!(IpcRecord::parse(json).unwrap(), IpcRecord::RefreshGroups);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = IpcRecord::parse(b"not json").unwrap_err();
        assert!(matches!(err, IpcError::Malformed(_)));
    }
}
