//! # nanoclaw-protocol
//!
//! Wire shapes shared by every other NanoClaw crate: the normalized messenger event
//! ([`message`]), the agent child-process JSON contract ([`agent_io`]), the filesystem IPC
//! record shapes ([`ipc`]), and the scheduled-task / container-mount value types ([`task`],
//! [`container`]). Nothing here owns I/O; it is pure data plus `serde` (de)serialization.

pub mod agent_io;
pub mod container;
pub mod ipc;
pub mod message;
pub mod task;

pub use agent_io::{AgentInput, AgentOutcome, AgentPayload, AgentResultPayload, OutputType};
pub use container::{ContainerConfig, MountSpec};
pub use ipc::{IpcError, IpcRecord};
pub use message::{ChatType, NormalizedMessage};
pub use task::{ContextMode, ScheduleKind, TaskStatus};
