//! Agent dispatcher: prepares workspace snapshots, resolves sandbox mounts, launches the
//! agent container, and classifies the result of one batch.

mod dispatch;
mod error;
mod mount;
mod runtime;
mod snapshot;

pub use dispatch::{dispatch, DispatchOutcome, DispatchRequest, StatusSink};
pub use error::AgentError;
pub use mount::{resolve_mounts, ResolvedMount};
pub use runtime::{AgentProcess, ContainerRuntime, ProcessContainerRuntime};
pub use snapshot::{
    write_available_groups_snapshot, write_tasks_snapshot, ChatSnapshotInput, TaskSnapshotInput,
};
