//! Ingestion, per-chat work queue, batch builder and in-band command layer, and the router
//! glue that ties them to the messenger, agent dispatcher, IPC watcher, and scheduler.

mod batch;
mod commands;
mod error;
mod ingest;
mod queue;
mod router;

pub use batch::{build_batch, Batch, BatchOutcome, SCHEDULER_SENDER_ID};
pub use commands::{handle_new, handle_register, help_text, parse_command, Command, RegisterRequest};
pub use error::RouterError;
pub use ingest::ingest_event;
pub use queue::{BatchProcessor, ProcessOutcome, QueueConfig, WorkQueue};
pub use router::Router;
