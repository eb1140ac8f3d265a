// ABOUTME: Core library for crew - worker registry, stream translator, config
// ABOUTME: Shared by the crew-mcp front end and anything else driving workers

pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
mod translator;
pub mod worker;

pub use command::WorkerCommand;
pub use config::{Config, WorkerConfig};
pub use error::WorkerError;
pub use protocol::StreamEvent;
pub use registry::{SpawnRequest, WorkerRegistry};
pub use worker::{WorkerInfo, WorkerStatus};
