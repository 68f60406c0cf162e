//! Dispatch orchestration: run rounds, take responses, and advance lapsed rounds.

mod config;
mod dispatcher;

pub use config::{env_or, DispatchConfig};
pub use dispatch_types::DispatchError;
pub use dispatcher::LightningDispatcher;
