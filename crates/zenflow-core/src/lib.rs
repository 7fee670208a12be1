pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod graph;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use directory::AgentDirectory;
pub use error::{Result, ZenflowError};
pub use event::EventBus;
pub use graph::{Edge, Flow, FlowStatus, Node, Position};
pub use types::*;
