pub mod builtin;
pub mod catalog;
pub mod context;
pub mod executor;
pub mod flows;
pub mod handler;
pub mod memory;
pub mod registry;
pub mod run_log;
pub mod scheduler;

pub use catalog::NodeTypeInfo;
pub use context::ExecutionContext;
pub use executor::{ExecutionResult, FlowExecutor};
pub use flows::{FlowDraft, FlowRegistry, FlowUpdate};
pub use handler::{NodeHandler, NodeOutcome};
pub use memory::{MemoryExecutionLog, MemoryFlowStore};
pub use registry::{HandlerRegistry, HandlerSettings};
pub use run_log::RunLogger;
pub use scheduler::FlowScheduler;
