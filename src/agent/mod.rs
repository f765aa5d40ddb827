#[path = "loop.rs"]
pub mod agent_loop;
pub mod events;
pub mod prompts;
pub mod runner;
pub mod service;

pub use agent_loop::{Agent, AgentResponse, ToolResultRecord};
pub use events::AgentEvent;
pub use runner::CachedRunner;
pub use service::ChatService;
