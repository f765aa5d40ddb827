pub mod registry;

pub use registry::{
    ParamKind, ToolDefinition, ToolParameter, ToolRegistry, default_registry,
};
