pub mod events;
pub mod macros;
pub mod registry;
pub mod schemas;
pub mod toolbelts;

pub use registry::{RegistryError, ToolError, ToolRegistry, UNKNOWN_TOOL_MARKER};
pub use schemas::{FunctionDefinition, ParameterSchema, Tool, ToolCapability, ToolSchema};
pub use toolbelts::Toolbelt;
