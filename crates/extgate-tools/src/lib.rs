//! Extgate Tools — the dispatch table and the gateway's built-in tools
//!
//! Built-ins are self-contained files in src/tools/ implementing the Tool
//! trait. To add one: create the file, implement Tool, list it below.

pub mod context;
pub mod registry;
pub mod schema;
pub mod tools;

pub use context::{Scratchpad, ToolContext};
pub use registry::{
    is_core, DispatchTable, HandlerResult, Invocation, Tool, ToolDefinition, ToolEntry,
    ToolHandler, ToolOutput, ToolSpec, DEFAULT_BLOCKING_LIMIT,
};

/// The `core` tool set. Register these before any plugin so they cannot
/// be shadowed.
pub fn create_core_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::from_tool(tools::search::SearchTool::new()),
        ToolSpec::from_tool(tools::scratchpad::ScratchpadSetTool),
        ToolSpec::from_tool(tools::scratchpad::ScratchpadGetTool),
        ToolSpec::from_tool(tools::scratchpad::ScratchpadDeleteTool),
        ToolSpec::from_tool(tools::scratchpad::ScratchpadListTool),
    ]
}

/// Dispatch table pre-loaded with the core tools.
pub fn create_dispatch_table(timeout: std::time::Duration) -> DispatchTable {
    let table = DispatchTable::new(timeout);
    table.register_all(extgate_core::CORE_ORIGIN, create_core_tools());
    table
}
