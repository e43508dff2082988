//! Built-in tools registered under the `core` origin.
//!
//! Each tool is a self-contained module implementing the Tool trait and is
//! listed in `create_core_tools()` in ../lib.rs.

pub mod scratchpad;
pub mod search;
