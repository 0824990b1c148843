//! Tool abstractions and the built-in tool suite.
//!
//! Every agent capability is a [`Tool`] implementor: a name, a
//! description, a JSON Schema for its parameters, and an async `execute`.
//! Tools are collected into a [`ToolRegistry`], which handles name
//! dispatch and projects the registered set into the provider-neutral
//! [`ToolSchema`](crate::ToolSchema) records advertised to the model.
//!
//! # Submodules
//!
//! - [`core`] — [`Tool`] trait, [`ToolOutcome`], [`ToolRegistry`],
//!   argument parsing helpers.
//! - [`fs`] — `file_read`, `file_write`, `file_edit`, `file_delete`.
//! - [`search`] — `list_files`, `search_files`, `search_content`.
//! - [`shell`] — the `bash` tool (timeout-bounded `sh -c`).
//! - [`diff`] — plain-string previews for the confirmation prompt.

pub mod core;
pub mod diff;
pub mod fs;
pub mod search;
pub mod shell;

pub use core::{parse_args, Tool, ToolFuture, ToolOutcome, ToolRegistry};
pub use diff::{format_bash_command, format_delete_file, format_new_file, generate_unified_diff};
pub use fs::{DeleteTool, EditTool, ReadTool, WriteTool};
pub use search::{FileSearchTool, GrepTool, ListFilesTool};
pub use shell::BashTool;

use std::path::Path;

/// Register the built-in tool suite against a working directory.
pub fn register_builtin_tools(registry: &ToolRegistry, workdir: &Path) {
    registry.register(ReadTool::new(workdir));
    registry.register(WriteTool::new(workdir));
    registry.register(EditTool::new(workdir));
    registry.register(DeleteTool::new(workdir));
    registry.register(ListFilesTool::new(workdir));
    registry.register(FileSearchTool::new(workdir));
    registry.register(GrepTool::new(workdir));
    registry.register(BashTool::new(workdir));
}
