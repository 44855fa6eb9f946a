//! Builtin tools

mod glob;
mod grep;
mod handoff;
mod list_directory;
mod read_file;
mod run_command;
mod write_file;

pub use glob::GlobTool;
pub use grep::GrepTool;
pub use handoff::HandoffTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use write_file::WriteFileTool;
