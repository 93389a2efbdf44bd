//! Generation engine adapters.

pub mod claude_cli;
pub mod test_writer;

pub use claude_cli::{ClaudeCliConfig, ClaudeCliEngine};
pub use test_writer::TestWriter;
