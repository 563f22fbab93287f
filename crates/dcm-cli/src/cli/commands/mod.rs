//! CLI command handlers. Each command is in its own file.

mod classify;
mod completions;
mod config;
mod man;
mod schedule;
mod simulate;

pub use classify::run_classify;
pub use completions::run_completions;
pub use config::run_config;
pub use man::run_man;
pub use schedule::run_schedule;
pub use simulate::run_simulate;
