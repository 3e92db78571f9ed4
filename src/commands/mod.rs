//! CLI command implementations for herakles-jvmtop.
//!
//! - `generate-scenario`: synthetic scenario files for the replay backend
//! - `sysinfo`: host information shown in the top bar

pub mod generate;
pub mod sysinfo;

pub use generate::command_generate_scenario;
pub use sysinfo::command_sysinfo;
