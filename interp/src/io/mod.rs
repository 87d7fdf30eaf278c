//! I/O helpers: persistence, configuration, child processes, and the web.

pub mod bindings_store;
pub mod config;
pub mod fetch;
pub mod memory_store;
pub mod process;
pub mod prompt;
