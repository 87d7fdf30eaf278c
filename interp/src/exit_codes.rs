//! Stable exit codes for interp CLI commands.

/// Command succeeded; for `dispatch`, the conversation may continue.
pub const OK: i32 = 0;
/// Command failed due to invalid config, persisted state, or arguments.
pub const INVALID: i32 = 1;
/// `interp dispatch` consumed a block that waits for user input.
pub const STOP: i32 = 2;
