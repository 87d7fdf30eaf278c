//! Executes instructions embedded in generated text.
//!
//! Text from a language model is scanned for tagged blocks (code fences, file
//! commands, plans, questions) and the first block a handler recognizes is
//! run. The result is output text plus a stop flag telling the caller loop
//! whether to wait for the user. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (block recognition, line ranges,
//!   outline structuring, auto-print). No I/O.
//! - **[`io`]**: Side-effecting operations (persistence, processes, HTTP).
//! - **[`script`]**: The embedded scripting language behind `python` blocks.
//! - **[`handlers`]**: The handler protocol and the dispatcher.
//!
//! [`runtime`] wires config and persisted state into a ready registry for the
//! CLI.

pub mod core;
pub mod exit_codes;
pub mod handlers;
pub mod io;
pub mod logging;
pub mod memory;
pub mod runtime;
pub mod script;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
