//! Deterministic, pure logic shared by the handlers.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod autoprint;
pub mod block;
pub mod file_command;
pub mod invariants;
pub mod line_range;
pub mod plan;
