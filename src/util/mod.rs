//! Shared utilities for `offtrac`.
//!
//! - Time conversion between the wire format and epoch milliseconds
//! - Progress indicators for long remote fetches

pub mod progress;
pub mod time;
