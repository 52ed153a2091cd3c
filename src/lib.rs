//! `offtrac`: an offline mirror of a Trac issue tracker.
//!
//! The tracker is pulled into a directory of JSON documents versioned with
//! git ([`snapshot`], [`sync`]), then loaded into a `SQLite` database
//! ([`index`], [`storage`]) where stored reports can be run ([`format`]).

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod logging;
pub mod model;
pub mod remote;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{ErrorCode, OfftracError, Result, StructuredError};
