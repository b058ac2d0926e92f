//! TurtleDex Node Library.
//!
//! Drives the consensus set from the command line: importing and exporting blocks,
//! inspecting the ledger and following the change feed.

mod cli;
mod commands;
mod error;

pub use self::cli::run;
pub use self::error::{Error, Result};
