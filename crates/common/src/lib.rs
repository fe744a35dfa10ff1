//! Shared plumbing for the zerousb binaries
//!
//! Error type and tracing setup used by the command-line tool.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LogFormat, setup_logging, setup_logging_with};
