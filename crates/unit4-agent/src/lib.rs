//! A question answering agent that browses Wikipedia, fetches web pages and
//! reads images, audio and spreadsheets.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to run the agent from your own programs.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
mod session;
pub mod tools;

pub use config::Config;
pub use session::{Session, SessionBuilder, SessionError};

/// Re-exports of [`unit4_agent_core`] crate.
pub mod core {
    pub use unit4_agent_core::*;
}
