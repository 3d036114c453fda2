//! An abstraction layer for the LLMs the agent talks to.
//!
//! This crate establishes a unified protocol between the agent and the
//! model gateways it can use, so that switching between models (or
//! between a real gateway and a scripted fake) never touches the agent
//! loop itself.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
