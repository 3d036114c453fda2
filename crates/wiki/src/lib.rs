//! Fetches Wikipedia pages and turns them into plain text plus tables.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod extract;
mod table;

pub use client::{WikiClient, WikiError};
pub use extract::{WikiPage, extract_page};
