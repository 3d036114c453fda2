//! Tabular data extracted by the tools, and a small persistent store for it.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod store;
mod table;

pub use store::{StoreError, TableStore};
pub use table::{Table, dedupe_column_names};
