//! Mailbox queries

pub mod threads;

pub use threads::{ThreadPages, build_query, list_threads};
