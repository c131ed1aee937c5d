//! Motorsport ICS Core Library
//!
//! Collects motorsport session listings from several sources, resolves their
//! free-text dates, categories and venues, merges duplicates and emits a
//! deterministic iCalendar file for one race weekend.

pub mod category;
pub mod collector;
pub mod config;
pub mod datetime;
pub mod dedup;
pub mod error;
pub mod ics;
pub mod location;
pub mod observer;
pub mod pipeline;
pub mod similarity;
pub mod sources;
pub mod text;
pub mod types;
pub mod window;

#[cfg(test)]
mod testing;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        category::*, collector::*, config::*, datetime::*, dedup::*, ics::*, location::*,
        observer::*, pipeline::*, similarity::*, sources::*, types::*, window::*,
    };
}
