//! Code-review system client.
//!
//! The controller only needs four calls from the review system: list open
//! changes, resolve a branch head, fetch commit metadata and post a review.

mod gerrit;
mod types;

pub use gerrit::GerritClient;
pub use types::*;
