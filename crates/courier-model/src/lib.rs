//! Plain data types shared by every courier crate.
//!
//! Nothing in here owns a lock or a runtime: identifiers, task state,
//! lifecycle events, verification reports and subscription outcomes.

mod domain;
pub use domain::*;
