//! Thread-safe memoizing cache with no eviction and no expiration.
//!
//! See [`Cache`] for the fill and retry semantics.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod cache;

pub use cache::Cache;
