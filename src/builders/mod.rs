//! # Builders
//!
//! - [`context_builder`] - configures and validates a [`CipherContext`](crate::CipherContext)
//!
//! Builders start from safe defaults (no padding, full engine chunk size) and
//! reject inconsistent combinations at `build()` time rather than mid-stream.

pub mod context_builder;

pub use context_builder::CipherContextBuilder;
