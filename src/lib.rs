// src/lib.rs

//! # aes-stream-core
//!
//! The buffering layer that sits between an update/do-final cipher API and an AES
//! block engine. It gathers arbitrary-length input across calls, enforces the
//! per-mode alignment rules, pads and unpads PKCS#7 blocks, and hands the engine
//! nothing but block-granular work.
//!
//! The engine itself is a collaborator ([`AesEngine`]); [`SoftwareEngine`] is a
//! reference implementation over the RustCrypto `aes` crate.

pub mod algorithm;
pub mod aliases;
#[cfg(feature = "batch-ops")]
pub mod batch_ops;
pub mod builders;
pub mod consts;
pub mod engine;
pub mod error;
pub mod stream;
pub mod utils;

// High-level API
pub use algorithm::{Algorithm, Direction, Padding};
pub use builders::CipherContextBuilder;
pub use engine::shared::SharedEngine;
pub use engine::soft::SoftwareEngine;
pub use engine::{AeadTag, AesEngine, EngineCall};
pub use error::CipherError;
pub use stream::{CipherContext, StreamState};

#[cfg(feature = "batch-ops")]
pub use batch_ops::finalize_batch;
