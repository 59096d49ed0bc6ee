// src/stream/mod.rs

//! The update/do-final buffering pipeline.
//!
//! Leaves first: [`chunk`] splits work to the engine ceiling, [`padding`] is
//! PKCS#7, [`alignment`] decides the do-final policy, [`gather`] carries
//! sub-block bytes between calls, [`last_block`] produces the final block and
//! [`context`] orchestrates them.

pub mod alignment;
pub mod chunk;
pub mod context;
pub mod gather;
pub mod last_block;
pub mod padding;

pub use alignment::{AlignmentChecker, AlignmentPolicy};
pub use chunk::ChunkSplitter;
pub use context::{CallState, CipherContext, StreamState};
pub use gather::GatherBuffer;
pub use last_block::LastBlockHandler;
pub use padding::{pkcs7_pad, pkcs7_unpad};
