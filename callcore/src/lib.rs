//! Platform-agnostic building blocks for point-to-point call signaling.
//!
//! Nothing in this crate depends on an async runtime. The tokio-driven
//! orchestration lives in the `peercall` crate.

pub mod error;
pub mod ice;
pub mod signaling;
pub mod types;

pub use error::CodecError;
