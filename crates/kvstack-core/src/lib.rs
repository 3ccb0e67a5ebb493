//! Core types shared across the kvstack crates.
//!
//! This crate defines the on-disk record frame used by the storage engine
//! and the error type every storage operation returns. It has no I/O of its
//! own; the store and the HTTP façade build on top of it.

pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::{Record, FRAME_OVERHEAD};
