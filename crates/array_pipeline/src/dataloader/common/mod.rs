//! src/dataloader/common/mod.rs
//!
//! Utilities shared by the consumer-side iterator and the fetch workers.

pub mod thread;
