//! Worker management for parallel batch assembly.
//!
//! - `pool`: Generic worker pool (threads, channels, shutdown)
//! - `fetch`: Fetch workers that turn index-groups into batches

pub(crate) mod fetch;
pub(crate) mod pool;
