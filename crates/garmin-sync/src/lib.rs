pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod sync;

pub use error::{Result, SyncError};
