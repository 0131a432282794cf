//! Infrastructure adapters and runtime bootstrap.

pub mod cache_file;
pub mod error;
pub mod seed;
pub mod telemetry;
