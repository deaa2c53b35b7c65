//! Shared plumbing for the vacscoll crates.
//!
//! Holds the logging initialiser used by the binary and by integration tests.
//! Kept dependency-light so every crate in the workspace can pull it in.

pub mod observability;

pub use observability::{init_logging, LogConfig, LogFormat};
