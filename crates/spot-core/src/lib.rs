//! Shared types for the spot-capacity control plane.
//!
//! Every other crate in the workspace depends on `spot-core` for the data
//! model (§3), the error taxonomy (§7), pool-id parsing (§6.3), and
//! process-wide configuration (§6.5).

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod pool;

pub use error::{Error, Result};
pub use pool::PoolId;
