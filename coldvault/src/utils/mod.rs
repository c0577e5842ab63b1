//! Shared error, cancellation and logging utilities.

pub mod cancel;
pub mod errors;
pub mod logger;

pub use errors::{CloudError, Result};
