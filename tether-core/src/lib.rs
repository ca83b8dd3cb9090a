//! Data model and error types shared across the tether workspace.

pub mod error;
pub mod models;

pub use error::{Result, TetherError};
pub use models::{Outcome, ProcessResult, ProcessSpec};
