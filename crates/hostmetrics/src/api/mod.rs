//! API route handlers

pub mod error;
pub mod metrics;
pub mod system;

pub use error::AppError;
