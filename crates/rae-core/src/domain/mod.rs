//! Domain-level errors and validation shared by every RAE subsystem.
//!
//! - `RaeError`: the engine-wide error taxonomy
//! - `ValidationError`: structured detail for rejected input
//! - `validation`: range, window and scope checks

pub mod error;
pub mod validation;

pub use error::{RaeError, RaeResult, ValidationError};
