//! Core types shared across oscup.
//!
//! Currently this is the error layer: the [`UpgradeError`] taxonomy every
//! component reports through, and the [`ErrorContext`] wrapper the CLI uses
//! to render failures with actionable suggestions.

pub mod error;

pub use error::{ErrorContext, UpgradeError, user_friendly_error};
