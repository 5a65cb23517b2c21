//! Host-side helpers.
//!
//! - [`app_data`] - configuration and data directory (XDG-compliant)
//! - [`progress`] - optional progress bar for long scans

pub mod app_data;
pub mod progress;

pub use app_data::*;
