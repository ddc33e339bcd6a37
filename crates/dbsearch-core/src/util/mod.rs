//! Utility modules.
//!
//! # Modules
//!
//! - [`ids`]: SQL identifier sanitization and truncation

pub mod ids;
