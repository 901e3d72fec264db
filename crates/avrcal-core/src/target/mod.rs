//! Supported targets
//!
//! This module provides the descriptor type for calibratable parts, the
//! compiled-in registry of known signatures and the instrumentation images
//! that go with them.

mod database;
pub mod images;
mod types;

pub use database::*;
pub use types::*;
