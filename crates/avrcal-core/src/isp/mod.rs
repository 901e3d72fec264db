//! In-circuit serial programming
//!
//! This module defines the link trait that programmer backends implement,
//! the instruction bytes of the AVR serial programming set, and the
//! `Programmer`/`Session` pair that issues them.

mod engine;
pub mod link;
pub mod opcodes;

pub use engine::{Programmer, Session, SessionState};
pub use link::{bitbang, IspLink, Lines};
