//! Core types for conductor.

pub mod message;
pub mod tool;

pub use message::*;
pub use tool::*;
