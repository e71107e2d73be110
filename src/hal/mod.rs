//! Transport implementations.
//!
//! Concrete implementations of the traits in [`crate::traits`]:
//!
//! - `mock`: in-process scripted device for tests and demos
//! - `tcp`: tokio TCP socket with delimiter framing

pub mod mock;
pub mod tcp;

pub use mock::*;
pub use tcp::*;
