//! Trait definitions for the device connection.
//!
//! The session core is written against these traits so it can run against
//! a real socket or the in-process mock in [`crate::hal`].
//!
//! - [`Connector`]: opens a connection
//! - [`Transport`]: one open connection carrying text frames

pub mod transport;

pub use transport::*;
