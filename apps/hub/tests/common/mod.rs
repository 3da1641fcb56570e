//! Common test utilities for hub integration tests
//!
//! Connections are plain channels registered with the connection manager,
//! so the relay can be driven without opening sockets.

#![allow(unused_imports)]

pub mod helpers;

pub use helpers::*;
