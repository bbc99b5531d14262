//! Testing utilities and mock implementations
//!
//! This module provides a scripted broker transport for testing the bridge
//! without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
