//! Core Module - Task registry and worker

pub mod registry;
pub mod worker;

pub use registry::*;
pub use worker::*;
