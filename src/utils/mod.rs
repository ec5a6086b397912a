//! Utils Module - Helper functions shared by the API and the worker

pub mod hosts;
pub mod ints;

pub use hosts::*;
pub use ints::*;
