//! Test utilities for storebench and its storage clients.
//!
//! This crate provides utilities to facilitate testing of the benchmark harness without real
//! storage backends. See the modules for all available utilities.

pub mod memory;
pub mod tracing;
pub mod webhdfs;
