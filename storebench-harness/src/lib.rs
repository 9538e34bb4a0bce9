//! The storebench benchmark harness.
//!
//! This drives the clients of [`storebench_backends`] through repeated sweeps over a dataset of
//! sample files, records one result row per file and backend, and turns the collected rows into
//! summaries and charts:
//!
//! - [`experiment`] runs a single sweep,
//! - [`runs`] repeats sweeps and combines their CSV files,
//! - [`analysis`] computes group statistics and renders [`charts`].
#![warn(missing_debug_implementations)]

pub mod analysis;
pub mod backends;
pub mod charts;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod experiment;
pub mod observability;
pub mod pacing;
pub mod record;
pub mod report;
pub mod runs;
pub mod stats;
