//! The tools module provides helpers shared by the coders and containers.
//!
//! The tools are:
//! - cli: Options structs and the command line interface.
//! - control: Progress reporting, pause and cancellation.
//! - freq_count: Byte frequency count, in parallel for large blocks.
//!
pub mod cli;
pub mod control;
pub mod freq_count;
