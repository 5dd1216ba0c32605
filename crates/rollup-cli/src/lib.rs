//! Command-line front end for the rollup engine.
//!
//! Reads a CSV file (or stdin), groups it by one or more grouping specs and prints the result
//! sets as tab-separated text or JSON.

pub mod cli;
mod render;
