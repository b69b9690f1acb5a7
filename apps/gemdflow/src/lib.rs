//! # gemdflow
//!
//! Command line collaborator for gemdflow-core: store setup, file
//! watching driven by a TOML rules file, and graph dumps.

pub mod cli;
pub mod rules;
