//! Workflow integration tests
//!
//! Each test drives the binary through a sequence of commands and checks
//! both the printed output and the files left on disk.

pub mod configuration;
pub mod lifecycle;
