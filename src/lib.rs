//! Command-line front end for building and inspecting flat APT repositories.

pub mod config;
pub mod logging;
