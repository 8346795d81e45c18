//! Configuration system for the code runner
//!
//! Loads the YAML configuration, fills in defaults and validates it before
//! anything touches the container substrate.

pub mod loader;
pub mod types;

#[cfg(test)]
mod tests;

pub use loader::ConfigLoader;
pub use types::*;
