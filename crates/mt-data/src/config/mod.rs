//! Import configuration module

pub mod import_config;
pub mod null_handling;

pub use import_config::*;
pub use null_handling::*;
