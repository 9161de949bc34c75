// Data structures (schemas) for descriptors, platform, cache and results.

pub mod cache_file;
pub mod config;
pub mod platform;
pub mod results;
pub mod tools;
