//! Configuration loading helpers
//!
//! Runtime configuration comes from environment variables; this module wraps
//! the parsing with consistent error reporting.

pub mod env;

pub use env::{get_env, get_env_bool, get_env_or, get_env_parse, get_env_parse_or};
