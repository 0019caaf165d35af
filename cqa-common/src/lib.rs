//! # CQA Common Library
//!
//! Shared code for the CQA workspace:
//! - Error and result types
//! - Bootstrap TOML configuration and platform path resolution
//! - Logging configuration

pub mod config;
pub mod error;

pub use error::{Error, Result};
