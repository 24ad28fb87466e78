//! Core types and shared functionality for favik.
//!
//! This crate provides:
//! - File-backed favicon cache keyed by URL hash
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStore, FileCache};
pub use config::AppConfig;
pub use error::Error;
