//! Unified error types for favik.
//!
//! Only malformed input is an error. A favicon that cannot be found is
//! an expected outcome and surfaces as the configured default value,
//! never as a variant here.

/// Unified error types for favicon resolution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input cannot be parsed as an absolute http(s) URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Neither an override URL nor a configured URL was provided.
    #[error("no URL configured and none provided")]
    NoUrl,

    /// The HTTP client could not be constructed.
    #[error("http error: {0}")]
    Http(String),
}
