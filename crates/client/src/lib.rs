//! Client code for favik.
//!
//! This crate provides the URL normalizer, the HTTP transport, HTML
//! icon extraction, and the favicon resolver that ties them together.

pub mod extract;
pub mod fetch;
pub mod resolver;

pub use extract::{DomHeadExtractor, HeadExtractor, LinkCandidate, extract_head, link_candidates, select_icon};
pub use fetch::url::{UrlError, base_url};
pub use fetch::{HttpTransport, Location, RawHeader, Transport, TransportConfig};
pub use resolver::{HttpProbeResult, OutputMode, Resolved, Resolver};
