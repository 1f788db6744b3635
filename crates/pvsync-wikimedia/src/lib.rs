//! pvsync-wikimedia: Wikimedia hourly pageview dumps
//!
//! Remote source adapter (dump URL layout, hourly candidates, HTTP or
//! local-mirror fetch) and the parser for the space-separated pageview
//! line format.

pub mod domain;
pub mod parser;
pub mod source;

pub use domain::{DomainCode, decompose};
pub use parser::PageviewParser;
pub use source::{LocalMirror, WikimediaSource, dump_path};
