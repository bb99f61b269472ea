//! # xs-core
//!
//! Core types and traits for the xsec cross-section engine.
//!
//! Every other crate in the workspace reports failures through [`Error`] and
//! talks to the outside world (event files, histogram files, exposure
//! metadata) only through the traits defined in [`traits`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{EventSource, MetadataStore};
pub use types::{SourceKind, POT_USED};

/// Crate version, reported by `xsec --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
