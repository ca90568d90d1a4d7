//! pageshot
//!
//! Render web pages to PNG or JPEG images by driving a headless PhantomJS
//! process. The crate composes the control script, runs the renderer with a
//! hard time limit, classifies its textual output and decodes the image. Images
//! can optionally be cached on disk keyed by URL and served over HTTP.
//!
//! # Features
//!
//! - **server** (default): a small `tiny_http` adapter exposing `render` over HTTP
//! - **async**: a tokio-friendly wrapper around the blocking pipeline
//!
//! # Example
//!
//! ```no_run
//! use pageshot::Options;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let result = pageshot::render(Options {
//!     url: "https://example.com".to_string(),
//!     width: 1280,
//!     height: 720,
//!     format: "jpg".to_string(),
//!     ..Default::default()
//! })?;
//! println!("{} bytes of {}", result.bytes.len(), result.content_type);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

pub mod cache;
pub mod options;
pub mod output;
pub mod persist;
pub mod runner;
pub mod screenshot;
pub mod script;

// HTTP adapter over `render`
#[cfg(feature = "server")]
pub mod server;

// Async-friendly wrapper (worker thread + oneshot)
#[cfg(feature = "async")]
pub mod async_api;

pub use options::{Format, Options, RenderRequest, StderrPolicy, Viewport};
pub use runner::{Captured, Invocation, ProcessRunner, Runner};
pub use screenshot::Screenshot;

/// A rendered image
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    /// Raw image bytes in `format`
    pub bytes: Vec<u8>,
    /// "image/png" or "image/jpeg"
    pub content_type: &'static str,
    pub format: Format,
    /// Whether the bytes came from the on-disk cache
    pub from_cache: bool,
    /// Where the image was persisted, if it was
    pub path: Option<PathBuf>,
}

/// Render a page to image bytes with the real renderer.
///
/// Fresh cached artifacts are reused; nothing is written to disk.
pub fn render(options: Options) -> Result<RenderResult> {
    Screenshot::new(options).render()
}

/// Render a page and save it under its cache path, returning the absolute path.
pub fn save(options: Options) -> Result<PathBuf> {
    Screenshot::new(options).save()
}
