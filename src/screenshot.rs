//! The render pipeline
//!
//! cache lookup -> script -> renderer process -> output classification ->
//! optional persistence. Nothing is retained between calls apart from files in
//! the cache directory.

use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

use crate::cache::{self, Lookup};
use crate::options::{Format, Options, RenderRequest};
use crate::runner::{Invocation, ProcessRunner, Runner};
use crate::{output, persist, Error, RenderResult, Result};

/// A screenshot of one URL with fully resolved options
///
/// # Examples
///
/// ```no_run
/// use pageshot::{Options, Screenshot};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let shot = Screenshot::new(Options::for_url("https://example.com"));
/// let path = shot.save()?;
/// println!("saved {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Screenshot<R = ProcessRunner> {
    request: RenderRequest,
    runner: R,
}

impl Screenshot<ProcessRunner> {
    /// Resolve `options` and render with the real renderer binary
    pub fn new(options: Options) -> Self {
        Self::with_runner(options, ProcessRunner)
    }
}

impl<R: Runner> Screenshot<R> {
    /// Resolve `options` and render through a custom runner
    pub fn with_runner(options: Options, runner: R) -> Self {
        Self {
            request: options.resolve(),
            runner,
        }
    }

    /// Replace the URL to capture
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.request.url = url.into();
        self
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    pub fn format(&self) -> Format {
        self.request.format
    }

    pub fn content_type(&self) -> &'static str {
        self.request.format.content_type()
    }

    /// Cache/output path for this screenshot
    pub fn path(&self) -> Result<PathBuf> {
        cache::artifact_path(&self.request)
    }

    /// Cached bytes, if a fresh artifact exists. Stale artifacts are removed.
    pub fn cached(&self) -> Option<Vec<u8>> {
        let path = match self.path() {
            Ok(path) => path,
            Err(e) => {
                debug!("cache disabled for this request: {}", e);
                return None;
            }
        };
        match cache::lookup(&path, self.request.cache_cutoff) {
            Lookup::Hit(bytes) => Some(bytes),
            Lookup::Miss | Lookup::Stale => None,
        }
    }

    /// Image bytes, from the cache when fresh, otherwise freshly rendered
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.fetch().map(|(bytes, _)| bytes)
    }

    /// Image bytes plus content type
    pub fn render(&self) -> Result<RenderResult> {
        let (bytes, from_cache) = self.fetch()?;
        Ok(self.result(bytes, from_cache, None))
    }

    /// Render (or reuse the cache) and write the image to its cache path.
    /// Returns the absolute path.
    pub fn save(&self) -> Result<PathBuf> {
        let (bytes, from_cache) = self.fetch()?;
        self.store(&bytes, from_cache)
    }

    /// Like `render`, additionally persisting the image when an output
    /// directory is configured. A URL that yields no path is still rendered.
    pub fn render_and_store(&self) -> Result<RenderResult> {
        let (bytes, from_cache) = self.fetch()?;
        let path = match &self.request.dir {
            Some(_) => match self.store(&bytes, from_cache) {
                Ok(path) => Some(path),
                Err(Error::PathFailure(reason)) => {
                    debug!("not persisting: {}", reason);
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        Ok(self.result(bytes, from_cache, path))
    }

    fn store(&self, bytes: &[u8], from_cache: bool) -> Result<PathBuf> {
        let path = self.path()?;
        if from_cache {
            // Rewriting would refresh the mtime and extend the entry's life.
            return Ok(path);
        }
        persist::write_atomic(&path, bytes)
    }

    fn fetch(&self) -> Result<(Vec<u8>, bool)> {
        if let Some(bytes) = self.cached() {
            return Ok((bytes, true));
        }
        if self.request.url.is_empty() {
            return Err(Error::ConfigError("a URL is required".into()));
        }

        let started = Instant::now();
        let invocation = Invocation::for_request(&self.request);
        let captured = self.runner.run(&invocation)?;
        let bytes = output::classify(&captured, self.request.stderr_policy)?;

        info!(
            "rendered {} ({} bytes {}) in {}ms",
            self.request.url,
            bytes.len(),
            self.request.format,
            started.elapsed().as_millis()
        );
        Ok((bytes, false))
    }

    fn result(&self, bytes: Vec<u8>, from_cache: bool, path: Option<PathBuf>) -> RenderResult {
        RenderResult {
            bytes,
            content_type: self.content_type(),
            format: self.request.format,
            from_cache,
            path,
        }
    }
}
