//! Render options and the defaults resolver
//!
//! `Options` is the sparse, caller-facing configuration. Every field has an
//! "unset" value (`0`, empty string, `None`) that `Options::resolve` replaces
//! with a fixed default, producing a `RenderRequest` the rest of the pipeline
//! can use without further checks.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::{Error, Result};

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SSL_PROTOCOL: &str = "sslv3";
pub const DEFAULT_PHANTOMJS_BIN: &str = "phantomjs";

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Png,
    Jpg,
}

impl Format {
    /// Normalize a user supplied format name. Matching is case-insensitive,
    /// "jpeg" maps to `Jpg` and anything unrecognized falls back to `Png`.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Format::Jpg,
            _ => Format::Png,
        }
    }

    /// Name passed to the renderer and used as file extension
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpg => "jpg",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Jpg => "image/jpeg",
            Format::Png => "image/png",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How output on the renderer's standard error is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StderrPolicy {
    /// Any standard error output fails the render
    #[default]
    Fatal,
    /// Only standard error output carrying the load-failure marker fails the render
    MarkerOnly,
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Sparse screenshot configuration
///
/// Zero numbers and empty strings mean "use the default". The struct can be
/// deserialized from JSON, in which case every field is optional.
///
/// # Examples
///
/// ```
/// let req = pageshot::Options {
///     url: "https://example.com".into(),
///     format: "JPEG".into(),
///     ..Default::default()
/// }
/// .resolve();
/// assert_eq!(req.format.as_str(), "jpg");
/// assert_eq!(req.viewport.width, 1024);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// URL to take the screenshot of
    pub url: String,
    /// Image width. Default 1024.
    pub width: u32,
    /// Image height. Default 768.
    pub height: u32,
    /// Image format, "png" or "jpg". Default "png".
    pub format: String,
    /// Clip the capture to the viewport. Default false.
    pub clip: bool,
    /// Settle delay and resource timeout in milliseconds. Default 5000.
    pub timeout_ms: u64,
    /// Pass `--ignore-ssl-errors=true` to the renderer
    pub ignore_ssl_errors: bool,
    /// Value for `--ssl-protocol`. Default "sslv3".
    pub ssl_protocol: String,
    /// Path to the phantomjs binary. Default "phantomjs".
    pub phantomjs_bin: String,
    /// Directory images are cached/saved in. Default is the working directory.
    pub dir: Option<PathBuf>,
    /// Cached images modified before this instant are stale
    #[serde(skip)]
    pub cache_cutoff: Option<SystemTime>,
    /// Alternative to `cache_cutoff`: maximum cache age in seconds
    pub max_age_secs: Option<u64>,
    pub stderr_policy: StderrPolicy,
}

impl Options {
    /// Options for a single URL with everything else defaulted
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read '{}': {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("cannot parse '{}': {}", path.display(), e)))
    }

    /// Fill in defaults. Total and side-effect free apart from reading the
    /// clock when only `max_age_secs` is set.
    pub fn resolve(&self) -> RenderRequest {
        let or_default = |s: &str, d: &str| {
            if s.is_empty() {
                d.to_string()
            } else {
                s.to_string()
            }
        };

        let cache_cutoff = self.cache_cutoff.or_else(|| {
            self.max_age_secs
                .and_then(|secs| SystemTime::now().checked_sub(Duration::from_secs(secs)))
        });

        RenderRequest {
            url: self.url.clone(),
            viewport: Viewport {
                width: if self.width == 0 { DEFAULT_WIDTH } else { self.width },
                height: if self.height == 0 { DEFAULT_HEIGHT } else { self.height },
            },
            format: Format::parse_lossy(&self.format),
            clip: self.clip,
            timeout_ms: if self.timeout_ms == 0 {
                DEFAULT_TIMEOUT_MS
            } else {
                self.timeout_ms
            },
            ignore_ssl_errors: self.ignore_ssl_errors,
            ssl_protocol: or_default(&self.ssl_protocol, DEFAULT_SSL_PROTOCOL),
            phantomjs_bin: or_default(&self.phantomjs_bin, DEFAULT_PHANTOMJS_BIN),
            dir: self.dir.clone(),
            cache_cutoff,
            stderr_policy: self.stderr_policy,
        }
    }
}

/// A fully resolved render request
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub url: String,
    pub viewport: Viewport,
    pub format: Format,
    pub clip: bool,
    pub timeout_ms: u64,
    pub ignore_ssl_errors: bool,
    pub ssl_protocol: String,
    pub phantomjs_bin: String,
    pub dir: Option<PathBuf>,
    pub cache_cutoff: Option<SystemTime>,
    pub stderr_policy: StderrPolicy,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Options::default().resolve()
    }
}

impl RenderRequest {
    /// Hard limit after which the watchdog kills the renderer
    pub fn kill_after(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.saturating_mul(2))
    }
}
