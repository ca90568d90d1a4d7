//! On-disk image cache
//!
//! Artifacts are named `<host>-<digest>.<ext>`. The digest covers the full URL
//! together with the viewport and clip flag, so differently sized renders of
//! the same page never share a file. The format is the extension.

use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::options::RenderRequest;
use crate::{Error, Result};

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Fresh artifact found
    Hit(Vec<u8>),
    /// No usable artifact
    Miss,
    /// Artifact existed but was older than the cutoff and has been removed
    Stale,
}

/// Digest identifying a render of `req.url` with the request's geometry
pub fn digest(req: &RenderRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.url.as_bytes());
    hasher.update(b"\n");
    hasher.update(format!("{}x{}", req.viewport.width, req.viewport.height).as_bytes());
    hasher.update(if req.clip { b"\nclip" } else { b"\nfull" });
    hex::encode(hasher.finalize())
}

/// Deterministic file name for a request
pub fn file_name(req: &RenderRequest) -> Result<String> {
    let parsed = url::Url::parse(&req.url)
        .map_err(|e| Error::PathFailure(format!("'{}' is not a valid URL: {}", req.url, e)))?;

    let host = match (parsed.host_str(), parsed.port()) {
        (Some(h), Some(port)) => format!("{}_{}", sanitize(h), port),
        (Some(h), None) if !h.is_empty() => sanitize(h),
        _ => "local".to_string(),
    };

    Ok(format!("{}-{}.{}", host, digest(req), req.format.extension()))
}

/// Full artifact path: the configured directory or the working directory
pub fn artifact_path(req: &RenderRequest) -> Result<PathBuf> {
    let name = file_name(req)?;
    let dir = match &req.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| Error::PathFailure(format!("no working directory: {}", e)))?,
    };
    Ok(dir.join(name))
}

/// Look up an artifact. Anything not at least as new as `cutoff` is removed;
/// without a cutoff nothing is ever fresh.
pub fn lookup(path: &Path, cutoff: Option<SystemTime>) -> Lookup {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Lookup::Miss,
    };

    let fresh = match (cutoff, meta.modified()) {
        (Some(cutoff), Ok(modified)) => modified >= cutoff,
        _ => false,
    };

    if !fresh {
        debug!("removing stale cache entry {}", path.display());
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to remove stale cache entry {}: {}", path.display(), e);
        }
        return Lookup::Stale;
    }

    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => {
            debug!("cache hit {}", path.display());
            Lookup::Hit(bytes)
        }
        Ok(_) => Lookup::Miss,
        Err(e) => {
            warn!("failed to read cache entry {}: {}", path.display(), e);
            Lookup::Miss
        }
    }
}

fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
