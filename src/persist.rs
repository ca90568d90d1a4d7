//! Writing rendered images to disk

use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` and return the absolute path written.
///
/// The data goes to a temporary file in the target directory first and is
/// renamed into place, so concurrent readers see either the old file or the
/// complete new one. The file is readable by everyone, writable by the owner.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let path = absolute(path)?;
    let dir = path
        .parent()
        .ok_or_else(|| Error::PathFailure(format!("'{}' has no parent directory", path.display())))?;
    fs::create_dir_all(dir).map_err(Error::PersistFailure)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::PathFailure(format!("'{}' has no file name", path.display())))?;
    let tmp = dir.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = write_file(&tmp, bytes).and_then(|_| fs::rename(&tmp, &path)) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::PersistFailure(e));
    }

    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(Error::PersistFailure)?;
    Ok(cwd.join(path))
}
