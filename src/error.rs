//! Error types for the render pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a page
#[derive(Error, Debug)]
pub enum Error {
    /// The renderer binary could not be launched
    #[error(transparent)]
    StartFailure(std::io::Error),

    /// The page failed to load, timed out, the renderer exited abnormally or
    /// wrote to standard error
    #[error("Unable to load")]
    UnableToLoad,

    /// Renderer output was not valid base64
    #[error("Failed to decode renderer output: {0}")]
    DecodeFailure(#[from] base64::DecodeError),

    /// The URL could not be turned into a cache/output path
    #[error("Cannot create filename: {0}")]
    PathFailure(String),

    /// Writing the image to disk failed
    #[error(transparent)]
    PersistFailure(std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Plumbing failure while talking to the renderer (pipes, wait)
    #[error("Renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is the load-failure sentinel
    pub fn is_unable_to_load(&self) -> bool {
        matches!(self, Error::UnableToLoad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unable_to_load_message() {
        assert_eq!(Error::UnableToLoad.to_string(), "Unable to load");
        assert!(Error::UnableToLoad.is_unable_to_load());
    }

    #[test]
    fn test_start_failure_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::StartFailure(io);
        assert_eq!(err.to_string(), "no such file");
        assert!(!err.is_unable_to_load());
    }
}
