//! Classification and decoding of renderer output
//!
//! The renderer has no structured status channel: success is a base64 image on
//! stdout, failure is the "unable to load" marker, a non-zero exit or output on
//! stderr.

use base64::Engine as Base64Engine;
use log::{debug, warn};

use crate::options::StderrPolicy;
use crate::runner::Captured;
use crate::script::UNABLE_TO_LOAD_MARKER;
use crate::{Error, Result};

/// Case-insensitive search for the load-failure marker
pub fn contains_failure_marker(text: &str) -> bool {
    let marker = UNABLE_TO_LOAD_MARKER.as_bytes();
    text.as_bytes()
        .windows(marker.len())
        .any(|w| w.eq_ignore_ascii_case(marker))
}

/// Turn captured process output into image bytes or a typed error
pub fn classify(captured: &Captured, policy: StderrPolicy) -> Result<Vec<u8>> {
    if captured.killed {
        return Err(Error::UnableToLoad);
    }

    if !captured.exited_cleanly() {
        debug!("renderer exited with {:?}", captured.status);
        return Err(Error::UnableToLoad);
    }

    if !captured.stderr.is_empty() {
        let fatal = match policy {
            StderrPolicy::Fatal => true,
            StderrPolicy::MarkerOnly => contains_failure_marker(&captured.stderr),
        };
        if fatal {
            warn!("renderer wrote to stderr: {}", captured.stderr.trim());
            return Err(Error::UnableToLoad);
        }
        debug!("ignoring renderer stderr: {}", captured.stderr.trim());
    }

    decode(&captured.stdout)
}

/// Decode the renderer's stdout. The marker check runs before any decoding.
pub fn decode(stdout: &str) -> Result<Vec<u8>> {
    if contains_failure_marker(stdout) {
        return Err(Error::UnableToLoad);
    }

    // console.log terminates the payload with a newline
    let payload: String = stdout.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    if payload.is_empty() {
        debug!("renderer produced no output");
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.as_bytes())?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn captured(stdout: &str, stderr: &str) -> Captured {
        Captured {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: None,
            killed: false,
        }
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        assert!(contains_failure_marker("unable to load"));
        assert!(contains_failure_marker("Unable To Load the page"));
        assert!(contains_failure_marker("xxUNABLE TO LOADxx"));
        assert!(!contains_failure_marker("unable to lo"));
        assert!(!contains_failure_marker(""));
    }

    #[test]
    fn test_decode_roundtrip_with_trailing_newline() {
        let payload = b"\x89PNG\r\n\x1a\n\x00\x01";
        let out = format!("{}\n", b64(payload));
        assert_eq!(decode(&out).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_marker_wins_over_valid_base64() {
        let out = format!("{}\nUnable to load\n", b64(b"0123456789"));
        assert!(decode(&out).unwrap_err().is_unable_to_load());
    }

    #[test]
    fn test_invalid_base64_is_decode_failure() {
        match decode("this is not base64!") {
            Err(Error::DecodeFailure(_)) => {}
            other => panic!("expected DecodeFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_output_decodes_to_zero_bytes() {
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode("\n").unwrap(), Vec::<u8>::new());
        assert_eq!(classify(&captured("", ""), StderrPolicy::Fatal).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_stderr_is_fatal_by_default() {
        let c = captured(&b64(b"ok"), "some warning");
        assert!(classify(&c, StderrPolicy::Fatal).unwrap_err().is_unable_to_load());
    }

    #[test]
    fn test_marker_only_policy_tolerates_noise() {
        let c = captured(&b64(b"ok"), "some warning");
        assert_eq!(classify(&c, StderrPolicy::MarkerOnly).unwrap(), b"ok".to_vec());

        let c = captured(&b64(b"ok"), "unable to load\n");
        assert!(classify(&c, StderrPolicy::MarkerOnly).unwrap_err().is_unable_to_load());
    }

    #[test]
    fn test_killed_is_load_failure() {
        let mut c = captured(&b64(b"ok"), "");
        c.killed = true;
        assert!(classify(&c, StderrPolicy::Fatal).unwrap_err().is_unable_to_load());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_load_failure() {
        use std::os::unix::process::ExitStatusExt;
        let mut c = captured(&b64(b"ok"), "");
        c.status = Some(std::process::ExitStatus::from_raw(1 << 8));
        assert!(classify(&c, StderrPolicy::Fatal).unwrap_err().is_unable_to_load());

        c.status = Some(std::process::ExitStatus::from_raw(0));
        assert_eq!(classify(&c, StderrPolicy::Fatal).unwrap(), b"ok".to_vec());
    }
}
