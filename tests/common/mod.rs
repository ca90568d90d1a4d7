//! Stand-in renderer scripts shared by the integration tests.
//!
//! Every script is written once, before any test spawns a process, so no
//! script is still open for writing when another thread forks (ETXTBSY).

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// base64 of the ten bytes "0123456789"
pub const TEN_BYTES_B64: &str = "MDEyMzQ1Njc4OQ==";

static STAND_INS: OnceLock<PathBuf> = OnceLock::new();

const SCRIPTS: &[(&str, &str)] = &[
    ("ok", "cat >/dev/null\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ=='"),
    ("fail-stdout", "cat >/dev/null\necho 'Unable to load'"),
    (
        "marker-and-payload",
        "cat >/dev/null\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ==' 'unable to load'",
    ),
    (
        "stderr-noise",
        "cat >/dev/null\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ=='\necho 'deprecated ssl protocol' >&2",
    ),
    ("fail-stderr", "cat >/dev/null\necho 'unable to load' >&2\nexit 1"),
    ("nonzero", "cat >/dev/null\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ=='\nexit 2"),
    ("garbage", "cat >/dev/null\necho 'not*base64*at*all'"),
    ("hang", "exec sleep 30"),
    // A wrapper that forks the real process instead of exec'ing it
    ("hang-wrapper", "sleep 30\necho wrapped"),
    ("empty", "cat >/dev/null"),
    (
        "record",
        "d=$(dirname \"$0\")\ncat > \"$d/record.stdin\"\nprintf '%s\\n' \"$@\" > \"$d/record.args\"\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ=='",
    ),
    (
        "counting",
        "d=$(dirname \"$0\")\necho spawn >> \"$d/counting.log\"\ncat >/dev/null\nprintf '%s\\n' 'MDEyMzQ1Njc4OQ=='",
    ),
];

/// Directory holding the stand-in scripts for this test binary
pub fn stand_in_dir() -> &'static Path {
    STAND_INS.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("pageshot-stand-ins-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create stand-in dir");
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write stand-in");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stand-in");
        }
        dir
    })
}

/// Path of a stand-in renderer, usable as `phantomjs_bin`
pub fn stand_in(name: &str) -> String {
    stand_in_dir().join(name).to_string_lossy().into_owned()
}

/// Fresh, empty scratch directory
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pageshot-it-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Number of processes the "counting" stand-in has started
pub fn counting_spawns() -> usize {
    fs::read_to_string(stand_in_dir().join("counting.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
