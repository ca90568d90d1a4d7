//! Renderer process supervision
//!
//! `ProcessRunner` launches the renderer, feeds the control script on stdin,
//! drains stdout/stderr on helper threads and arms a watchdog that kills the
//! child once the hard limit passes. The child handle lives behind an
//! `Arc<Mutex<_>>` so the watchdog thread can reach it while the caller waits.

use log::{debug, warn};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::options::RenderRequest;
use crate::{script, Error, Result};

/// First argument: tells phantomjs to read the script from standard input
pub const STDIN_MARKER: &str = "/dev/stdin";

// Interval between exit checks while the child is running.
const REAP_POLL: Duration = Duration::from_millis(5);

// How long the output pipes may stay open after the child has been reaped.
// Past this, whatever is left in the child's process group is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Everything needed to launch one renderer process
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Control script written to the child's stdin
    pub script: String,
    /// The watchdog kills the child after this long
    pub kill_after: Duration,
}

impl Invocation {
    pub fn for_request(req: &RenderRequest) -> Self {
        Self {
            program: req.phantomjs_bin.clone(),
            args: renderer_args(req),
            script: script::compose(req),
            kill_after: req.kill_after(),
        }
    }
}

/// Command line arguments for the renderer
pub fn renderer_args(req: &RenderRequest) -> Vec<String> {
    let mut args = vec![STDIN_MARKER.to_string()];
    if req.ignore_ssl_errors {
        args.push("--ignore-ssl-errors=true".to_string());
    }
    if !req.ssl_protocol.is_empty() {
        args.push(format!("--ssl-protocol={}", req.ssl_protocol));
    }
    args
}

/// Output captured from a finished (or killed) renderer
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the exit status is unknown (e.g. a stand-in runner)
    pub status: Option<ExitStatus>,
    /// Whether the watchdog fired
    pub killed: bool,
}

impl Captured {
    /// Clean exit: not killed, and a zero status when one is known
    pub fn exited_cleanly(&self) -> bool {
        !self.killed && self.status.map_or(true, |s| s.success())
    }
}

/// Seam between the render pipeline and the external process
pub trait Runner {
    /// Run the renderer once and capture its output
    fn run(&self, invocation: &Invocation) -> Result<Captured>;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, invocation: &Invocation) -> Result<Captured> {
        (**self).run(invocation)
    }
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn run(&self, invocation: &Invocation) -> Result<Captured> {
        (**self).run(invocation)
    }
}

/// Runs the real renderer binary as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<Captured> {
        debug!("spawning {} {:?}", invocation.program, invocation.args);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut command);
        let mut child = command.spawn().map_err(Error::StartFailure)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut supervised = Supervised::new(child, invocation.kill_after);

        // A child that never reads stdin makes this write fail with a broken
        // pipe once it exits; that is reported through the exit status instead.
        let writer = stdin.map(|mut pipe| {
            let script = invocation.script.clone();
            thread::spawn(move || {
                let _ = pipe.write_all(script.as_bytes());
            })
        });
        let out_reader = stdout.map(spawn_reader);
        let err_reader = stderr.map(spawn_reader);

        let waited = supervised.wait();

        // Helpers started by a wrapper script can inherit the pipes and keep
        // them open after the renderer itself is gone.
        let drain_until = Instant::now() + DRAIN_GRACE;
        while !(is_drained(&out_reader) && is_drained(&err_reader)) {
            if Instant::now() >= drain_until {
                debug!("output still open after exit; killing process group {}", supervised.pgid);
                let _ = kill_group(supervised.pgid);
                break;
            }
            thread::sleep(REAP_POLL);
        }

        let stdout = join_reader(out_reader)?;
        let stderr = join_reader(err_reader)?;
        if let Some(w) = writer {
            let _ = w.join();
        }

        let (status, killed) = waited?;
        if killed {
            warn!(
                "renderer '{}' killed after {}ms",
                invocation.program,
                invocation.kill_after.as_millis()
            );
        }

        Ok(Captured {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status: Some(status),
            killed,
        })
    }
}

type Reader = JoinHandle<std::io::Result<Vec<u8>>>;

fn spawn_reader<P: Read + Send + 'static>(mut pipe: P) -> Reader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn is_drained(reader: &Option<Reader>) -> bool {
    reader.as_ref().map_or(true, |h| h.is_finished())
}

fn join_reader(reader: Option<Reader>) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => {
            let buf = handle
                .join()
                .map_err(|_| Error::Io(std::io::Error::other("output reader thread panicked")))??;
            Ok(buf)
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// SIGKILL every process in the group led by `pgid`
#[cfg(unix)]
fn kill_group(pgid: u32) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| std::io::Error::other(format!("pid {} out of range", pgid)))?;
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Kills the child once `after` elapses unless disarmed first. Fires at most once.
struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    fn arm(child: Arc<Mutex<Child>>, after: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match rx.recv_timeout(after) {
            Err(RecvTimeoutError::Timeout) => {
                let mut c = lock_child(&child);
                // Exited in time but not reaped yet: nothing to kill.
                if let Ok(Some(_)) = c.try_wait() {
                    return false;
                }
                if let Err(e) = kill_group(c.id()) {
                    debug!("watchdog group kill failed: {}", e);
                }
                if let Err(e) = c.kill() {
                    debug!("watchdog kill failed (process already gone?): {}", e);
                }
                true
            }
            _ => false,
        });

        Self {
            disarm: Some(tx),
            handle: Some(handle),
        }
    }

    /// Stop the timer and report whether it fired
    fn disarm(&mut self) -> bool {
        // Dropping the sender wakes the thread with `Disconnected`.
        drop(self.disarm.take());
        self.handle
            .take()
            .map(|h| h.join().unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// A spawned child plus its watchdog. Dropping it before `wait` completes
/// disarms the watchdog, kills the child and reaps it.
struct Supervised {
    child: Arc<Mutex<Child>>,
    /// The child leads its own process group
    pgid: u32,
    watchdog: Watchdog,
    reaped: bool,
}

impl Supervised {
    fn new(child: Child, kill_after: Duration) -> Self {
        let pgid = child.id();
        let child = Arc::new(Mutex::new(child));
        let watchdog = Watchdog::arm(child.clone(), kill_after);
        Self {
            child,
            pgid,
            watchdog,
            reaped: false,
        }
    }

    /// Block until the child exits or is killed. Returns the exit status and
    /// whether the watchdog fired.
    fn wait(&mut self) -> Result<(ExitStatus, bool)> {
        let status = loop {
            let polled = lock_child(&self.child).try_wait();
            match polled {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(REAP_POLL),
                Err(e) => {
                    warn!("waiting for renderer failed: {}", e);
                    return Err(Error::UnableToLoad);
                }
            }
        };
        self.reaped = true;
        let fired = self.watchdog.disarm();
        Ok((status, fired))
    }
}

impl Drop for Supervised {
    fn drop(&mut self) {
        self.watchdog.disarm();
        if !self.reaped {
            let mut c = lock_child(&self.child);
            let _ = kill_group(self.pgid);
            let _ = c.kill();
            let _ = c.wait();
        }
    }
}
