use crate::{Error, Options, RenderResult, Result, Screenshot};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Render(Options, oneshot::Sender<Result<RenderResult>>),
    Save(Options, oneshot::Sender<Result<PathBuf>>),
    Close(oneshot::Sender<Result<()>>),
}

fn canceled(what: &str) -> Error {
    Error::Io(std::io::Error::other(format!("{} canceled: render worker is gone", what)))
}

/// An async-friendly renderer backed by a dedicated worker thread.
///
/// The worker runs the blocking pipeline (including the wait on the renderer
/// process) so async tasks never block their executor. Requests sent through
/// one handle are processed in order; clone the handle to share the worker or
/// create several renderers to render in parallel.
#[derive(Clone)]
pub struct Renderer {
    cmd_tx: Sender<Command>,
}

impl Renderer {
    /// Spawn the worker thread
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Render(options, resp) => {
                        let _ = resp.send(Screenshot::new(options).render());
                    }
                    Command::Save(options, resp) => {
                        let _ = resp.send(Screenshot::new(options).save());
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        Self { cmd_tx }
    }

    /// Render a page to image bytes
    pub async fn render(&self, options: Options) -> Result<RenderResult> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Render(options, tx))
            .map_err(|_| canceled("Render"))?;
        rx.await.map_err(|_| canceled("Render"))?
    }

    /// Render a page and save it under its cache path
    pub async fn save(&self, options: Options) -> Result<PathBuf> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Save(options, tx))
            .map_err(|_| canceled("Save"))?;
        rx.await.map_err(|_| canceled("Save"))?
    }

    /// Stop the worker thread
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await.map_err(|_| canceled("Close"))?
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot async render on a fresh worker thread
pub async fn render(options: Options) -> Result<RenderResult> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let _ = tx.send(crate::render(options));
    });
    rx.await.map_err(|_| canceled("Render"))?
}
