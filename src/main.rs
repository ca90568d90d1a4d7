use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use pageshot::{Options, Screenshot, StderrPolicy};

#[derive(Parser, Debug)]
#[command(name = "pageshot", version, about = "Render web pages to images with PhantomJS")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single page to a file.
    Render(RenderArgs),
    /// Serve screenshots over HTTP.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Page to capture.
    #[arg(long)]
    url: String,

    /// Output file. Defaults to the cache path under --dir (or the working directory).
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    flags: RenderFlags,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Worker threads (0 = one per CPU).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    #[command(flatten)]
    flags: RenderFlags,
}

#[derive(Args, Debug)]
struct RenderFlags {
    /// JSON file with base options; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Viewport width (default 1024).
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height (default 768).
    #[arg(long)]
    height: Option<u32>,

    /// Image format: png or jpg.
    #[arg(long)]
    format: Option<String>,

    /// Clip the image to the viewport.
    #[arg(long)]
    clip: bool,

    /// Settle delay in milliseconds; the renderer is killed after twice this.
    #[arg(long)]
    timeout: Option<u64>,

    /// Ignore TLS certificate errors.
    #[arg(long)]
    ignore_ssl_errors: bool,

    /// TLS protocol passed to phantomjs (default sslv3).
    #[arg(long)]
    ssl_protocol: Option<String>,

    /// Path to the phantomjs binary.
    #[arg(long)]
    phantomjs: Option<String>,

    /// Cache/output directory.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Reuse cached images younger than this many seconds.
    #[arg(long)]
    max_age: Option<u64>,

    /// Only fail on stderr output that reports a load failure.
    #[arg(long)]
    lenient_stderr: bool,
}

impl RenderFlags {
    fn into_options(self) -> anyhow::Result<Options> {
        let mut opts = match &self.config {
            Some(path) => Options::from_json_file(path)?,
            None => Options::default(),
        };

        if let Some(v) = self.width {
            opts.width = v;
        }
        if let Some(v) = self.height {
            opts.height = v;
        }
        if let Some(v) = self.format {
            opts.format = v;
        }
        if let Some(v) = self.timeout {
            opts.timeout_ms = v;
        }
        if let Some(v) = self.ssl_protocol {
            opts.ssl_protocol = v;
        }
        if let Some(v) = self.phantomjs {
            opts.phantomjs_bin = v;
        }
        if let Some(v) = self.dir {
            opts.dir = Some(v);
        }
        if let Some(v) = self.max_age {
            opts.max_age_secs = Some(v);
        }
        opts.clip |= self.clip;
        opts.ignore_ssl_errors |= self.ignore_ssl_errors;
        if self.lenient_stderr {
            opts.stderr_policy = StderrPolicy::MarkerOnly;
        }
        Ok(opts)
    }
}

fn render(args: RenderArgs) -> anyhow::Result<()> {
    let mut opts = args.flags.into_options()?;
    opts.url = args.url;
    let shot = Screenshot::new(opts);

    let path = match args.out {
        Some(out) => {
            let bytes = shot
                .bytes()
                .with_context(|| format!("failed to render {}", shot.request().url))?;
            pageshot::persist::write_atomic(&out, &bytes)
                .with_context(|| format!("failed to write '{}'", out.display()))?
        }
        None => shot
            .save()
            .with_context(|| format!("failed to render {}", shot.request().url))?,
    };

    println!("{}", path.display());
    Ok(())
}

#[cfg(feature = "server")]
fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let base = args.flags.into_options()?;
    let server = pageshot::server::ScreenshotServer::bind(&args.addr, base)
        .with_context(|| format!("failed to start server on {}", args.addr))?;
    server.run(args.workers);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => render(args),
        #[cfg(feature = "server")]
        Command::Serve(args) => serve(args),
    }
}
