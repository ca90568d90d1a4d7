//! HTTP adapter
//!
//! Parses query parameters into `Options`, renders, and answers with the image
//! or a 500 carrying the error text. Served by `tiny_http` on a fixed pool of
//! worker threads.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tiny_http::{Header, Method, Request, Response};

use crate::{Error, Options, RenderResult, Result, Screenshot};

/// Parse an integer the lenient way: anything invalid or negative is 0 (unset)
pub fn parse_int(s: &str) -> u64 {
    s.trim().parse::<i64>().ok().filter(|v| *v > 0).map_or(0, |v| v as u64)
}

/// Parse a boolean; unrecognized values are false
pub fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "t" | "T" | "TRUE" | "true" | "True")
}

/// Build render options from a query string on top of server-level defaults.
///
/// Only render parameters can be overridden; the binary, output directory and
/// stderr policy stay as configured for the server.
pub fn options_from_query(base: &Options, query: &str) -> Options {
    let mut params: HashMap<String, String> = HashMap::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    let get = |k: &str| params.get(k).map(String::as_str).filter(|v| !v.is_empty());

    // Parameters left out of the query keep the server-level values.
    let mut opts = base.clone();
    opts.url = get("url").unwrap_or_default().to_string();
    if let Some(v) = get("clip") {
        opts.clip = parse_bool(v);
    }
    if let Some(v) = get("format") {
        opts.format = v.to_string();
    }
    if let Some(v) = get("height") {
        opts.height = u32::try_from(parse_int(v)).unwrap_or(0);
    }
    if let Some(v) = get("width") {
        opts.width = u32::try_from(parse_int(v)).unwrap_or(0);
    }
    if let Some(v) = get("timeout") {
        opts.timeout_ms = parse_int(v);
    }
    if let Some(v) = get("ignoresslerror") {
        opts.ignore_ssl_errors = parse_bool(v);
    }
    if let Some(v) = get("sslprotocol") {
        opts.ssl_protocol = v.to_string();
    }
    if let Some(v) = get("maxage") {
        let max_age = parse_int(v);
        if max_age > 0 {
            opts.cache_cutoff = None;
            opts.max_age_secs = Some(max_age);
        }
    }
    opts
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn image_response(result: &RenderResult) -> Response<std::io::Cursor<Vec<u8>>> {
    // Content-Length is derived from the data by tiny_http.
    let mut response = Response::from_data(result.bytes.clone());
    if let Some(h) = header("Content-Type", result.content_type) {
        response = response.with_header(h);
    }
    response
}

// from_string already labels the body text/plain
fn error_response(status: u16, err: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(err).with_status_code(status)
}

/// Answer a single request
pub fn handle(request: Request, base: &Options) {
    let started = Instant::now();
    let url = request.url().to_string();

    if !matches!(request.method(), Method::Get | Method::Head) {
        let _ = request.respond(error_response(405, "method not allowed"));
        return;
    }

    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    let options = options_from_query(base, query);
    let target = options.url.clone();

    let response = match Screenshot::new(options).render_and_store() {
        Ok(result) => {
            info!(
                "200 {} ({} bytes, cached: {}) in {}ms",
                target,
                result.bytes.len(),
                result.from_cache,
                started.elapsed().as_millis()
            );
            image_response(&result)
        }
        Err(e) => {
            warn!("500 {}: {}", target, e);
            error_response(500, &e.to_string())
        }
    };

    if let Err(e) = request.respond(response) {
        warn!("failed to write response: {}", e);
    }
}

/// A bound screenshot server
pub struct ScreenshotServer {
    inner: Arc<tiny_http::Server>,
    base: Arc<Options>,
}

impl ScreenshotServer {
    /// Bind to `addr` (e.g. "127.0.0.1:8080"; port 0 picks a free port)
    pub fn bind(addr: &str, base: Options) -> Result<Self> {
        let inner = tiny_http::Server::http(addr)
            .map_err(|e| Error::ConfigError(format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Self {
            inner: Arc::new(inner),
            base: Arc::new(base),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> String {
        self.inner.server_addr().to_string()
    }

    /// Start `workers` threads (0 means one per CPU) and return their handles
    pub fn spawn(self, workers: usize) -> Vec<JoinHandle<()>> {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        info!("listening on http://{} with {} workers", self.local_addr(), workers);

        (0..workers)
            .map(|_| {
                let server = self.inner.clone();
                let base = self.base.clone();
                thread::spawn(move || loop {
                    match server.recv() {
                        Ok(request) => handle(request, &base),
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            break;
                        }
                    }
                })
            })
            .collect()
    }

    /// Serve until every worker stops
    pub fn run(self, workers: usize) {
        for handle in self.spawn(workers) {
            let _ = handle.join();
        }
    }
}
