//! Async facade tests

#![cfg(all(unix, feature = "async"))]

mod common;

use common::stand_in;
use pageshot::async_api::{self, Renderer};
use pageshot::Options;

fn options(bin: &str) -> Options {
    Options {
        url: "https://example.com".to_string(),
        phantomjs_bin: stand_in(bin),
        timeout_ms: 1000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_async_render() {
    let result = async_api::render(options("ok")).await.expect("render");
    assert_eq!(result.bytes, b"0123456789".to_vec());
    assert_eq!(result.content_type, "image/png");
}

#[tokio::test]
async fn test_renderer_handle_reports_errors_and_closes() {
    let renderer = Renderer::new();
    let err = renderer.render(options("fail-stdout")).await.unwrap_err();
    assert!(err.is_unable_to_load());

    let ok = renderer.render(options("ok")).await.expect("render");
    assert_eq!(ok.bytes.len(), 10);

    renderer.close().await.expect("close");
}
