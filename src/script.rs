//! PhantomJS control script composition
//!
//! The script is built from a fixed template. Every value is substituted in a
//! form that cannot change the structure of the program: numbers and booleans
//! come from typed fields, the format from an enum, and the URL is embedded as
//! a JSON string literal.

use crate::options::RenderRequest;

/// Marker the script prints when the page could not be loaded
pub const UNABLE_TO_LOAD_MARKER: &str = "unable to load";

const TEMPLATE: &str = r#"var webpage = require('webpage');
var noop = function () {};
var url = {{URL}};
var width = {{WIDTH}};
var height = {{HEIGHT}};
var timeout = {{TIMEOUT}};
var format = '{{FORMAT}}';
var clip = {{CLIP}};
var page = webpage.create();
var fail = function () {
	console.error('unable to load');
	phantom.exit(1);
};
page.settings.resourceTimeout = timeout;
page.viewportSize = {
	width: width,
	height: height
};
page.clipRect = {
	top: 0,
	left: 0,
	width: (clip ? width : 0),
	height: (clip ? height : 0)
};

page.onConsoleMessage =
page.onAlert =
page.onConfirm =
page.onPrompt =
page.onError = noop;

page.onResourceTimeout = function (e) {
	fail();
};

page.open(url, function (status) {
	if (status !== 'success') {
		fail();
		return;
	}

	window.setTimeout(function () {
		page.evaluate(function () {
			if (!document.body.style.background) {
				document.body.style.backgroundColor = 'white';
			}
		});

		console.log(page.renderBase64(format));
		phantom.exit();
	}, timeout);
});
"#;

/// Compose the control script for a resolved request.
///
/// The result depends only on the URL, viewport, timeout, format and clip flag.
pub fn compose(req: &RenderRequest) -> String {
    // URL goes in last so its contents are never scanned for placeholders.
    TEMPLATE
        .replace("{{WIDTH}}", &req.viewport.width.to_string())
        .replace("{{HEIGHT}}", &req.viewport.height.to_string())
        .replace("{{TIMEOUT}}", &req.timeout_ms.to_string())
        .replace("{{FORMAT}}", req.format.as_str())
        .replace("{{CLIP}}", if req.clip { "true" } else { "false" })
        .replace("{{URL}}", &js_string_literal(&req.url))
}

/// Quote a string as an ES5 string literal.
///
/// JSON escaping handles quotes, backslashes and control characters. U+2028 and
/// U+2029 are legal in JSON strings but terminate lines in ES5, so they are
/// escaped as well.
pub fn js_string_literal(s: &str) -> String {
    let quoted = serde_json::Value::String(s.to_string()).to_string();
    quoted
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Format, Options};

    fn request(url: &str) -> RenderRequest {
        Options::for_url(url).resolve()
    }

    #[test]
    fn test_parameters_are_embedded() {
        let req = Options {
            url: "https://example.com/a?b=c".into(),
            width: 640,
            height: 480,
            timeout_ms: 1500,
            format: "jpeg".into(),
            clip: true,
            ..Default::default()
        }
        .resolve();
        let script = compose(&req);
        assert!(script.contains(r#"var url = "https://example.com/a?b=c";"#));
        assert!(script.contains("var width = 640;"));
        assert!(script.contains("var height = 480;"));
        assert!(script.contains("var timeout = 1500;"));
        assert!(script.contains("var format = 'jpg';"));
        assert!(script.contains("var clip = true;"));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn test_clip_defaults_to_false() {
        let script = compose(&request("https://example.com"));
        assert!(script.contains("var clip = false;"));
        assert!(script.contains("var format = 'png';"));
    }

    #[test]
    fn test_quotes_in_url_cannot_break_out() {
        let evil = "https://x.test/';phantom.exit();var a='\"\\";
        let script = compose(&request(evil));
        let line = script
            .lines()
            .find(|l| l.starts_with("var url = "))
            .expect("url line");
        let literal = line
            .trim_start_matches("var url = ")
            .trim_end_matches(';');
        let parsed: String = serde_json::from_str(literal).expect("valid string literal");
        assert_eq!(parsed, evil);
    }

    #[test]
    fn test_control_characters_are_escaped() {
        let script = compose(&request("https://x.test/\n\r\u{0}\u{2028}\u{2029}"));
        let line = script
            .lines()
            .find(|l| l.starts_with("var url = "))
            .expect("url line");
        assert!(line.contains("\\n"));
        assert!(line.contains("\\r"));
        assert!(line.contains("\\u0000"));
        assert!(line.contains("\\u2028"));
        assert!(line.contains("\\u2029"));
        assert!(line.ends_with(';'));
    }

    #[test]
    fn test_placeholder_text_in_url_is_left_alone() {
        let script = compose(&request("https://x.test/{{WIDTH}}"));
        assert!(script.contains(r#"var url = "https://x.test/{{WIDTH}}";"#));
        assert!(script.contains("var width = 1024;"));
    }

    #[test]
    fn test_compose_is_pure() {
        let req = request("https://example.com");
        assert_eq!(compose(&req), compose(&req));
        let mut other = req.clone();
        other.format = Format::Jpg;
        assert_ne!(compose(&req), compose(&other));
    }

    #[test]
    fn test_failure_path_prints_marker() {
        let script = compose(&request("https://example.com"));
        assert!(script.contains(UNABLE_TO_LOAD_MARKER));
        assert!(script.contains("renderBase64(format)"));
    }
}
