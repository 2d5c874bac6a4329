//! Reload script injection.

use crate::embed::serve::hotreload_tag;

/// Inject the reload script into HTML bodies when live reload is on.
pub fn maybe_inject_hotreload(body: Vec<u8>, content_type: &str, live_reload: bool) -> Vec<u8> {
    if live_reload && content_type.starts_with("text/html") {
        inject_hotreload_script(&body)
    } else {
        body
    }
}

/// Insert before the last `</body>`, or append when there is none.
fn inject_hotreload_script(content: &[u8]) -> Vec<u8> {
    let script = hotreload_tag();
    let script_bytes = script.as_bytes();

    const PATTERN: &[u8] = b"</body>";

    let pos = content
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
        .unwrap_or(content.len());

    let mut result = Vec::with_capacity(content.len() + script_bytes.len());
    result.extend_from_slice(&content[..pos]);
    result.extend_from_slice(script_bytes);
    result.extend_from_slice(&content[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::mime::types::{CSS, HTML};

    #[test]
    fn test_injected_before_body_close() {
        let body = b"<html><BODY><p>x</p></BODY></html>".to_vec();
        let out = String::from_utf8(maybe_inject_hotreload(body, HTML, true)).unwrap();
        assert_eq!(
            out,
            format!("<html><BODY><p>x</p>{}</BODY></html>", hotreload_tag())
        );
    }

    #[test]
    fn test_appended_without_body() {
        let out = maybe_inject_hotreload(b"<p>x</p>".to_vec(), HTML, true);
        assert!(out.ends_with(hotreload_tag().as_bytes()));
    }

    #[test]
    fn test_untouched_otherwise() {
        let css = b"body{}".to_vec();
        assert_eq!(maybe_inject_hotreload(css.clone(), CSS, true), css);
        let html = b"<body></body>".to_vec();
        assert_eq!(maybe_inject_hotreload(html.clone(), HTML, false), html);
    }
}
