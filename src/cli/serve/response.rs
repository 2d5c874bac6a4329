//! HTTP response handlers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use super::content::maybe_inject_hotreload;
use crate::utils::mime::types::{HTML, JAVASCRIPT, PLAIN};

/// Respond with a static file, optionally injecting the reload script.
pub fn respond_file(request: Request, path: &Path, live_reload: bool) -> Result<()> {
    let content_type = crate::utils::mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }

    // video seeking
    if let Some(range) = get_range_header(&request) {
        return respond_range(request, path, content_type, &range);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let body = maybe_inject_hotreload(body, content_type, live_reload);
    send_body(request, 200, content_type, body)
}

fn respond_range(
    request: Request,
    path: &Path,
    content_type: &'static str,
    range: &str,
) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let file_size = fs::metadata(path)?.len();
    let Some((start, end)) = parse_range(range.strip_prefix("bytes=").unwrap_or(range), file_size)
    else {
        let response = Response::empty(StatusCode(416))
            .with_header(make_header("Content-Range", &format!("bytes */{file_size}")));
        request.respond(response)?;
        return Ok(());
    };
    let length = end - start + 1;

    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let response = Response::new(
        StatusCode(206),
        vec![
            make_header("Content-Type", content_type),
            make_header("Content-Range", &format!("bytes {start}-{end}/{file_size}")),
            make_header("Accept-Ranges", "bytes"),
        ],
        file.take(length),
        usize::try_from(length).ok(),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Parse `start-end`, `start-` or `-suffix` into inclusive byte bounds.
fn parse_range(range: &str, file_size: u64) -> Option<(u64, u64)> {
    if file_size == 0 {
        return None;
    }
    let last = file_size - 1;
    let (start, end) = range.trim().split_once('-')?;
    let (start, end) = match (start.trim(), end.trim()) {
        ("", suffix) => {
            let suffix: u64 = suffix.parse().ok()?;
            (file_size.saturating_sub(suffix), last)
        }
        (start, "") => (start.parse().ok()?, last),
        (start, end) => (start.parse().ok()?, end.parse::<u64>().ok()?.min(last)),
    };
    (start <= end).then_some((start, end))
}

fn get_range_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Range"))
        .map(|h| h.value.to_string())
}

/// 404, using `404.html` from the output directory when present.
pub fn respond_not_found(request: Request, output: &Path, live_reload: bool) -> Result<()> {
    let custom_404 = output.join("404.html");
    let has_custom = custom_404.is_file();

    if is_head_request(&request) {
        return send_head(request, 404, if has_custom { HTML } else { PLAIN });
    }

    if has_custom && let Ok(body) = fs::read(&custom_404) {
        let body = maybe_inject_hotreload(body, HTML, live_reload);
        return send_body(request, 404, HTML, body);
    }

    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

/// 503 while shutting down.
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

pub fn respond_hotreload_js(request: Request, ws_port: u16) -> Result<()> {
    use crate::embed::serve::{HOTRELOAD_JS, HotreloadVars};

    let body = HOTRELOAD_JS.render(&HotreloadVars { ws_port });
    send_body(request, 200, JAVASCRIPT, body.into_bytes())
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response =
        Response::empty(StatusCode(status)).with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type))
        .with_header(make_header("Cache-Control", "no-cache"));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Header {
    // header names and values here are ASCII literals or formatted numbers
    Header::from_bytes(key.as_bytes(), value.as_bytes()).unwrap()
}
