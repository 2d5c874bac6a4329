//! HTML comment stripping and whitespace collapsing.
//!
//! Works on raw markup with regex passes, no DOM. Content of `<pre>`,
//! `<textarea>`, `<script>` and `<style>` is never altered, and conditional
//! comments (`<!--[if IE]>`) survive comment removal.
//!
//! # Passes
//!
//! ```text
//! split      <!-- c --><p>  a  </p><pre> x </pre>
//!            ^comment  ^text      ^protected
//! comments   drop plain comments, protect conditional ones
//! collapse   runs of whitespace -> one space; none around block tags
//! restore    put protected segments back verbatim
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{Artifact, StageJob, StageOutput, Transform, map_files, read_source};
use crate::stage::{HtmlOptions, StageOptions};

/// Comments and raw-text elements, leftmost match wins so a comment wrapping
/// a `<script>` is treated as a comment.
static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<pre\b.*?</pre\s*>|<textarea\b.*?</textarea\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>",
    )
    .unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Whitespace next to a block-level (or document-level) tag is insignificant.
static BLOCK_EDGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\s*(</?(?:",
        "!doctype|html|head|body|meta|link|title|base|",
        "address|article|aside|blockquote|canvas|dd|div|dl|dt|fieldset|figcaption|",
        "figure|footer|form|h[1-6]|header|hgroup|hr|li|main|nav|noscript|ol|p|",
        "section|table|thead|tbody|tfoot|tr|td|th|ul|video|br",
        r")\b[^>]*>)\s*",
    ))
    .unwrap()
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x00(\d+)\x00").unwrap());

pub struct HtmlTransform;

impl Transform for HtmlTransform {
    fn apply(&self, job: &StageJob<'_>) -> anyhow::Result<StageOutput> {
        let StageOptions::Html(options) = job.options else {
            return Err(job.options_mismatch());
        };
        let options = *options;

        Ok(map_files(job.files, |file| {
            if options.is_passthrough() {
                return Ok(Some(Artifact::copy(&file.relative, &file.path)));
            }
            let source = read_source(file)?;
            Ok(Some(Artifact::bytes(&file.relative, minify_html(&source, options))))
        }))
    }
}

/// Apply the enabled passes to a document.
pub fn minify_html(html: &str, options: HtmlOptions) -> String {
    let mut protected: Vec<&str> = Vec::new();
    let mut text = String::with_capacity(html.len());
    let mut last = 0;

    for m in SEGMENT.find_iter(html) {
        text.push_str(&html[last..m.start()]);
        let segment = m.as_str();
        let drop = options.remove_comments && segment.starts_with("<!--") && !is_conditional(segment);
        if !drop {
            text.push_str(&format!("\u{0}{}\u{0}", protected.len()));
            protected.push(segment);
        }
        last = m.end();
    }
    text.push_str(&html[last..]);

    if options.collapse_whitespace {
        text = WHITESPACE.replace_all(&text, " ").into_owned();
        text = BLOCK_EDGE.replace_all(&text, "$1").trim().to_string();
    }

    PLACEHOLDER
        .replace_all(&text, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| protected.get(i).copied())
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

fn is_conditional(comment: &str) -> bool {
    let body = &comment["<!--".len()..];
    body.starts_with("[if") || body.starts_with("<![endif]")
}
