//! Inline source maps (revision 3).
//!
//! Only line granularity is produced: every generated line maps to column 0
//! of one source line. That is what browser devtools need to show the
//! original file and line for a bundled module.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    version: u8,
    file: String,
    sources: Vec<String>,
    sources_content: Vec<String>,
    names: Vec<String>,
    mappings: String,
}

/// Builds `mappings` one generated line at a time.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    map: SourceMap,
    /// Previous segment values; VLQ fields are deltas.
    prev_source: i64,
    prev_line: i64,
    lines: usize,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            map: SourceMap {
                version: 3,
                file: file.into(),
                ..SourceMap::default()
            },
            ..Self::default()
        }
    }

    /// Register a source, returning its index.
    pub fn add_source(&mut self, name: impl Into<String>, content: impl Into<String>) -> usize {
        self.map.sources.push(name.into());
        self.map.sources_content.push(content.into());
        self.map.sources.len() - 1
    }

    /// A generated line with no original.
    pub fn unmapped_line(&mut self) {
        self.separate_line();
    }

    /// A generated line that is line `line` (0-based) of `source`.
    pub fn mapped_line(&mut self, source: usize, line: usize) {
        self.separate_line();
        let (source, line) = (source as i64, line as i64);
        // [generated column, source index, original line, original column]
        encode_vlq(&mut self.map.mappings, 0);
        encode_vlq(&mut self.map.mappings, source - self.prev_source);
        encode_vlq(&mut self.map.mappings, line - self.prev_line);
        encode_vlq(&mut self.map.mappings, 0);
        self.prev_source = source;
        self.prev_line = line;
    }

    fn separate_line(&mut self) {
        if self.lines > 0 {
            self.map.mappings.push(';');
        }
        self.lines += 1;
    }

    pub fn finish(self) -> SourceMap {
        self.map
    }
}

impl SourceMap {
    /// A map listing sources without mappings.
    pub fn sources_only(file: impl Into<String>, sources: Vec<(String, String)>) -> Self {
        let (sources, sources_content) = sources.into_iter().unzip();
        Self {
            version: 3,
            file: file.into(),
            sources,
            sources_content,
            ..Self::default()
        }
    }

    pub fn to_data_url(&self) -> anyhow::Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(json)
        ))
    }

    /// `//# sourceMappingURL=...` trailer for scripts.
    pub fn js_comment(&self) -> anyhow::Result<String> {
        Ok(format!("//# sourceMappingURL={}\n", self.to_data_url()?))
    }

    /// `/*# sourceMappingURL=... */` trailer for stylesheets.
    pub fn css_comment(&self) -> anyhow::Result<String> {
        Ok(format!("/*# sourceMappingURL={} */\n", self.to_data_url()?))
    }
}

const BASE64_DIGITS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Base64 VLQ: sign in the lowest bit, 5 data bits per digit, bit 6 continues.
fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64_DIGITS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}
