//! SVG sprite sheets.
//!
//! Every input SVG is minified and turned into a `<symbol>` whose id is the
//! prefixed file stem; all symbols land in one sheet named after the input
//! directory:
//!
//! ```text
//! fonts/sprites/a.svg  ─┐
//! fonts/sprites/b.svg  ─┴─>  sapl-sprites.svg
//!                            <svg xmlns="http://www.w3.org/2000/svg">
//!                              <symbol id="si-a" viewBox="0 0 24 24">...</symbol>
//!                              <symbol id="si-b" viewBox="0 0 16 16">...</symbol>
//!                            </svg>
//! ```
//!
//! Minification drops the prolog, comments, `<metadata>`, `<title>`,
//! `<desc>`, editor namespaces and whitespace-only text.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use rayon::prelude::*;

use super::{Artifact, StageJob, StageOutput, Transform, read_source};
use crate::stage::{SpriteOptions, StageOptions};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

const PROLOG: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
    "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" ",
    "\"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">"
);

const DROPPED_ELEMENTS: [&[u8]; 3] = [b"metadata", b"title", b"desc"];

const EDITOR_PREFIXES: [&[u8]; 2] = [b"sodipodi", b"inkscape"];

pub struct SpriteTransform;

impl Transform for SpriteTransform {
    fn apply(&self, job: &StageJob<'_>) -> Result<StageOutput> {
        let StageOptions::Sprites(options) = job.options else {
            return Err(job.options_mismatch());
        };
        let mut output = StageOutput::default();
        let Some(first) = job.files.first() else {
            return Ok(output);
        };

        let symbols: Vec<_> = job
            .files
            .par_iter()
            .map(|file| {
                let id = format!("{}{}", options.item_prefix, file_stem(&file.path));
                let symbol = read_source(file).and_then(|source| to_symbol(&source, &id, options));
                (file, symbol)
            })
            .collect();

        let mut parts = Vec::with_capacity(symbols.len());
        for (file, symbol) in symbols {
            match symbol {
                Ok(symbol) => parts.push(symbol),
                Err(e) => output.fail(&file.relative, format!("{e:#}")),
            }
        }
        // A sheet missing a symbol would silently break icons.
        if !output.is_ok() {
            return Ok(output);
        }

        let sheet = assemble(&parts, options)?;
        output
            .artifacts
            .push(Artifact::bytes(sheet_name(&first.path, &first.relative, options), sheet));
        Ok(output)
    }
}

/// One input converted to a `<symbol>`.
#[derive(Debug)]
struct Symbol {
    xml: Vec<u8>,
    /// `xmlns:*` declarations the symbol relies on.
    namespaces: Vec<(Vec<u8>, Vec<u8>)>,
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `sapl-<input directory name>.svg`, next to where the inputs sat.
fn sheet_name(path: &Path, relative: &Path, options: &SpriteOptions) -> PathBuf {
    let dir = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sprites".to_string());
    let name = format!("{}{dir}.svg", options.sheet_prefix);
    match relative.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn assemble(symbols: &[Symbol], options: &SpriteOptions) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    if !options.inline {
        writer.get_mut().extend_from_slice(PROLOG.as_bytes());
    }

    let mut root = BytesStart::new("svg");
    root.push_attribute(("xmlns", SVG_NS));
    let mut declared: Vec<&[u8]> = Vec::new();
    for (key, value) in symbols.iter().flat_map(|s| &s.namespaces) {
        if !declared.contains(&key.as_slice()) {
            declared.push(key);
            root.push_attribute((key.as_slice(), value.as_slice()));
        }
    }

    writer.write_event(Event::Start(root))?;
    for symbol in symbols {
        writer.get_mut().extend_from_slice(&symbol.xml);
    }
    writer.write_event(Event::End(BytesEnd::new("svg")))?;
    Ok(writer.into_inner())
}

fn to_symbol(source: &str, id: &str, options: &SpriteOptions) -> Result<Symbol> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::new());
    let mut namespaces = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
            Event::Start(e) if is_dropped(&e) => {
                reader.read_to_end(e.name())?;
            }
            Event::Empty(e) if is_dropped(&e) => {}
            Event::Start(e) if depth == 0 => {
                if seen_root || e.name().as_ref() != b"svg" {
                    bail!("expected a single <svg> root element");
                }
                seen_root = true;
                depth += 1;
                writer.write_event(Event::Start(symbol_start(&e, id, options, &mut namespaces)?))?;
            }
            Event::Empty(e) if depth == 0 => {
                if seen_root || e.name().as_ref() != b"svg" {
                    bail!("expected a single <svg> root element");
                }
                seen_root = true;
                writer.write_event(Event::Empty(symbol_start(&e, id, options, &mut namespaces)?))?;
            }
            Event::End(_) if depth == 1 => {
                depth -= 1;
                writer.write_event(Event::End(BytesEnd::new("symbol")))?;
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(clean_element(&e)?))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => {
                writer.write_event(Event::Empty(clean_element(&e)?))?;
            }
            // Text, CDATA and entity references inside the root.
            event if depth > 0 => writer.write_event(event)?,
            _ => {}
        }
    }

    if !seen_root {
        bail!("no <svg> root element");
    }
    Ok(Symbol {
        xml: writer.into_inner(),
        namespaces,
    })
}

fn is_dropped(e: &BytesStart<'_>) -> bool {
    let name = e.name();
    DROPPED_ELEMENTS.contains(&name.as_ref()) || is_editor_name(name.as_ref())
}

fn is_editor_name(name: &[u8]) -> bool {
    EDITOR_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(*prefix)
            .is_some_and(|rest| rest.first() == Some(&b':'))
    })
}

fn is_editor_namespace(key: &[u8]) -> bool {
    key.strip_prefix(b"xmlns:".as_slice())
        .is_some_and(|prefix| EDITOR_PREFIXES.contains(&prefix))
}

/// The root `<svg>` as `<symbol id=...>`, keeping only attributes that mean
/// something on a symbol.
fn symbol_start(
    e: &BytesStart<'_>,
    id: &str,
    options: &SpriteOptions,
    namespaces: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<BytesStart<'static>> {
    let mut symbol = BytesStart::new("symbol");
    symbol.push_attribute(("id", id));

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match key {
            b"viewBox" if options.keep_view_box => {
                symbol.push_attribute((key, attr.value.as_ref()));
            }
            b"preserveAspectRatio" => symbol.push_attribute((key, attr.value.as_ref())),
            _ if key.starts_with(b"xmlns:") && !is_editor_namespace(key) => {
                namespaces.push((key.to_vec(), attr.value.to_vec()));
            }
            _ => {}
        }
    }
    Ok(symbol)
}

/// Copy of an element without editor attributes and empty attributes.
fn clean_element(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut cleaned = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if is_editor_name(key) || is_editor_namespace(key) || attr.value.is_empty() {
            continue;
        }
        cleaned.push_attribute((key, attr.value.as_ref()));
    }
    Ok(cleaned)
}
