//! CommonJS bundling.
//!
//! Each entry file becomes one self-contained script: the entry and every
//! module it reaches through `require('...')` are wrapped in functions and
//! registered in a table, followed by a small loader.
//!
//! ```text
//! (function (modules, entry) { ...loader... })({
//! 0: [function (require, module, exports) {
//! <app.js>
//! }, {"./lib/greet":1}],
//! 1: [function (require, module, exports) {
//! <lib/greet.js>
//! }, {}]
//! }, 0);
//! ```
//!
//! ES module syntax is lowered in place: `import` becomes `require`, and
//! `export` defines getters on `exports`. Rewritten statements keep their
//! line count, so module sources still map line for line and a line-level
//! source map is exact. `import.meta` has no CommonJS equivalent and fails the
//! entry.
//!
//! The `global`/`process`/`__filename`/`__dirname` prelude goes into every
//! module when globals are inserted, and otherwise into modules that refer to
//! one of those names without declaring it.
//!
//! Specifiers resolve like Node: relative paths try the file, `.js`,
//! `.json`, then the directory's `package.json` `main` or `index.js`; bare
//! names are looked up in `node_modules` up to the project root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use oxc::allocator::Allocator;
use oxc::ast::AstKind;
use oxc::ast::ast::{
    Argument, Declaration, ExportDefaultDeclarationKind, Expression, ImportDeclarationSpecifier,
    ModuleExportName, Program, Statement,
};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::{GetSpan, SourceType, Span};
use rustc_hash::FxHashMap;

use super::lint::{diagnostic_position, line_column};
use super::minify::minify_js;
use super::sourcemap::SourceMapBuilder;
use super::{Artifact, StageJob, StageOutput, Transform, map_files, renamed};
use crate::stage::{JsOptions, StageOptions};
use crate::utils::glob::SourceFile;

const LOADER: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = cache[id] = { exports: {} };
    var def = modules[id];
    def[0].call(module.exports, function (name) {
      var dep = def[1][name];
      if (dep === undefined) throw new Error("Cannot find module '" + name + "'");
      return load(dep);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({"#;

pub struct JsBundleTransform;

impl Transform for JsBundleTransform {
    fn apply(&self, job: &StageJob<'_>) -> Result<StageOutput> {
        let StageOptions::Javascript(options) = job.options else {
            return Err(job.options_mismatch());
        };

        Ok(map_files(job.files, |file| {
            let output = renamed(&file.relative, &options.suffix, "js");
            let name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let code = bundle(file, options, job.root, &name)?;
            Ok(Some(Artifact::bytes(output, code)))
        }))
    }
}

/// Defined by the globals prelude.
const NODE_GLOBALS: [&str; 4] = ["global", "process", "__filename", "__dirname"];

/// Helpers for lowered ES modules, kept on the wrapper line.
const ESM_PRELUDE: &str = concat!(
    "Object.defineProperty(exports, \"__esModule\", { value: true }); ",
    "function __saplDefault(m) { return m && m.__esModule ? m[\"default\"] : m; } ",
    "function __saplExport(name, get) { ",
    "Object.defineProperty(exports, name, { enumerable: true, get: get }); } ",
    "function __saplExportAll(m) { Object.keys(m).forEach(function (k) { ",
    "if (k !== \"default\" && !(k in exports)) __saplExport(k, function () { return m[k]; }); }); }",
);

#[derive(Debug, Default)]
struct Module {
    path: PathBuf,
    source: String,
    deps: BTreeMap<String, usize>,
    esm: bool,
    uses_globals: bool,
}

/// Bundle one entry file.
fn bundle(entry: &SourceFile, options: &JsOptions, root: &Path, name: &str) -> Result<String> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let root = root.as_path();
    let modules = collect_modules(&entry.path, root)?;

    let mut out = String::new();
    let mut map = (options.debug && !options.minify).then(|| SourceMapBuilder::new(name));

    for line in LOADER.lines() {
        push_line(&mut out, &mut map, line, None);
    }

    for (id, module) in modules.iter().enumerate() {
        let display = project_path(&module.path, root);
        let mut prelude = String::new();
        if module.esm {
            prelude.push_str(ESM_PRELUDE);
            prelude.push(' ');
        }
        if options.insert_globals || module.uses_globals {
            prelude.push_str(&globals_prelude(&display)?);
        }
        push_line(
            &mut out,
            &mut map,
            &format!("{id}: [function (require, module, exports) {{{prelude}"),
            None,
        );

        let source_index = map
            .as_mut()
            .map(|m| m.add_source(&display, module.source.as_str()));
        for (line_no, line) in module.source.lines().enumerate() {
            push_line(&mut out, &mut map, line, source_index.map(|s| (s, line_no)));
        }

        let comma = if id + 1 < modules.len() { "," } else { "" };
        let deps = serde_json::to_string(&module.deps)?;
        push_line(&mut out, &mut map, &format!("}}, {deps}]{comma}"), None);
    }
    push_line(&mut out, &mut map, "}, 0);", None);

    if options.minify {
        return minify_js(&out).context("failed to minify bundle");
    }
    if let Some(map) = map {
        out.push_str(&map.finish().js_comment()?);
    }
    Ok(out)
}

fn push_line(
    out: &mut String,
    map: &mut Option<SourceMapBuilder>,
    line: &str,
    origin: Option<(usize, usize)>,
) {
    out.push_str(line);
    out.push('\n');
    if let Some(map) = map {
        match origin {
            Some((source, line)) => map.mapped_line(source, line),
            None => map.unmapped_line(),
        }
    }
}

/// `global`, `process`, `__filename`, `__dirname` on one line, so module
/// line numbers are unaffected.
fn globals_prelude(display: &str) -> Result<String> {
    let dirname = display.rsplit_once('/').map_or("/", |(dir, _)| dir);
    let dirname = if dirname.is_empty() { "/" } else { dirname };
    Ok(format!(
        concat!(
            "var global = typeof globalThis !== \"undefined\" ? globalThis : ",
            "typeof self !== \"undefined\" ? self : window; ",
            "var process = global.process || {{ env: {{}}, argv: [], browser: true, ",
            "nextTick: function (fn) {{ setTimeout(fn, 0); }} }}; ",
            "var __filename = {}; var __dirname = {};"
        ),
        serde_json::to_string(display)?,
        serde_json::to_string(dirname)?
    ))
}

/// `/src/assets/js/app.js` for a file below `root`.
fn project_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    format!("/{}", rel.to_string_lossy().replace('\\', "/").trim_start_matches('/'))
}

/// Breadth-first walk of the `require` graph. The entry gets id 0.
fn collect_modules(entry: &Path, root: &Path) -> Result<Vec<Module>> {
    let entry = entry
        .canonicalize()
        .with_context(|| format!("failed to read {}", entry.display()))?;
    let mut modules = vec![Module {
        path: entry.clone(),
        ..Module::default()
    }];
    let mut index: FxHashMap<PathBuf, usize> = FxHashMap::default();
    index.insert(entry, 0);

    let mut next = 0;
    while next < modules.len() {
        let path = modules[next].path.clone();
        let source = load_source(&path)?;
        let dir = path.parent().unwrap_or(root);

        let analysis = analyze(&source, &path)?;
        let mut deps = BTreeMap::new();
        for specifier in analysis.specifiers {
            let resolved = resolve(&specifier, dir, root).with_context(|| {
                format!(
                    "cannot find module '{specifier}' from '{}'",
                    project_path(&path, root)
                )
            })?;
            let id = match index.get(&resolved) {
                Some(&id) => id,
                None => {
                    let id = modules.len();
                    index.insert(resolved.clone(), id);
                    modules.push(Module {
                        path: resolved,
                        ..Module::default()
                    });
                    id
                }
            };
            deps.insert(specifier, id);
        }

        let module = &mut modules[next];
        module.esm = analysis.lowered.is_some();
        module.source = analysis.lowered.unwrap_or(source);
        module.deps = deps;
        module.uses_globals = analysis.uses_globals;
        next += 1;
    }

    Ok(modules)
}

fn load_source(path: &Path) -> Result<String> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str::<serde_json::Value>(&content)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        return Ok(format!("module.exports = {};", content.trim()));
    }
    Ok(content)
}

/// What bundling needs to know about one module.
#[derive(Debug)]
struct Analysis {
    /// Dependencies in source order, `import` and `require` alike.
    specifiers: Vec<String>,
    /// CommonJS rewrite of an ES module.
    lowered: Option<String>,
    /// Free references to one of [`NODE_GLOBALS`].
    uses_globals: bool,
}

/// Syntax-check a module, list its dependencies and lower ES module syntax.
fn analyze(source: &str, path: &Path) -> Result<Analysis> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::unambiguous()).parse();
    if let Some(error) = ret.errors.first() {
        let (line, column) = diagnostic_position(source, error);
        bail!("{}:{line}:{column}: {}", path.display(), error.message);
    }

    let semantic = SemanticBuilder::new().build(&ret.program).semantic;
    let scoping = semantic.scoping();
    let mut specifiers = Vec::new();
    let mut uses_globals = false;
    for node in semantic.nodes().iter() {
        match node.kind() {
            AstKind::CallExpression(call) => {
                if let Expression::Identifier(callee) = &call.callee
                    && callee.name.as_str() == "require"
                    && let Some(Argument::StringLiteral(literal)) = call.arguments.first()
                {
                    specifiers.push(literal.value.as_str().to_string());
                }
            }
            AstKind::ImportDeclaration(decl) => {
                specifiers.push(decl.source.value.as_str().to_string());
            }
            AstKind::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    specifiers.push(source.value.as_str().to_string());
                }
            }
            AstKind::ExportAllDeclaration(decl) => {
                specifiers.push(decl.source.value.as_str().to_string());
            }
            AstKind::IdentifierReference(ident) => {
                if NODE_GLOBALS.contains(&ident.name.as_str())
                    && scoping
                        .get_reference(ident.reference_id())
                        .symbol_id()
                        .is_none()
                {
                    uses_globals = true;
                }
            }
            AstKind::MetaProperty(meta) if meta.meta.name.as_str() == "import" => {
                let (line, column) = line_column(source, meta.span.start as usize);
                bail!("{}:{line}:{column}: `import.meta` is not supported", path.display());
            }
            _ => {}
        }
    }

    Ok(Analysis {
        specifiers,
        lowered: lower_module_syntax(source, &ret.program)?,
        uses_globals,
    })
}

/// Rewrite top-level `import`/`export` statements to CommonJS. `None` for
/// a script without module syntax.
fn lower_module_syntax(source: &str, program: &Program<'_>) -> Result<Option<String>> {
    let mut edits: Vec<(u32, u32, String)> = Vec::new();
    let mut imports = 0;
    let mut binding = || {
        imports += 1;
        format!("__saplImport{}", imports - 1)
    };

    for statement in &program.body {
        match statement {
            Statement::ImportDeclaration(decl) => {
                let specifier = serde_json::to_string(decl.source.value.as_str())?;
                let specifiers: Vec<&ImportDeclarationSpecifier<'_>> =
                    decl.specifiers.iter().flatten().collect();
                if specifiers.is_empty() {
                    edits.push(replace(source, decl.span, format!("require({specifier});")));
                    continue;
                }
                let module = binding();
                let mut out = format!("var {module} = require({specifier});");
                for item in specifiers {
                    let (local, value) = match item {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            (&s.local.name, format!("__saplDefault({module})"))
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            (&s.local.name, module.clone())
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            (&s.local.name, member(&module, &s.imported)?)
                        }
                    };
                    out.push_str(&format!(" var {local} = {value};"));
                }
                edits.push(replace(source, decl.span, out));
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    edits.push((decl.span.start, declaration.span().start, String::new()));
                    let mut getters = String::new();
                    for name in declared_names(declaration) {
                        getters.push(' ');
                        getters.push_str(&export_getter(&name, &name)?);
                    }
                    edits.push((decl.span.end, decl.span.end, getters));
                    continue;
                }

                let mut out = String::new();
                let module = match &decl.source {
                    Some(src) => {
                        let module = binding();
                        let specifier = serde_json::to_string(src.value.as_str())?;
                        out.push_str(&format!("var {module} = require({specifier});"));
                        Some(module)
                    }
                    None => None,
                };
                for item in &decl.specifiers {
                    let value = match &module {
                        Some(module) => member(module, &item.local)?,
                        None => item.local.name().to_string(),
                    };
                    out.push(' ');
                    out.push_str(&export_getter(item.exported.name().as_str(), &value)?);
                }
                edits.push(replace(source, decl.span, out.trim_start().to_string()));
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        Some(f.id.as_ref().map(|id| id.name.to_string()))
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        Some(c.id.as_ref().map(|id| id.name.to_string()))
                    }
                    _ => None,
                };
                let start = decl.declaration.span().start;
                match named {
                    // `export default function f() {}` keeps `f` in scope
                    Some(Some(name)) => {
                        edits.push((decl.span.start, start, String::new()));
                        edits.push((
                            decl.span.end,
                            decl.span.end,
                            format!(" exports[\"default\"] = {name};"),
                        ));
                    }
                    Some(None) => {
                        edits.push((decl.span.start, start, "exports[\"default\"] = ".into()));
                        edits.push((decl.span.end, decl.span.end, ";".into()));
                    }
                    None => {
                        edits.push((decl.span.start, start, "exports[\"default\"] = ".into()));
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let specifier = serde_json::to_string(decl.source.value.as_str())?;
                let out = match &decl.exported {
                    Some(name) => {
                        let module = binding();
                        format!(
                            "var {module} = require({specifier}); {}",
                            export_getter(name.name().as_str(), &module)?
                        )
                    }
                    None => format!("__saplExportAll(require({specifier}));"),
                };
                edits.push(replace(source, decl.span, out));
            }
            _ => {}
        }
    }

    if edits.is_empty() {
        return Ok(None);
    }
    edits.sort_by_key(|(start, end, _)| (*start, *end));

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (start, end, text) in edits {
        out.push_str(&source[last..start as usize]);
        out.push_str(&text);
        last = end as usize;
    }
    out.push_str(&source[last..]);
    Ok(Some(out))
}

/// Replace a whole statement, padding with the newlines it spanned.
fn replace(source: &str, span: Span, text: String) -> (u32, u32, String) {
    let newlines = source[span.start as usize..span.end as usize].matches('\n').count();
    (span.start, span.end, text + &"\n".repeat(newlines))
}

/// `module["name"]`, or the default-interop call for `default`.
fn member(module: &str, name: &ModuleExportName<'_>) -> Result<String> {
    let name = name.name();
    if name.as_str() == "default" {
        return Ok(format!("__saplDefault({module})"));
    }
    Ok(format!("{module}[{}]", serde_json::to_string(name.as_str())?))
}

fn export_getter(name: &str, value: &str) -> Result<String> {
    Ok(format!(
        "__saplExport({}, function () {{ return {value}; }});",
        serde_json::to_string(name)?
    ))
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn resolve(specifier: &str, from: &Path, root: &Path) -> Option<PathBuf> {
    let relative = specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == "..";

    let found = if relative {
        let target = if specifier.starts_with('/') {
            root.join(specifier.trim_start_matches('/'))
        } else {
            from.join(specifier)
        };
        resolve_target(&target)
    } else {
        from.ancestors()
            .take_while(|dir| dir.starts_with(root))
            .find_map(|dir| resolve_target(&dir.join("node_modules").join(specifier)))
    };

    found.and_then(|p| p.canonicalize().ok())
}

fn resolve_target(target: &Path) -> Option<PathBuf> {
    resolve_file(target).or_else(|| resolve_directory(target))
}

fn resolve_file(target: &Path) -> Option<PathBuf> {
    if target.is_file() {
        return Some(target.to_path_buf());
    }
    let name = target.file_name()?.to_string_lossy();
    ["js", "json"]
        .iter()
        .map(|ext| target.with_file_name(format!("{name}.{ext}")))
        .find(|candidate| candidate.is_file())
}

fn resolve_directory(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    if let Ok(manifest) = fs::read_to_string(dir.join("package.json"))
        && let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&manifest)
        && let Some(main) = manifest.get("main").and_then(|m| m.as_str())
    {
        let main = dir.join(main);
        if let Some(found) = resolve_file(&main).or_else(|| resolve_index(&main)) {
            return Some(found);
        }
    }
    resolve_index(dir)
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    ["index.js", "index.json"]
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}
