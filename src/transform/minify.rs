//! JavaScript and CSS minification.
//!
//! Uses oxc for JavaScript and lightningcss for CSS.

use anyhow::{Result, anyhow, bail};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

/// Minify a CommonJS script (a bundle).
pub fn minify_js(source: &str) -> Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(error) = ret.errors.first() {
        bail!("{error}");
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Ok(code)
}

/// Minify CSS, lowering and prefixing for `targets`.
pub fn minify_css(source: &str, targets: Targets) -> Result<String> {
    let mut stylesheet =
        StyleSheet::parse(source, ParserOptions::default()).map_err(|e| anyhow!("{e}"))?;
    stylesheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;
    Ok(result.code)
}

/// Browserslist queries -> lightningcss targets.
pub fn browser_targets(queries: &[String]) -> Result<Targets> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| anyhow!("invalid browserslist query: {e}"))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_js_mangles_locals() {
        let source = "function add(first, second) {\n  return first + second;\n}\nmodule.exports = add;\n";
        let minified = minify_js(source).unwrap();
        assert!(minified.len() < source.len());
        assert!(!minified.contains("first"));
        assert!(minified.contains("module.exports"));
    }

    #[test]
    fn test_minify_js_syntax_error() {
        let err = minify_js("function (").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_minify_css() {
        let minified = minify_css("a {\n  color: #ff0000;\n}\n", Targets::default()).unwrap();
        assert_eq!(minified, "a{color:red}");
    }

    #[test]
    fn test_minify_css_prefixes_for_old_browsers() {
        let targets = browser_targets(&["safari 5".to_string()]).unwrap();
        let minified = minify_css(".box { user-select: none; }", targets).unwrap();
        assert!(minified.contains("-webkit-user-select"));
    }

    #[test]
    fn test_invalid_browserslist() {
        assert!(browser_targets(&["not a browser 99".to_string()]).is_err());
    }
}
