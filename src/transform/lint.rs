//! JavaScript linting.
//!
//! Syntax and early errors come from the oxc parser and semantic checker.
//! A few rules run over the semantic node list:
//!
//! | Rule          | Severity | Finds                          |
//! |---------------|----------|--------------------------------|
//! | `no-debugger` | error    | `debugger;`                    |
//! | `eqeqeq`      | warning  | `==` and `!=`                  |
//! | `no-console`  | warning  | `console.*(...)` calls         |
//!
//! Findings are printed in the familiar "stylish" layout. The stage fails
//! when any file has an error.

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Result;
use oxc::allocator::Allocator;
use oxc::ast::AstKind;
use oxc::ast::ast::Expression;
use oxc::diagnostics::OxcDiagnostic;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::syntax::operator::BinaryOperator;
use rayon::prelude::*;

use super::{StageJob, StageOutput, Transform, read_source};
use crate::stage::StageOptions;
use crate::utils::plural_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    /// `None` for parse and early errors.
    pub rule: Option<&'static str>,
}

pub struct LintTransform;

impl Transform for LintTransform {
    fn apply(&self, job: &StageJob<'_>) -> Result<StageOutput> {
        let StageOptions::Lint(options) = job.options else {
            return Err(job.options_mismatch());
        };

        let results: Vec<(PathBuf, Result<Vec<Finding>>)> = job
            .files
            .par_iter()
            .map(|file| {
                let display = file.path.strip_prefix(job.root).unwrap_or(&file.path);
                (
                    display.to_path_buf(),
                    read_source(file).map(|source| lint_source(&source)),
                )
            })
            .collect();

        let mut output = StageOutput::default();
        let mut reports = Vec::new();
        for (path, result) in results {
            match result {
                Ok(findings) => {
                    let errors = findings
                        .iter()
                        .filter(|f| f.severity == Severity::Error)
                        .count();
                    if options.fail_on_error && errors > 0 {
                        output.fail(&path, plural_count(errors, "lint error"));
                    }
                    if !findings.is_empty() {
                        reports.push((path, findings));
                    }
                }
                Err(e) => output.fail(&path, format!("{e:#}")),
            }
        }

        if !reports.is_empty() {
            output.notes.push(format_stylish(&reports));
        }
        Ok(output)
    }
}

/// Lint one script.
pub fn lint_source(source: &str) -> Vec<Finding> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::unambiguous()).parse();

    let syntax = |error: &OxcDiagnostic| {
        let (line, column) = diagnostic_position(source, error);
        Finding {
            line,
            column,
            severity: Severity::Error,
            message: error.message.to_string(),
            rule: None,
        }
    };

    if !ret.errors.is_empty() {
        return ret.errors.iter().map(syntax).collect();
    }

    let semantic_ret = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(&ret.program);
    let mut findings: Vec<Finding> = semantic_ret.errors.iter().map(syntax).collect();

    let at = |offset: u32, severity, message: &str, rule| {
        let (line, column) = line_column(source, offset as usize);
        Finding {
            line,
            column,
            severity,
            message: message.to_string(),
            rule: Some(rule),
        }
    };

    for node in semantic_ret.semantic.nodes().iter() {
        match node.kind() {
            AstKind::DebuggerStatement(stmt) => findings.push(at(
                stmt.span.start,
                Severity::Error,
                "Unexpected 'debugger' statement",
                "no-debugger",
            )),
            AstKind::BinaryExpression(expr) => {
                let (expected, found) = match expr.operator {
                    BinaryOperator::Equality => ("===", "=="),
                    BinaryOperator::Inequality => ("!==", "!="),
                    _ => continue,
                };
                findings.push(at(
                    expr.span.start,
                    Severity::Warning,
                    &format!("Expected '{expected}' and instead saw '{found}'"),
                    "eqeqeq",
                ));
            }
            AstKind::CallExpression(call) => {
                if let Expression::StaticMemberExpression(member) = &call.callee
                    && let Expression::Identifier(object) = &member.object
                    && object.name.as_str() == "console"
                {
                    findings.push(at(
                        call.span.start,
                        Severity::Warning,
                        "Unexpected console statement",
                        "no-console",
                    ));
                }
            }
            _ => {}
        }
    }

    findings.sort_by_key(|f| (f.line, f.column));
    findings
}

/// 1-based line and column of a diagnostic's first label.
pub fn diagnostic_position(source: &str, diagnostic: &OxcDiagnostic) -> (usize, usize) {
    let offset = diagnostic
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map_or(0, |label| label.offset());
    line_column(source, offset)
}

pub(super) fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source.as_bytes()[..offset.min(source.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
    (line, column)
}

/// eslint "stylish" report.
///
/// ```text
/// src/assets/js/app.js
///   3:5  error    Unexpected 'debugger' statement  no-debugger
///
/// ✖ 1 problem (1 error, 0 warnings)
/// ```
pub fn format_stylish(reports: &[(PathBuf, Vec<Finding>)]) -> String {
    let mut out = String::new();
    let (mut errors, mut warnings) = (0, 0);

    for (path, findings) in reports {
        let _ = writeln!(out, "{}", display_path(path));
        let position_width = findings
            .iter()
            .map(|f| format!("{}:{}", f.line, f.column).len())
            .max()
            .unwrap_or(0);
        let message_width = findings.iter().map(|f| f.message.len()).max().unwrap_or(0);

        for finding in findings {
            match finding.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            let position = format!("{}:{}", finding.line, finding.column);
            let line = format!(
                "  {position:<position_width$}  {:<7}  {:<message_width$}  {}",
                finding.severity,
                finding.message,
                finding.rule.unwrap_or(""),
            );
            let _ = writeln!(out, "{}", line.trim_end());
        }
        out.push('\n');
    }

    let total = errors + warnings;
    let _ = write!(
        out,
        "\u{2716} {} ({}, {})",
        plural_count(total, "problem"),
        plural_count(errors, "error"),
        plural_count(warnings, "warning"),
    );
    out
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{LintOptions, StageId};
    use crate::utils::glob::Globs;
    use std::fs;
    use tempfile::TempDir;

    fn rules(findings: &[Finding]) -> Vec<Option<&'static str>> {
        findings.iter().map(|f| f.rule).collect()
    }

    #[test]
    fn test_clean_source() {
        assert!(lint_source("var a = 1;\nmodule.exports = a === 1;\n").is_empty());
    }

    #[test]
    fn test_rules() {
        let source = "var a = 1;\nif (a == 2) {\n  debugger;\n}\nconsole.log(a != 3);\n";
        let findings = lint_source(source);
        assert_eq!(
            rules(&findings),
            vec![Some("eqeqeq"), Some("no-debugger"), Some("no-console"), Some("eqeqeq")]
        );
        assert_eq!((findings[0].line, findings[0].column), (2, 5));
        assert_eq!((findings[1].line, findings[1].column), (3, 3));
        assert_eq!(findings[1].severity, Severity::Error);
        assert_eq!(findings[2].severity, Severity::Warning);
    }

    #[test]
    fn test_es_module_source() {
        assert!(lint_source("import a from './a';\nexport default a;\n").is_empty());
    }

    #[test]
    fn test_syntax_error() {
        let findings = lint_source("var x = ;\n");
        assert!(!findings.is_empty());
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].rule, None);
        assert_eq!(findings[0].line, 1);
    }

    #[test]
    fn test_early_error() {
        let findings = lint_source("function f() {\n  break;\n}\n");
        assert!(findings.iter().any(|f| f.severity == Severity::Error && f.line == 2));
    }

    #[test]
    fn test_line_column() {
        let source = "ab\ncdé\nf";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 3), (2, 1));
        assert_eq!(line_column(source, 8), (3, 1));
        assert_eq!(line_column(source, 100), (3, 2));
    }

    #[test]
    fn test_severity_honours_width() {
        assert_eq!(format!("[{:<7}]", Severity::Error), "[error  ]");
        assert_eq!(format!("[{:<7}]", Severity::Warning), "[warning]");
    }

    #[test]
    fn test_stylish_format() {
        let reports = vec![(
            PathBuf::from("src/assets/js/app.js"),
            vec![
                Finding {
                    line: 3,
                    column: 5,
                    severity: Severity::Error,
                    message: "Unexpected 'debugger' statement".into(),
                    rule: Some("no-debugger"),
                },
                Finding {
                    line: 12,
                    column: 1,
                    severity: Severity::Warning,
                    message: "Unexpected console statement".into(),
                    rule: Some("no-console"),
                },
            ],
        )];
        assert_eq!(
            format_stylish(&reports),
            concat!(
                "src/assets/js/app.js\n",
                "  3:5   error    Unexpected 'debugger' statement  no-debugger\n",
                "  12:1  warning  Unexpected console statement     no-console\n",
                "\n",
                "\u{2716} 2 problems (1 error, 1 warning)"
            )
        );
    }

    #[test]
    fn test_transform_fails_on_error_only() {
        let dir = TempDir::new().unwrap();
        let js = dir.path().join("src/assets/js");
        fs::create_dir_all(js.join("vendors")).unwrap();
        fs::write(js.join("app.js"), "console.log(1 == 1);\n").unwrap();
        fs::write(js.join("debug.js"), "debugger;\n").unwrap();
        fs::write(js.join("vendors/jq.js"), "debugger;\n").unwrap();

        let files = Globs::new(["src/assets/js/**/*.js", "!src/assets/js/vendors/*.js"])
            .unwrap()
            .expand(dir.path())
            .unwrap();
        let options = StageOptions::Lint(LintOptions {
            fail_on_error: true,
        });
        let job = StageJob {
            stage: StageId::Lint,
            files: &files,
            output_dir: None,
            options: &options,
            root: dir.path(),
        };
        let output = LintTransform.apply(&job).unwrap();

        assert!(output.artifacts.is_empty());
        assert_eq!(output.failures.len(), 1);
        assert_eq!(
            output.failures[0].path,
            PathBuf::from("src/assets/js/debug.js")
        );
        assert_eq!(output.failures[0].message, "1 lint error");
        assert!(output.notes[0].contains("src/assets/js/app.js"));
        assert!(output.notes[0].contains("3 problems (1 error, 2 warnings)"));
    }
}
