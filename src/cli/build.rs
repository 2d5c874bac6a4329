//! Production build.
//!
//! Cleans the output directory, then runs every producing stage at once:
//!
//! ```text
//! [build] stages(7/9)
//! [build] 9 stages, 23 files in 412ms
//! ```

use anyhow::Result;

use crate::core::Mode;
use crate::logger::ProgressLine;
use crate::pipeline::{RunSummary, StageContext, Task, TaskGraph, run_plan};
use crate::stage::Registry;
use crate::utils::plural_count;
use crate::{debug, log};

/// Run `graph` to completion and report. Fails if any task failed.
pub fn build_assets(
    graph: &TaskGraph,
    registry: &Registry,
    ctx: &StageContext,
) -> Result<RunSummary> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let progress = ProgressLine::new(&[("stages", graph.stage_count())]);
    let summary = rt.block_on(run_plan(graph, registry, ctx, |task, _| {
        if matches!(task, Task::Stage(_)) {
            progress.inc("stages");
        }
    }))?;
    progress.finish();

    report(&summary, ctx.mode);
    Ok(summary.into_result()?)
}

fn report(summary: &RunSummary, mode: Mode) {
    for stage in &summary.reports {
        debug!(
            "build";
            "{}: {} -> {} ({}ms)",
            stage.stage,
            plural_count(stage.inputs, "input"),
            plural_count(stage.written, "file"),
            stage.elapsed.as_millis()
        );
        for note in &stage.notes {
            log!(stage.stage.as_str(); "{note}");
        }
    }

    if let Some(err) = &summary.clean {
        log!("clean"; "{}: {}", err, err.source);
    }
    for failure in &summary.failures {
        for note in &failure.notes {
            log!(failure.stage.as_str(); "{note}");
        }
        log!("error"; "{}", failure);
    }
    if !summary.skipped.is_empty() {
        let names: Vec<_> = summary.skipped.iter().map(|id| id.as_str()).collect();
        log!("build"; "skipped {}", names.join(", "));
    }

    if summary.is_success() {
        log!(
            "build";
            "{}, {} in {}ms ({mode})",
            plural_count(summary.reports.len(), "stage"),
            plural_count(summary.files_written(), "file"),
            summary.elapsed.as_millis()
        );
    }
}
