//! Task graph execution.
//!
//! Tasks start as soon as all their dependencies have succeeded. Every stage
//! transform runs on the blocking pool, so independent stages overlap and a
//! slow one (sass, images) never holds up the rest. A failed task skips its
//! dependents; siblings always run to completion.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tokio::task::{Id, JoinError, JoinSet};

use super::{CleanError, PipelineError, StageError, Task, TaskGraph, TransformFault, clean_output};
use crate::config::SiteConfig;
use crate::core::Mode;
use crate::stage::{Registry, ResolvedStage, StageId};
use crate::transform::{Artifact, Contents, StageJob};
use crate::utils::plural_count;
use crate::{debug, log};

/// Where and how stages run.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub root: PathBuf,
    /// Directory removed by [`Task::Clean`].
    pub output: PathBuf,
    pub mode: Mode,
}

impl StageContext {
    pub fn new(config: &SiteConfig, mode: Mode) -> Self {
        Self {
            root: config.root.clone(),
            output: config.output_dir(),
            mode,
        }
    }
}

/// A stage that completed without failures.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: StageId,
    pub inputs: usize,
    pub written: usize,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<StageReport>,
    pub failures: Vec<StageError>,
    pub clean: Option<CleanError>,
    /// Stages never started because a dependency failed.
    pub skipped: Vec<StageId>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.clean.is_none() && self.failures.is_empty()
    }

    pub fn files_written(&self) -> usize {
        self.reports.iter().map(|r| r.written).sum()
    }

    pub fn into_result(self) -> Result<Self, PipelineError> {
        if let Some(err) = self.clean {
            return Err(PipelineError::Clean(err));
        }
        if !self.failures.is_empty() {
            return Err(PipelineError::Stages(self.failures));
        }
        Ok(self)
    }
}

enum Outcome {
    Cleaned(Result<(), CleanError>),
    Stage(Result<StageReport, StageError>),
}

type Stages = FxHashMap<StageId, Arc<ResolvedStage>>;

/// Execute `graph`.
///
/// Every stage is resolved before anything runs, so an unregistered stage
/// fails the whole run up front. `on_finish` sees each task as it completes,
/// with whether it succeeded.
pub async fn run_plan<F>(
    graph: &TaskGraph,
    registry: &Registry,
    ctx: &StageContext,
    mut on_finish: F,
) -> Result<RunSummary, PipelineError>
where
    F: FnMut(Task, bool),
{
    let started = Instant::now();

    let mut stages = Stages::default();
    for task in graph.tasks() {
        if let Task::Stage(id) = *task {
            stages.insert(id, Arc::new(registry.resolve(id, ctx.mode)?));
        }
    }

    // Unfinished dependencies per task. Entries leave the map on completion.
    let mut waiting: FxHashMap<Task, usize> = graph
        .tasks()
        .iter()
        .map(|t| (*t, graph.dependencies(*t).count()))
        .collect();

    let mut set = JoinSet::new();
    let mut running: FxHashMap<Id, Task> = FxHashMap::default();
    for task in graph.tasks().iter().filter(|t| waiting[*t] == 0) {
        if let Some(id) = spawn_task(&mut set, *task, &stages, ctx) {
            running.insert(id, *task);
        }
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = set.join_next_with_id().await {
        let (task, outcome) = match joined {
            Ok((id, done)) => {
                running.remove(&id);
                done
            }
            Err(e) => {
                let Some(task) = running.remove(&e.id()) else {
                    log!("error"; "task aborted: {e}");
                    continue;
                };
                (task, aborted(task, e, ctx))
            }
        };
        waiting.remove(&task);

        let ok = match outcome {
            Outcome::Cleaned(Ok(())) => true,
            Outcome::Cleaned(Err(e)) => {
                summary.clean = Some(e);
                false
            }
            Outcome::Stage(Ok(report)) => {
                summary.reports.push(report);
                true
            }
            Outcome::Stage(Err(e)) => {
                summary.failures.push(e);
                false
            }
        };
        debug!("run"; "{task} {}", if ok { "done" } else { "failed" });
        on_finish(task, ok);

        if ok {
            for next in graph.dependents(task) {
                if let Some(count) = waiting.get_mut(&next) {
                    *count -= 1;
                    if *count == 0
                        && let Some(id) = spawn_task(&mut set, next, &stages, ctx)
                    {
                        running.insert(id, next);
                    }
                }
            }
        }
    }

    summary.skipped = graph
        .tasks()
        .iter()
        .filter(|t| waiting.contains_key(*t))
        .filter_map(|t| match t {
            Task::Stage(id) => Some(*id),
            Task::Clean => None,
        })
        .collect();
    summary.reports.sort_by_key(|r| r.stage);
    summary.failures.sort_by_key(|e| e.stage);
    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// Run `ids` concurrently, without clean.
pub async fn run_stages<F>(
    ids: &[StageId],
    registry: &Registry,
    ctx: &StageContext,
    on_finish: F,
) -> Result<RunSummary, PipelineError>
where
    F: FnMut(Task, bool),
{
    run_plan(&TaskGraph::stages(ids.iter().copied()), registry, ctx, on_finish).await
}

fn spawn_task(
    set: &mut JoinSet<(Task, Outcome)>,
    task: Task,
    stages: &Stages,
    ctx: &StageContext,
) -> Option<Id> {
    let handle = match task {
        Task::Clean => {
            let output = ctx.output.clone();
            set.spawn(async move {
                let path = output.clone();
                let result = tokio::task::spawn_blocking(move || clean_output(&output))
                    .await
                    .unwrap_or_else(|e| {
                        Err(CleanError {
                            path,
                            source: std::io::Error::other(e.to_string()),
                        })
                    });
                (task, Outcome::Cleaned(result))
            })
        }
        Task::Stage(id) => {
            let stage = stages.get(&id).map(Arc::clone)?;
            let root = ctx.root.clone();
            set.spawn(async move {
                let result = tokio::task::spawn_blocking(move || run_stage(&stage, &root))
                    .await
                    .unwrap_or_else(|e| Err(fault(id, e).into()));
                (task, Outcome::Stage(result))
            })
        }
    };
    Some(handle.id())
}

/// Outcome of a task whose wrapper future died before reporting.
fn aborted(task: Task, err: JoinError, ctx: &StageContext) -> Outcome {
    match task {
        Task::Clean => Outcome::Cleaned(Err(CleanError {
            path: ctx.output.clone(),
            source: std::io::Error::other(err.to_string()),
        })),
        Task::Stage(id) => Outcome::Stage(Err(fault(id, err).into())),
    }
}

fn fault(stage: StageId, err: JoinError) -> TransformFault {
    if err.is_panic() {
        TransformFault::from_panic(stage, err.into_panic())
    } else {
        TransformFault {
            stage,
            message: err.to_string(),
        }
    }
}

/// Expand inputs, transform, write. Blocking.
///
/// Artifacts are written even when some files failed, so only the failed
/// files keep their previous output.
pub fn run_stage(stage: &ResolvedStage, root: &Path) -> Result<StageReport, StageError> {
    let started = Instant::now();
    let files = stage
        .inputs
        .expand(root)
        .map_err(|e| StageError::new(stage.id, e.to_string()))?;
    debug!("stage"; "{} matched {}", stage.id, plural_count(files.len(), "file"));

    let job = StageJob {
        stage: stage.id,
        files: &files,
        output_dir: stage.output_dir.as_deref(),
        options: &stage.options,
        root,
    };
    let output = stage
        .transform
        .apply(&job)
        .map_err(|e| StageError::new(stage.id, format!("{e:#}")))?;

    let mut failures: Vec<String> = output.failures.iter().map(ToString::to_string).collect();
    let written = match &stage.output_dir {
        Some(dir) => {
            let errors = write_artifacts(dir, &output.artifacts);
            let written = output.artifacts.len() - errors.len();
            failures.extend(errors);
            written
        }
        None => 0,
    };

    if !failures.is_empty() {
        return Err(StageError {
            stage: stage.id,
            message: failures.join("\n"),
            notes: output.notes,
        });
    }

    Ok(StageReport {
        stage: stage.id,
        inputs: files.len(),
        written,
        notes: output.notes,
        elapsed: started.elapsed(),
    })
}

fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> Vec<String> {
    artifacts
        .par_iter()
        .filter_map(|artifact| write_artifact(dir, artifact).err())
        .map(|e| format!("{e:#}"))
        .collect()
}

fn write_artifact(dir: &Path, artifact: &Artifact) -> anyhow::Result<()> {
    let dest = dir.join(&artifact.path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match &artifact.contents {
        Contents::Bytes(bytes) => {
            fs::write(&dest, bytes).with_context(|| format!("failed to write {}", dest.display()))
        }
        Contents::Copy(source) => fs::copy(source, &dest).map(drop).with_context(|| {
            format!("failed to copy {} to {}", source.display(), dest.display())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use crate::stage::{ByMode, StageOptions};
    use crate::transform::{StageOutput, Transform};
    use crate::utils::glob::Globs;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> StageContext {
        StageContext {
            root: dir.path().to_path_buf(),
            output: dir.path().join("dist"),
            mode: Mode::Production,
        }
    }

    fn register(registry: &mut Registry, dir: &TempDir, id: StageId, transform: Arc<dyn Transform>) {
        registry.register(
            id,
            Globs::new(["src/*.txt"]).unwrap(),
            Some(dir.path().join("dist").join(id.as_str())),
            transform,
            ByMode::same(StageOptions::Copy),
        );
    }

    fn writes(name: &'static str) -> Arc<dyn Transform> {
        Arc::new(move |_: &StageJob<'_>| -> anyhow::Result<StageOutput> {
            let mut output = StageOutput::default();
            output.artifacts.push(Artifact::bytes(name, "new"));
            Ok(output)
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_precedes_every_stage() {
        for delays in [[0, 20, 40, 5], [40, 0, 10, 30], [5, 5, 5, 5]] {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("dist")).unwrap();
            fs::write(dir.path().join("dist/stale.txt"), "old").unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            let stale = dir.path().join("dist/stale.txt");
            let mut registry = Registry::new();
            let ids = [StageId::Html, StageId::Css, StageId::Fonts, StageId::Videos];
            for (id, delay) in ids.into_iter().zip(delays) {
                let seen = Arc::clone(&seen);
                let stale = stale.clone();
                let transform = move |job: &StageJob<'_>| -> anyhow::Result<StageOutput> {
                    std::thread::sleep(Duration::from_millis(delay));
                    seen.lock().push((job.stage, stale.exists()));
                    let mut output = StageOutput::default();
                    output.artifacts.push(Artifact::bytes("out.txt", job.stage.as_str()));
                    Ok(output)
                };
                register(&mut registry, &dir, id, Arc::new(transform));
            }

            let mut order = Vec::new();
            let graph = TaskGraph::production(&registry);
            let summary = run_plan(&graph, &registry, &context(&dir), |task, _| order.push(task))
                .await
                .unwrap();

            assert!(summary.is_success());
            assert_eq!(order[0], Task::Clean);
            assert_eq!(order.len(), 5);
            let seen = seen.lock();
            assert_eq!(seen.len(), 4);
            assert!(seen.iter().all(|(_, stale_present)| !stale_present));
            assert!(!stale.exists());
            for id in ids {
                assert_eq!(
                    fs::read_to_string(dir.path().join("dist").join(id.as_str()).join("out.txt"))
                        .unwrap(),
                    id.as_str()
                );
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_partial_failure_keeps_siblings() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        register(&mut registry, &dir, StageId::Css, writes("ok.css"));
        register(
            &mut registry,
            &dir,
            StageId::Sass,
            Arc::new(|_: &StageJob<'_>| -> anyhow::Result<StageOutput> {
                anyhow::bail!("undefined variable $brand")
            }),
        );
        register(&mut registry, &dir, StageId::Fonts, writes("ok.woff"));

        let graph = TaskGraph::production(&registry);
        let summary = run_plan(&graph, &registry, &context(&dir), |_, _| {})
            .await
            .unwrap();

        assert!(!summary.is_success());
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, StageId::Sass);
        assert_eq!(summary.failures[0].message, "undefined variable $brand");
        assert!(dir.path().join("dist/css/ok.css").exists());
        assert!(dir.path().join("dist/fonts/ok.woff").exists());

        let err = summary.into_result().unwrap_err();
        assert!(matches!(err, PipelineError::Stages(ref v) if v.len() == 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_file_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist/css");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.css"), "old a").unwrap();
        fs::write(out.join("b.css"), "old b").unwrap();

        let mut registry = Registry::new();
        register(
            &mut registry,
            &dir,
            StageId::Css,
            Arc::new(|_: &StageJob<'_>| -> anyhow::Result<StageOutput> {
                let mut output = StageOutput::default();
                output.artifacts.push(Artifact::bytes("a.css", "new a"));
                output.fail("b.css", "unexpected token");
                Ok(output)
            }),
        );

        let summary = run_stages(&[StageId::Css], &registry, &context(&dir), |_, _| {})
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].message, "b.css: unexpected token");
        assert_eq!(fs::read_to_string(out.join("a.css")).unwrap(), "new a");
        assert_eq!(fs::read_to_string(out.join("b.css")).unwrap(), "old b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_becomes_stage_error() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        register(
            &mut registry,
            &dir,
            StageId::Images,
            Arc::new(|_: &StageJob<'_>| -> anyhow::Result<StageOutput> {
                panic!("decoder exploded")
            }),
        );
        register(&mut registry, &dir, StageId::Videos, writes("clip.mp4"));

        let summary = run_stages(
            &[StageId::Images, StageId::Videos],
            &registry,
            &context(&dir),
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, StageId::Images);
        assert!(summary.failures[0].message.contains("decoder exploded"));
        assert_eq!(summary.reports[0].stage, StageId::Videos);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_aborted_task_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let err = tokio::spawn(async { panic!("runtime lost the task") })
            .await
            .unwrap_err();

        let Outcome::Stage(Err(stage_err)) = aborted(Task::Stage(StageId::Sass), err, &context(&dir))
        else {
            panic!("expected a stage failure");
        };
        assert_eq!(stage_err.stage, StageId::Sass);
        assert!(stage_err.message.contains("runtime lost the task"));

        let err = tokio::spawn(async { panic!("gone") }).await.unwrap_err();
        let Outcome::Cleaned(Err(clean_err)) = aborted(Task::Clean, err, &context(&dir)) else {
            panic!("expected a clean failure");
        };
        assert_eq!(clean_err.path, dir.path().join("dist"));
    }

    /// Transform panics are only recoverable when the binary unwinds.
    #[test]
    fn test_release_profile_unwinds() {
        let manifest: toml::Table = toml::from_str(include_str!("../../Cargo.toml")).unwrap();
        let panic = manifest
            .get("profile")
            .and_then(|p| p.get("release"))
            .and_then(|r| r.get("panic"))
            .and_then(|v| v.as_str());
        assert_ne!(panic, Some("abort"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_stage_fails_up_front() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        register(&mut registry, &dir, StageId::Css, writes("a.css"));

        let err = run_stages(&[StageId::Css, StageId::Sass], &registry, &context(&dir), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStage(ref e) if e.name == "sass"));
        assert!(!dir.path().join("dist").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_failure_skips_stages() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dist"), "a file, not a directory").unwrap();

        let mut registry = Registry::new();
        register(&mut registry, &dir, StageId::Css, writes("a.css"));
        register(&mut registry, &dir, StageId::Html, writes("index.html"));

        let mut finished = Vec::new();
        let graph = TaskGraph::production(&registry);
        let summary = run_plan(&graph, &registry, &context(&dir), |task, ok| {
            finished.push((task, ok))
        })
        .await
        .unwrap();

        assert_eq!(finished, vec![(Task::Clean, false)]);
        assert!(summary.clean.is_some());
        assert!(summary.reports.is_empty());
        assert_eq!(summary.skipped, vec![StageId::Html, StageId::Css]);
        assert!(matches!(
            summary.into_result(),
            Err(PipelineError::Clean(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_absent_output() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        register(&mut registry, &dir, StageId::Css, writes("a.css"));

        let graph = TaskGraph::production(&registry);
        let summary = run_plan(&graph, &registry, &context(&dir), |_, _| {})
            .await
            .unwrap();
        assert!(summary.is_success());
        assert!(dir.path().join("dist/css/a.css").exists());
    }

    // ------------------------------------------------------------------------
    // Standard registry
    // ------------------------------------------------------------------------

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "src/views/index.html",
            b"<!DOCTYPE html>\n<html>\n  <!-- nav -->\n  <body><p>hi</p></body>\n</html>\n",
        );
        write(root, "src/assets/css/reset.css", b"* { margin: 0px; padding: 0px; }\n");
        write(
            root,
            "src/assets/sass/main.scss",
            b"$brand: #336699;\n.nav { a { color: $brand; display: flex; } }\n",
        );
        write(
            root,
            "src/assets/js/app.js",
            b"var greet = require('./lib/greet');\nconsole.log(greet('sapl'));\n",
        );
        write(
            root,
            "src/assets/js/lib/greet.js",
            b"module.exports = function (name) { return 'hello ' + name; };\n",
        );
        write(root, "src/assets/js/vendors/jq.js", b"window.$ = {};\n");
        write(
            root,
            "src/assets/fonts/sprites/a.svg",
            br#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><path d="M0 0h10v10z"/></svg>"#,
        );
        write(root, "src/assets/fonts/icons.woff", b"wOFF");
        write(root, "src/assets/videos/intro.mp4", b"\x00\x00\x00\x18ftypmp42");

        let png = root.join("src/assets/images/logo.png");
        fs::create_dir_all(png.parent().unwrap()).unwrap();
        image::RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40]))
            .save(&png)
            .unwrap();
        dir
    }

    fn tree_digest(dir: &Path) -> String {
        fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, files);
                } else {
                    files.push(path);
                }
            }
        }
        let mut files = Vec::new();
        walk(dir, &mut files);
        files.sort();

        let mut hasher = blake3::Hasher::new();
        for file in files {
            hasher.update(file.strip_prefix(dir).unwrap().to_string_lossy().as_bytes());
            hasher.update(&fs::read(&file).unwrap());
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_production_build_is_idempotent() {
        let dir = project();
        let mut config = test_parse_config("");
        config.root = dir.path().to_path_buf();
        let registry = Registry::standard(&config).unwrap();
        let ctx = StageContext::new(&config, Mode::Production);
        let graph = TaskGraph::production(&registry);

        let first = run_plan(&graph, &registry, &ctx, |_, _| {}).await.unwrap();
        assert!(first.is_success(), "{:?}", first.failures);
        let digest = tree_digest(&config.output_dir());

        let dist = config.output_dir();
        for rel in [
            "index.html",
            "images/logo.png",
            "fonts/sapl-sprites.svg",
            "fonts/icons.woff",
            "videos/intro.mp4",
            "css/vendors/reset.min.css",
            "css/main.min.css",
            "js/app.bundle.js",
            "js/vendors/jq.js",
        ] {
            assert!(dist.join(rel).is_file(), "missing {rel}");
        }
        assert_eq!(first.reports.len(), 9);

        fs::write(dist.join("leftover.txt"), "x").unwrap();
        let second = run_plan(&graph, &registry, &ctx, |_, _| {}).await.unwrap();
        assert!(second.is_success());
        assert_eq!(tree_digest(&dist), digest);
    }
}
