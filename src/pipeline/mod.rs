//! Run planning and execution.
//!
//! A [`Plan`] is chosen once from the mode:
//!
//! ```text
//! production    Build(clean -> { html, images, sprites, ... })
//! development   Watch([ views/*.html -> html,
//!                       assets/sass/**/*.scss -> sass,
//!                       assets/js/**/*.js -> javascript, lint ])
//! ```
//!
//! [`runner`] executes a [`TaskGraph`]; the watch actors turn change batches
//! into stage lists with [`stages_for_changes`].

mod clean;
mod error;
pub mod runner;

pub use clean::clean_output;
pub use error::{CleanError, PipelineError, StageError, TransformFault};
pub use runner::{RunSummary, StageContext, run_plan, run_stages};

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::SiteConfig;
use crate::core::Mode;
use crate::stage::{Registry, StageId, UnknownStageError};
use crate::utils::glob::Globs;

/// A node of the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Clean,
    Stage(StageId),
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => f.write_str("clean"),
            Self::Stage(id) => write!(f, "{id}"),
        }
    }
}

/// Tasks plus "must finish before" edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    edges: Vec<(Task, Task)>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Task) -> &mut Self {
        if !self.tasks.contains(&task) {
            self.tasks.push(task);
        }
        self
    }

    /// `before` must complete successfully before `after` starts.
    pub fn add_edge(&mut self, before: Task, after: Task) -> &mut Self {
        self.add_task(before).add_task(after);
        if !self.edges.contains(&(before, after)) {
            self.edges.push((before, after));
        }
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn stage_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, Task::Stage(_)))
            .count()
    }

    pub fn dependencies(&self, task: Task) -> impl Iterator<Item = Task> + '_ {
        self.edges
            .iter()
            .filter(move |(_, after)| *after == task)
            .map(|(before, _)| *before)
    }

    pub fn dependents(&self, task: Task) -> impl Iterator<Item = Task> + '_ {
        self.edges
            .iter()
            .filter(move |(before, _)| *before == task)
            .map(|(_, after)| *after)
    }

    /// Clean, then every registered producing stage.
    pub fn production(registry: &Registry) -> Self {
        let mut graph = Self::new();
        graph.add_task(Task::Clean);
        for id in registry.ids().filter(|id| id.is_producing()) {
            graph.add_edge(Task::Clean, Task::Stage(id));
        }
        graph
    }

    /// Independent stages, no clean.
    pub fn stages(ids: impl IntoIterator<Item = StageId>) -> Self {
        let mut graph = Self::new();
        for id in ids {
            graph.add_task(Task::Stage(id));
        }
        graph
    }
}

/// Changes under `globs` re-run `stages`.
#[derive(Debug, Clone)]
pub struct WatchSubscription {
    pub globs: Globs,
    pub stages: Vec<StageId>,
}

impl WatchSubscription {
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        self.globs.matches(root, path)
    }
}

#[derive(Debug, Clone)]
pub enum Plan {
    Build(TaskGraph),
    Watch(Vec<WatchSubscription>),
}

impl Plan {
    pub fn for_mode(
        mode: Mode,
        registry: &Registry,
        config: &SiteConfig,
    ) -> Result<Self, PipelineError> {
        match mode {
            Mode::Production => Ok(Self::Build(TaskGraph::production(registry))),
            Mode::Development => Ok(Self::Watch(watch_subscriptions(registry, config)?)),
        }
    }
}

fn watch_subscriptions(
    registry: &Registry,
    config: &SiteConfig,
) -> Result<Vec<WatchSubscription>, PipelineError> {
    let table: [(&str, &[&str]); 3] = [
        ("views/*.html", &["html"]),
        ("assets/sass/**/*.scss", &["sass"]),
        ("assets/js/**/*.js", &["javascript", "lint"]),
    ];

    table
        .into_iter()
        .map(|(pattern, names)| {
            let stages = names
                .iter()
                .map(|name| Ok(registry.resolve_named(name, Mode::Development)?.id))
                .collect::<Result<Vec<_>, UnknownStageError>>()?;
            Ok(WatchSubscription {
                globs: Globs::new([config.source_pattern(pattern)])?,
                stages,
            })
        })
        .collect()
}

/// Union of the stages mapped to `paths`, in subscription order.
pub fn stages_for_changes(
    subscriptions: &[WatchSubscription],
    root: &Path,
    paths: &[PathBuf],
) -> Vec<StageId> {
    let mut stages = Vec::new();
    for sub in subscriptions {
        if paths.iter().any(|p| sub.matches(root, p)) {
            for id in &sub.stages {
                if !stages.contains(id) {
                    stages.push(*id);
                }
            }
        }
    }
    stages
}
