//! Build actor.
//!
//! Turns each change batch into the union of subscribed stages, runs them
//! concurrently in development mode, and only once every one of them has
//! finished tells the WebSocket actor what happened:
//!
//! | Cycle result | Status block        | Clients                       |
//! |--------------|---------------------|-------------------------------|
//! | success      | `✓ sass, lint (40ms)` | `ClearError` if needed, `Reload` |
//! | failure      | `✗ lint failed` + detail | `Error` overlay, no reload |

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::{BuildMsg, WsMsg};
use crate::logger::{status_detach, status_error, status_success};
use crate::pipeline::{RunSummary, StageContext, WatchSubscription, run_stages, stages_for_changes};
use crate::stage::{Registry, StageId};
use crate::utils::path::display_relative;
use crate::{debug, log};

pub struct BuildActor {
    rx: mpsc::Receiver<BuildMsg>,
    ws_tx: mpsc::Sender<WsMsg>,
    registry: Arc<Registry>,
    subscriptions: Vec<WatchSubscription>,
    ctx: StageContext,
    /// Whether clients currently show an error overlay.
    showing_error: bool,
}

impl BuildActor {
    pub fn new(
        rx: mpsc::Receiver<BuildMsg>,
        ws_tx: mpsc::Sender<WsMsg>,
        registry: Arc<Registry>,
        subscriptions: Vec<WatchSubscription>,
        ctx: StageContext,
    ) -> Self {
        Self {
            rx,
            ws_tx,
            registry,
            subscriptions,
            ctx,
            showing_error: false,
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                BuildMsg::Changed(paths) => {
                    if self.rebuild(&paths).await.is_err() {
                        break;
                    }
                }
                BuildMsg::Shutdown => {
                    debug!("build"; "shutting down");
                    break;
                }
            }
        }
    }

    /// One watch cycle. `Err(())` once the WebSocket actor is gone.
    async fn rebuild(&mut self, paths: &[PathBuf]) -> Result<(), ()> {
        let stages = stages_for_changes(&self.subscriptions, &self.ctx.root, paths);
        if stages.is_empty() {
            let shown: Vec<_> = paths
                .iter()
                .map(|p| display_relative(p, &self.ctx.root))
                .collect();
            debug!("build"; "no stage watches {}", shown.join(", "));
            return Ok(());
        }
        let names = stage_names(&stages);
        debug!("build"; "running {names}");

        let summary = match run_stages(&stages, &self.registry, &self.ctx, |_, _| {}).await {
            Ok(summary) => summary,
            Err(e) => {
                log!("error"; "{e}");
                status_detach();
                return Ok(());
            }
        };

        if summary.is_success() {
            let mut message = format!("{names} ({}ms)", summary.elapsed.as_millis());
            for note in summary.reports.iter().flat_map(|r| &r.notes) {
                message.push('\n');
                message.push_str(note);
            }
            status_success(&message);

            if self.showing_error {
                self.showing_error = false;
                self.send(WsMsg::ClearError).await?;
            }
            self.send(WsMsg::Reload { reason: names }).await
        } else {
            let (summary_line, detail) = failure_text(&summary);
            status_error(&summary_line, &detail);

            let stage = summary
                .failures
                .first()
                .map_or_else(String::new, |e| e.stage.to_string());
            self.showing_error = true;
            self.send(WsMsg::Error {
                stage,
                error: detail,
            })
            .await
        }
    }

    async fn send(&self, msg: WsMsg) -> Result<(), ()> {
        self.ws_tx.send(msg).await.map_err(|_| ())
    }
}

fn stage_names(stages: &[StageId]) -> String {
    stages
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn failure_text(summary: &RunSummary) -> (String, String) {
    let failed: Vec<_> = summary.failures.iter().map(|e| e.stage).collect();
    let mut detail = Vec::new();
    for failure in &summary.failures {
        detail.extend(failure.notes.iter().cloned());
        detail.push(format!("{}: {}", failure.stage, failure.message));
    }
    (format!("{} failed", stage_names(&failed)), detail.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use crate::core::Mode;
    use crate::pipeline::Plan;
    use crate::stage::{ByMode, StageOptions};
    use crate::transform::{StageJob, StageOutput, Transform};
    use crate::utils::glob::Globs;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn traced(trace: &Trace, delay_ms: u64, fail: bool) -> Arc<dyn Transform> {
        let trace = Arc::clone(trace);
        Arc::new(move |job: &StageJob<'_>| -> anyhow::Result<StageOutput> {
            std::thread::sleep(Duration::from_millis(delay_ms));
            trace.lock().push(format!("stage:{}:done", job.stage));
            if fail {
                anyhow::bail!("{} broke", job.stage);
            }
            Ok(StageOutput::default())
        })
    }

    struct Fixture {
        dir: TempDir,
        trace: Trace,
        build_tx: mpsc::Sender<BuildMsg>,
        ws_rx: mpsc::Receiver<WsMsg>,
    }

    fn spawn_actor(lint_fails: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/assets/js")).unwrap();
        fs::write(dir.path().join("src/assets/js/app.js"), "var a = 1;\n").unwrap();

        let mut config = test_parse_config("");
        config.root = dir.path().to_path_buf();
        let trace = Trace::default();

        let mut registry = Registry::new();
        for (id, delay, fail) in [
            (StageId::Html, 0, false),
            (StageId::Sass, 0, false),
            (StageId::Javascript, 20, false),
            (StageId::Lint, 60, lint_fails),
        ] {
            registry.register(
                id,
                Globs::new(["src/none/*"]).unwrap(),
                None,
                traced(&trace, delay, fail),
                ByMode::same(StageOptions::Copy),
            );
        }

        let Plan::Watch(subscriptions) =
            Plan::for_mode(Mode::Development, &registry, &config).unwrap()
        else {
            panic!("expected watch plan");
        };

        let (build_tx, build_rx) = mpsc::channel(4);
        let (ws_tx, ws_rx) = mpsc::channel(4);
        let actor = BuildActor::new(
            build_rx,
            ws_tx,
            Arc::new(registry),
            subscriptions,
            StageContext::new(&config, Mode::Development),
        );
        tokio::spawn(actor.run());

        Fixture {
            dir,
            trace,
            build_tx,
            ws_rx,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_after_every_stage() {
        let mut fx = spawn_actor(false);
        let changed = fx.dir.path().join("src/assets/js/app.js");
        fx.build_tx.send(BuildMsg::Changed(vec![changed])).await.unwrap();

        match fx.ws_rx.recv().await {
            Some(WsMsg::Reload { reason }) => {
                assert_eq!(reason, "javascript, lint");
                fx.trace.lock().push("reload:broadcast".to_string());
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let trace = fx.trace.lock().clone();
        assert_eq!(trace.len(), 3);
        assert!(trace[..2].contains(&"stage:javascript:done".to_string()));
        assert!(trace[..2].contains(&"stage:lint:done".to_string()));
        assert_eq!(trace[2], "reload:broadcast");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_sends_overlay_then_clears() {
        let mut fx = spawn_actor(true);
        let changed = fx.dir.path().join("src/assets/js/app.js");
        fx.build_tx
            .send(BuildMsg::Changed(vec![changed.clone()]))
            .await
            .unwrap();

        match fx.ws_rx.recv().await {
            Some(WsMsg::Error { stage, error }) => {
                assert_eq!(stage, "lint");
                assert!(error.contains("lint broke"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        // javascript still ran to completion
        assert!(
            fx.trace
                .lock()
                .contains(&"stage:javascript:done".to_string())
        );

        let html = fx.dir.path().join("src/views/index.html");
        fx.build_tx.send(BuildMsg::Changed(vec![html])).await.unwrap();
        assert!(matches!(fx.ws_rx.recv().await, Some(WsMsg::ClearError)));
        assert!(matches!(
            fx.ws_rx.recv().await,
            Some(WsMsg::Reload { ref reason }) if reason == "html"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unwatched_change_is_ignored() {
        let mut fx = spawn_actor(false);
        let image = fx.dir.path().join("src/assets/images/logo.png");
        fx.build_tx.send(BuildMsg::Changed(vec![image])).await.unwrap();
        fx.build_tx.send(BuildMsg::Shutdown).await.unwrap();

        assert!(fx.ws_rx.recv().await.is_none());
        assert!(fx.trace.lock().is_empty());
    }
}
