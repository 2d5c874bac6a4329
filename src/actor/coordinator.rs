//! Watch mode coordinator.
//!
//! Creates the channels, starts the WebSocket listener, wires the actors and
//! runs them until the shutdown signal arrives.
//!
//! ```text
//! Idle --run()--> Watching --Ctrl+C--> Stopped
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::{Receiver, TryRecvError};
use tokio::sync::mpsc;

use super::builder::BuildActor;
use super::fs::FsActor;
use super::messages::{BuildMsg, WsMsg};
use super::ws::WsActor;
use crate::config::SiteConfig;
use crate::pipeline::{StageContext, WatchSubscription};
use crate::stage::Registry;
use crate::{debug, log};

const CHANNEL_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Stopped,
}

pub struct Coordinator {
    config: Arc<SiteConfig>,
    registry: Arc<Registry>,
    subscriptions: Vec<WatchSubscription>,
    ctx: StageContext,
    ws_port: Option<u16>,
    shutdown_rx: Option<Receiver<()>>,
    state: WatchState,
}

impl Coordinator {
    pub fn new(
        config: Arc<SiteConfig>,
        registry: Arc<Registry>,
        subscriptions: Vec<WatchSubscription>,
        ctx: StageContext,
    ) -> Self {
        Self {
            config,
            registry,
            subscriptions,
            ctx,
            ws_port: None,
            shutdown_rx: None,
            state: WatchState::Idle,
        }
    }

    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Watch until shutdown. Consumes the coordinator's Idle state.
    pub async fn run(mut self) -> Result<WatchState> {
        let (build_tx, build_rx) = mpsc::channel::<BuildMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        let watch_paths = self.watch_paths();
        let fs_actor = FsActor::new(&watch_paths, build_tx.clone())
            .map_err(|e| anyhow::anyhow!("watcher failed: {}", e))?;
        let build_actor = BuildActor::new(
            build_rx,
            ws_tx.clone(),
            Arc::clone(&self.registry),
            std::mem::take(&mut self.subscriptions),
            self.ctx.clone(),
        );
        let ws_actor = WsActor::new(ws_rx);

        if let Some(port) = self.ws_port {
            let interface = self.config.serve.interface;
            match crate::reload::server::start_ws_server(interface, port, ws_tx.clone()) {
                Ok(actual_port) => {
                    crate::cli::serve::set_actual_ws_port(actual_port);
                    debug!("reload"; "ws://{}:{}", interface, actual_port);
                }
                Err(e) => log!("reload"; "websocket server failed: {}", e),
            }
        }

        self.state = WatchState::Watching;
        log!("watch"; "watching {}", crate::utils::plural_count(watch_paths.len(), "root"));

        let fs_handle = tokio::spawn(fs_actor.run());
        let build_handle = tokio::spawn(build_actor.run());
        let ws_handle = tokio::spawn(ws_actor.run());

        if let Some(rx) = self.shutdown_rx.take() {
            while let Err(TryRecvError::Empty) = rx.try_recv() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            debug!("actor"; "shutdown signal received");
        } else {
            tokio::select! {
                _ = fs_handle => {}
                _ = build_handle => {}
                _ = ws_handle => {}
            }
        }

        let _ = build_tx.send(BuildMsg::Shutdown).await;
        let _ = ws_tx.send(WsMsg::Shutdown).await;
        self.state = WatchState::Stopped;
        debug!("actor"; "stopped");
        Ok(self.state)
    }

    /// Deepest wildcard-free directory of every subscribed glob.
    fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .subscriptions
            .iter()
            .flat_map(|sub| sub.globs.watch_roots(&self.config.root))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
