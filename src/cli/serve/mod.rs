//! Development server with live reload.
//!
//! Serves the output directory (plus the configured extra routes) on a
//! request thread pool while the watch actors rebuild in the background.

mod content;
mod lifecycle;
mod path;
mod response;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use anyhow::Result;
use crossbeam::channel;
use tiny_http::{Request, Server};

use self::path::Route;
use crate::actor::Coordinator;
use crate::config::SiteConfig;
use crate::core::register_server;
use crate::embed::serve::HOTRELOAD_URL;
use crate::{debug, log};

/// WebSocket port actually bound (the configured one may be taken).
static ACTUAL_WS_PORT: AtomicU16 = AtomicU16::new(0);

/// Called by the coordinator once the WebSocket listener is bound.
pub fn set_actual_ws_port(port: u16) {
    ACTUAL_WS_PORT.store(port, Ordering::Relaxed);
}

fn actual_ws_port() -> Option<u16> {
    match ACTUAL_WS_PORT.load(Ordering::Relaxed) {
        0 => None,
        port => Some(port),
    }
}

/// What the request handlers need from the configuration.
#[derive(Debug, Clone)]
struct ServeRoot {
    output: PathBuf,
    routes: Vec<Route>,
}

impl ServeRoot {
    fn new(config: &SiteConfig) -> Self {
        Self {
            output: config.output_dir(),
            routes: config
                .serve
                .routes
                .iter()
                .map(|(prefix, dir)| Route {
                    prefix: prefix.clone(),
                    dir: config.root_join(dir),
                })
                .collect(),
        }
    }
}

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server and register it with the Ctrl+C handler.
pub fn bind_server(config: &SiteConfig) -> Result<BoundServer> {
    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    register_server(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}", addr);
    for (prefix, dir) in &config.serve.routes {
        debug!("serve"; "{} -> {}", prefix, dir.display());
    }

    Ok(BoundServer {
        server,
        shutdown_rx,
    })
}

impl BoundServer {
    /// Start the watch actors and serve until Ctrl+C (blocking).
    pub fn run(self, config: &SiteConfig, coordinator: Coordinator) -> Result<()> {
        let actors = lifecycle::spawn_actors(coordinator, self.shutdown_rx);
        run_request_loop(&self.server, Arc::new(ServeRoot::new(config)))?;
        lifecycle::wait_for_shutdown(actors);
        Ok(())
    }
}

fn run_request_loop(server: &Server, root: Arc<ServeRoot>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create request pool: {e}"))?;

    for request in server.incoming_requests() {
        let root = Arc::clone(&root);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &root) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

fn handle_request(request: Request, root: &ServeRoot) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    let ws_port = actual_ws_port();
    if let Some(port) = ws_port
        && request.url() == HOTRELOAD_URL
    {
        return response::respond_hotreload_js(request, port);
    }
    let live_reload = ws_port.is_some();

    let (dir, rest) = path::select_root(request.url(), &root.routes, &root.output);
    if let Some(file) = path::resolve_path(rest, dir) {
        return response::respond_file(request, &file, live_reload);
    }

    response::respond_not_found(request, &root.output, live_reload)
}
