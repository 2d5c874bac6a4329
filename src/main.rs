//! sapl - a front-end asset pipeline with watch mode and live reload.

mod actor;
mod cli;
mod config;
mod core;
mod embed;
mod logger;
mod pipeline;
mod reload;
mod stage;
mod transform;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};

use actor::Coordinator;
use cli::Cli;
use config::SiteConfig;
use pipeline::{Plan, StageContext};
use stage::Registry;

fn main() -> Result<()> {
    // before anything blocks
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    logger::set_verbose(cli.verbose);

    let config = SiteConfig::load(&cli)?;
    let mode = core::resolve_mode();
    debug!("mode"; "{mode}");

    let registry = Registry::standard(&config)?;
    let ctx = StageContext::new(&config, mode);

    match Plan::for_mode(mode, &registry, &config)? {
        Plan::Build(graph) => cli::build::build_assets(&graph, &registry, &ctx).map(drop),
        Plan::Watch(subscriptions) => {
            let bound = cli::serve::bind_server(&config)?;
            let config = Arc::new(config);
            let coordinator = Coordinator::new(
                Arc::clone(&config),
                Arc::new(registry),
                subscriptions,
                ctx,
            )
            .with_ws_port(config.serve.ws_port);
            bound.run(&config, coordinator)
        }
    }
}
