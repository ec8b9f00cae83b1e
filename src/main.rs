mod app;
mod catalog;
mod cli;
mod config;
mod db;
mod http;
mod model;
mod paths;
mod playback;
mod resolver;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "CINETRACK_LOG";

fn main() -> Result<()> {
    init_tracing();
    let cli = cli::Cli::parse();
    app::run(cli)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
