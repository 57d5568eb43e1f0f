mod archive;
mod camera;
mod cli;
mod config;
mod decode;
mod estimate;
mod helper;
mod journal;
mod model;
mod orchestrator;
mod reconcile;
mod schedule;
mod shot_store;
mod tracker;

use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "shotcam=debug" } else { "shotcam=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = cli::run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
