use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod remote;
mod search;
mod semantic;
#[cfg(test)]
mod tests;
mod types;
mod vault;
mod web;

use app::AppFactory;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let app = AppFactory::create_app()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match args.command {
            cli::Command::Daemon { addr } => cli::handle_daemon(addr, app).await,
            cli::Command::Search {
                query,
                from,
                limit,
                mode,
            } => cli::handle_search(query, from, limit, mode, app).await,
        }
    })
}
