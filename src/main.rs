mod capture;
mod cli;
mod config;
mod error;
mod ipc;
mod landmarks;
mod library;
mod logging;
mod practice;
mod quality;
mod recognize;
mod store;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
