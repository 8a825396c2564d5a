// src/main.rs
use anyhow::Result;
use clap::Parser;
use tree_lights::cli::Cli;
use tree_lights::run;

#[tokio::main]
async fn main() -> Result<()> {
    let log_env = env_logger::Env::default().filter_or("RUST_LOG", "tree_lights=info");
    env_logger::init_from_env(log_env);

    let config = Cli::parse().into_config();
    run(config).await
}
