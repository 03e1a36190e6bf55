use anyhow::Context;
use clap::Parser;

use weather_db::config::BuildConfig;
use weather_db::{build, cli, nearest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Build(cmd) => build::run(cmd).await.context("build failed"),
        cli::Command::Nearest(cmd) => nearest::run(cmd).await.context("nearest failed"),
        cli::Command::Config(cmd) => {
            let config = if cmd.include_legacy {
                BuildConfig::with_legacy()
            } else {
                BuildConfig::defaults()
            };
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}
