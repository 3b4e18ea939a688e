//! CLI entry point: parse options, set up logging, and hand off to the
//! library's `run`.
use anyhow::Result;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use udp2http::config::Opt;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opt = Opt::from_args();
    udp2http::run(opt).await
}
