//! Server binary entry point: parses configuration, sets up tracing, and
//! drives the runtime to completion.

mod codec;
mod config;
mod runtime;

use config::Config;
use runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.tracing_filter())))
        .with_writer(std::io::stderr)
        .init();

    let runtime = Runtime::build(config).await;
    if let Err(err) = runtime.run().await {
        tracing::error!(error = %err, "server exited with an error");
        std::process::exit(1);
    }
}
