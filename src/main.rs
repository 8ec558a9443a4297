//! Entry point for the Iris prediction server.

use irisml::config::ServeConfig;
use irisml::{logging, server};

#[tokio::main]
async fn main() {
    logging::init_or_stdout("serve");
    if let Err(err) = run().await {
        tracing::error!("server failed: {err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), server::ServeError> {
    let config = ServeConfig::from_env()?;
    server::serve(config).await
}
