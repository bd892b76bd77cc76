//! tinyfaas server - binds the HTTP API, opens the metadata store, and
//! initializes the embedded JS engine.

use std::process::ExitCode;

use tinyfaas::config::Config;
use tinyfaas::{engine, http, store};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    if let Err(e) = engine::init() {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }

    let result = run().await;

    // SAFETY: every Isolate worker thread is torn down along with the
    // process at this point; no isolate outlives this call.
    unsafe {
        engine::shutdown();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    let pool = store::connect(&config).await?;
    let router = http::router(pool);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, "tinyfaas listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("tinyfaas=info".parse().unwrap())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
