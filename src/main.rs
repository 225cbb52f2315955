use std::env;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use clinpipe::{
    app::{ComponentRegistry, build_router},
    config::Config,
};

/// Probe the local HTTP server; used as the container healthcheck command.
fn run_healthcheck() -> i32 {
    let port = env::var("API_PORT").unwrap_or_else(|_| "8000".to_string());
    let url = format!("http://127.0.0.1:{port}/health/live");

    let response = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())
        .and_then(|client| client.get(&url).send().map_err(|e| e.to_string()));

    match response {
        Ok(resp) if resp.status().is_success() => 0,
        Ok(resp) => {
            eprintln!("healthcheck failed: status {}", resp.status());
            1
        }
        Err(message) => {
            eprintln!("healthcheck failed: {message}");
            1
        }
    }
}

fn install_panic_logger() {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();

        error!(
            thread = thread.name().unwrap_or("unnamed"),
            %location,
            message,
            "panic occurred"
        );
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if env::args().nth(1).as_deref() == Some("healthcheck") {
        std::process::exit(run_healthcheck());
    }

    install_panic_logger();

    // Tracing initialization happens inside Telemetry::new() during the
    // registry build.
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    if config.ml_models().is_empty() {
        warn!("no model roster configured; ML inference stage is excluded");
    }
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    let router = build_router(registry);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, router).await {
        warn!(error = %error, "server exited with error");
    }

    Ok(())
}
