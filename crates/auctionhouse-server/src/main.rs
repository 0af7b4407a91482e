use std::process::ExitCode;

use auctionhouse_eyre::eyre::WrapErr as _;
use auctionhouse_server::{
    commands,
    config,
    telemetry,
    Config,
    BUILD_INFO,
};
use tokio::signal::unix::{
    signal,
    SignalKind,
};
use tracing::{
    error,
    info,
    warn,
};

#[tokio::main]
async fn main() -> ExitCode {
    auctionhouse_eyre::install().expect("auctionhouse eyre hook must be the first hook installed");

    eprintln!("{}", serde_json::to_string(&BUILD_INFO).expect("build info always serializes"));

    let cfg: Config = match config::get() {
        Ok(cfg) => cfg,
        Err(error) => {
            eprintln!("failed to read configuration:\n{error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = telemetry::init(&cfg) {
        eprintln!("failed to initialize telemetry:\n{error:?}");
        return ExitCode::FAILURE;
    }
    info!(
        config = serde_json::to_string(&cfg).expect("config always serializes"),
        "starting auctionhouse-server"
    );

    let service = match auctionhouse_server::build(&cfg).await {
        Ok(service) => service,
        Err(error) => {
            error!(%error, "failed to initialize service");
            return ExitCode::FAILURE;
        }
    };

    let router = commands::router(service.state);
    let listener = match tokio::net::TcpListener::bind(&cfg.api_listen_addr)
        .await
        .wrap_err("failed to bind api listener")
    {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, "failed to bind api listener");
            service.cancel.cancel();
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %cfg.api_listen_addr, "listening for commands and subscriptions");

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting a SIGTERM listener should always work on Unix");

    let shutdown_cancel = service.cancel.clone();
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM; shutting down"),
            _ = tokio::signal::ctrl_c() => info!("received ctrl-c; shutting down"),
        }
        shutdown_cancel.cancel();
    });

    if let Err(error) = serve.await {
        error!(%error, "http server exited unexpectedly");
        service.cancel.cancel();
        let _ = service.scheduler_handle.await;
        return ExitCode::FAILURE;
    }

    match service.scheduler_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "scheduler task exited with an error"),
        Err(error) => warn!(%error, "scheduler task panicked"),
    }

    info!("auctionhouse-server stopped");
    ExitCode::SUCCESS
}
