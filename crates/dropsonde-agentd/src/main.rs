// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use dropsonde_agent::{
    agent::Agent,
    config::AgentConfig,
    emitter::{Emitter, LoggingEmitter},
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet: fall back to a default one for this error.
            init_logging("info");
            error!("Error reading agent configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_level);

    info!("Agent starting, use CTL-C to quit");

    let emitter: Option<Arc<dyn Emitter>> = if config.debug {
        debug!("Debug enabled, logging every emitted envelope");
        Some(Arc::new(LoggingEmitter::new()))
    } else {
        None
    };

    let agent = Arc::new(Agent::new(config, emitter));
    let stop = CancellationToken::new();

    let mut run = tokio::spawn({
        let agent = Arc::clone(&agent);
        let stop = stop.clone();
        async move { agent.run(stop).await }
    });

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            stop.cancel();
            run.await
        }
    };

    let exit = match outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("failed to run agent: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("agent task failed: {e}");
            ExitCode::FAILURE
        }
    };
    info!("Agent stopped");
    exit
}

fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .event_format(logger::Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
