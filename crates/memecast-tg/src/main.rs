use futures::prelude::*;
use memecast_tg::tracing_err;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    let logging_task = memecast_tg::init_logging();

    // Logged only now, because the logging wasn't initialized before
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded the .env file"),
        Err(err) => info!(err = tracing_err(&err), "No .env file, using the process env only"),
    }

    memecast_tg::init_metrics();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_commit = env!("VERGEN_GIT_SHA"),
        "Starting memecast"
    );

    let run = AssertUnwindSafe(run())
        .catch_unwind()
        .unwrap_or_else(|_| {
            error!("The bot panicked, exiting...");
            ExitCode::FAILURE
        });

    let exit_code = if cfg!(debug_assertions) {
        // Teloxide's graceful shutdown takes a while, so ctrl-c
        // doesn't wait for it during development:
        // https://github.com/teloxide/teloxide/issues/711
        tokio::select! {
            exit_code = run => exit_code,
            () = abort_signal() => ExitCode::SUCCESS,
        }
    } else {
        run.await
    };

    logging_task.shutdown().await;

    exit_code
}

async fn run() -> ExitCode {
    let config = memecast_tg::Config::load_or_panic();
    config.log_summary();

    match memecast_tg::run(config).await {
        Ok(()) => {
            info!("The bot has stopped, exiting...");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(err = tracing_err(&err), "The bot failed, exiting...");
            ExitCode::FAILURE
        }
    }
}

async fn abort_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, exiting without waiting for the shutdown..."),
        Err(err) => warn!(err = tracing_err(&err), "Failed to listen for Ctrl+C, exiting..."),
    }
}
