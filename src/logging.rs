//! Tracing setup shared by the server and the worker.
//!
//! Each process names itself when it installs the subscriber. Events go to stdout and to
//! `logs/<component>.log`, so a server and a worker running from the same directory keep
//! separate files. `DOCPOLL_LOG_FILE` replaces the file path for whichever process reads it.
use std::{path::Path, sync::OnceLock};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directory used for log files when `DOCPOLL_LOG_FILE` is unset.
pub const LOG_DIR: &str = "logs";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Filter applied when `RUST_LOG` is unset: our own crates at `info`, dependencies at `warn`.
fn default_filter() -> EnvFilter {
    EnvFilter::new("warn,docpoll=info,docpoll_worker=info")
}

/// Install the global subscriber for the process named `component`.
pub fn init_tracing(component: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match file_writer(component) {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false),
            )
            .init(),
        None => registry.init(),
    }
    tracing::info!(component, "Logging initialised");
}

fn file_writer(component: &str) -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("DOCPOLL_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .inspect_err(|err| eprintln!("Cannot open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            std::fs::create_dir_all(LOG_DIR)
                .inspect_err(|err| eprintln!("Cannot create {LOG_DIR}: {err}"))
                .ok()?;
            let appender = tracing_appender::rolling::never(LOG_DIR, log_file_name(component));
            tracing_appender::non_blocking(appender)
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

fn log_file_name(component: &str) -> String {
    let stem = Path::new(component)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("docpoll");
    format!("{stem}.log")
}
