use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::log_file::{LogRotationPolicy, RotatingLogWriter};

/// Install the global tracing subscriber. Stdout carries the protocol, so logs
/// go to stderr or to a rotating file.
pub fn init_tracing(default_level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let writer = RotatingLogWriter::open(path, LogRotationPolicy::from_env())?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(writer))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|error| anyhow!("failed to initialize tracing: {error}"))
}
