//! Error types for the node components.
//!
//! Each component reports failures of its own operation to its caller:
//! - [`SensorError`]: transient-local, the poll cycle continues.
//! - [`SessionError`]: transient-remote, the session collaborator reconnects.
//! - [`ConfigError`], [`ShutdownError`], [`ReactorError`]: fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("sensor device not found under {0}")]
    NotFound(PathBuf),

    #[error("sensor not initialized")]
    NotInitialized,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed value {value:?} in {path}")]
    Malformed { path: PathBuf, value: String },

    #[error("burst failed after {taken} of {requested} samples: {reason}")]
    Burst { taken: u8, requested: u8, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("failed to open session to {address}: {reason}")]
    Open { address: String, reason: String },

    #[error("send queue full, {0} dropped")]
    QueueFull(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("failed to query disposition of signal {signal}: {source}")]
    Query {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create wakeup pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("shutdown wakeup already armed")]
    AlreadyArmed,

    #[error("failed to spawn shutdown bridge thread: {0}")]
    Thread(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("failed to spawn reactor thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("failed to register poll task: {0}")]
    Spawn(String),

    #[error("reactor stopped without returning the node context")]
    Lost,
}
