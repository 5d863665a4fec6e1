//! Errors raised by a remote source

use std::path::PathBuf;
use thiserror::Error;

/// Remote failures are fatal to the operation that hit them
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("stream '{stream}' has no change at or below {change}")]
    UnknownChange { stream: String, change: u32 },

    #[error("no stream has been set up for this client")]
    NoStream,

    #[error("malformed locator '{0}'")]
    BadLocator(String),

    #[error("failed to fetch {locator} into {target}: {source}")]
    FetchFailed {
        locator: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filter '{filter}': {reason}")]
    BadFilter { filter: String, reason: String },
}
