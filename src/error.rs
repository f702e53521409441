use thiserror::Error;

/// Errors the core needs to branch on programmatically. Everything else
/// propagates as `anyhow::Error` with added context, same as the rest of
/// the crate.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("connection {0} not found")]
    UnknownConnection(i64),
}
