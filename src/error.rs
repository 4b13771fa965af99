//! Error types for the report collector.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Rule sync error: {0}")]
    RuleSync(#[from] RuleSyncError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Faults on the upstream stream connection. Always recoverable by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to connect to stream: {0}")]
    Connect(String),

    #[error("Stream rejected connection with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream ended by remote")]
    Ended,

    #[error("No data or keep-alive received for {0:?}")]
    IdleTimeout(Duration),
}

/// Failure replacing the upstream rule set. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RuleSyncError {
    #[error("Rules request failed: {0}")]
    Request(String),

    #[error("Rules endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid rules response: {0}")]
    InvalidResponse(String),
}

/// Failure posting an outbound reply.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Reply request failed: {0}")]
    Request(String),

    #[error("Reply rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Message {0} has no numeric id to reply to")]
    MissingReplyId(String),
}

/// Errors raised while handling a single stream message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Not an activity envelope: {0}")]
    NotActivity(String),

    #[error("Malformed activity: {0}")]
    MalformedActivity(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Reply failed: {0}")]
    Send(#[from] SendError),

    #[error("Message handler panicked: {0}")]
    HandlerPanicked(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
