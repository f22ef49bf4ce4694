//! Error types for wrmon.
//!
//! One error enum covers the whole engine, with variants matching the
//! failure categories of the protocol: transport, authentication, protocol
//! correlation, and schema/type errors. Schema errors fail a single
//! extraction; everything else is fatal for the operation that raised it.

use thiserror::Error;

/// Result type alias for wrmon operations.
pub type Result<T> = std::result::Result<T, WrError>;

/// Errors raised by the WS-Management engine.
#[derive(Error, Debug)]
pub enum WrError {
    /// HTTP failure, non-200 status, or malformed multipart framing.
    #[error("transport error: {0}")]
    Transport(String),

    /// Security negotiation failure, missing challenge, or a signature
    /// that does not verify. Aborts the session.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// MessageID/RelatesTo mismatch, missing EnumerationContext, or a
    /// response that is not the expected WS-Management document.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown CIM type, property not in schema, property type unsuitable
    /// for the requested extraction, or a nil-flagged property.
    #[error("schema error: {0}")]
    Schema(String),

    /// Response bytes could not be parsed as XML.
    #[error("xml error: {0}")]
    Xml(String),

    /// Configuration is invalid or incomplete.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying HTTP client error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<xmltree::ParseError> for WrError {
    fn from(e: xmltree::ParseError) -> Self {
        WrError::Xml(e.to_string())
    }
}
