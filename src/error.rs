//! Infrastructure failures.
//!
//! Protocol errors ([`ProtocolError`](crate::protocol::ProtocolError)) are
//! part of a normal response. Everything in this module prevents a response
//! from being produced at all, and is reported at the transport level
//! instead of inside an OAI-PMH envelope.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponderError {
    /// The catalog could not answer.
    #[error("catalog unavailable: {0:#}")]
    Catalog(anyhow::Error),

    /// The request exceeded `harvest.request_timeout_secs`.
    #[error("request timed out")]
    Timeout,

    /// No institution is configured for the request's host.
    #[error("no institution configured for host {0}")]
    UnknownInstitution(String),

    /// Serializing the response document failed.
    #[error("failed to render response: {0:#}")]
    Render(anyhow::Error),
}

impl ResponderError {
    /// HTTP status used when the error reaches the transport.
    pub fn status(&self) -> StatusCode {
        match self {
            ResponderError::Catalog(_) => StatusCode::SERVICE_UNAVAILABLE,
            ResponderError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ResponderError::UnknownInstitution(_) => StatusCode::NOT_FOUND,
            ResponderError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
