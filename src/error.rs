//! Service error type with stable wire codes.
//!
//! Validation errors carry the specific `ERR_*` code back to the caller;
//! anything internal is surfaced as an opaque `internal_error` with the
//! original logged at the boundary.

use thiserror::Error;

/// Result alias used throughout the service layer.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input. `key` is the wire error class (`invalid_request` or
    /// `invalid_field`), `code` the stable machine code.
    #[error("{message}")]
    Validation {
        key: &'static str,
        code: &'static str,
        message: String,
    },

    /// Token mismatch on the HTTP surface.
    #[error("unauthorized")]
    Unauthorized,

    /// Storage or provider failure. Never shown verbatim to callers.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            key: "invalid_request",
            code,
            message: message.into(),
        }
    }

    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self::Validation {
            key: "invalid_field",
            code: "ERR_INVALID_FIELD",
            message: message.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized => 401,
            Self::Internal(_) => 500,
        }
    }

    /// Wire error class (the `error` field of the JSON envelope).
    pub fn key(&self) -> &'static str {
        match self {
            Self::Validation { key, .. } => key,
            Self::Unauthorized => "unauthorized",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Stable machine code (the `code` field of the JSON envelope).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Unauthorized => "ERR_UNAUTHORIZED",
            Self::Internal(_) => "ERR_INTERNAL",
        }
    }

    /// Message safe to show the caller. Internal details are masked.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Unauthorized => "unauthorized request".into(),
            Self::Internal(_) => "internal server error".into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("database error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_code() {
        let err = Error::invalid("ERR_INVALID_QUERY", "query too short");
        assert_eq!(err.status(), 400);
        assert_eq!(err.key(), "invalid_request");
        assert_eq!(err.code(), "ERR_INVALID_QUERY");
        assert_eq!(err.public_message(), "query too short");
    }

    #[test]
    fn internal_error_is_opaque() {
        let err = Error::Internal(anyhow::anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(err.status(), 500);
        assert_eq!(err.key(), "internal_error");
        assert!(!err.public_message().contains("10.0.0.3"));
    }

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(Error::Unauthorized.status(), 401);
        assert_eq!(Error::Unauthorized.code(), "ERR_UNAUTHORIZED");
    }
}
