// src/error.rs
use std::io;
use thiserror::Error;

/// Errors raised by the certificate engine.
#[derive(Debug, Error)]
pub enum PkiError {
    /// Malformed PEM or non-RSA key in a store slot
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Unusable cluster identity or annotation
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Signing attempted with a bundle that is not a CA
    #[error("refusing to sign with non-CA certificate {issuer}")]
    SigningPrecondition { issuer: String },

    /// Crypto failure while issuing a named leaf
    #[error("failed to issue {certificate} under {authority}: {source}")]
    Issue {
        certificate: String,
        authority: String,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PkiError {
    pub(crate) fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        PkiError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PkiError>;
