//! Restoration error types.

use thiserror::Error;

/// Errors raised while restoring persisted renewal parameters.
///
/// All variants are scoped to a single lineage: the batch orchestrator
/// converts them into a per-lineage failure and moves on.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("no authenticator was specified")]
    NoAuthenticator,

    #[error("expected True or False for {field}, found {value:?}")]
    InvalidBool { field: &'static str, value: String },

    #[error("expected an integer for {field}, found {value:?}")]
    InvalidInt { field: &'static str, value: String },

    #[error("unrecognized challenge type: {0:?}")]
    UnknownChallenge(String),

    #[error("malformed webroot configuration: {0}")]
    InvalidWebroot(String),

    #[error("unexpected value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}
