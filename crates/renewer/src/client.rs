//! Issuance client interface.
//!
//! The protocol client that actually talks to the certificate authority is
//! an external collaborator: the renewal core only depends on this trait,
//! and tests substitute fakes for it. The concrete ACME-backed
//! implementation lives in [`crate::acme`].

use std::path::Path;

use thiserror::Error;

/// The material returned by a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// PEM-encoded leaf certificate
    pub cert_pem: String,
    /// PEM-encoded intermediate chain
    pub chain_pem: String,
    /// PEM-encoded leaf plus chain
    pub fullchain_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
    /// PEM-encoded certificate signing request
    pub csr_pem: String,
}

/// Issuance failures. Scoped to one lineage; a failed issuance triggers
/// no successor save.
#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("ACME account error: {0}")]
    Account(String),

    #[error("order failed: {0}")]
    Order(String),

    #[error("domain validation failed: {0}")]
    Validation(String),

    #[error("unusable key material: {0}")]
    KeyMaterial(String),

    #[error("timed out waiting for the certificate authority")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External issuance client.
///
/// `existing_key_path`, when given, points at the lineage's current
/// private key; the client must reuse that key material instead of
/// generating a new one.
pub trait IssuanceClient {
    fn obtain_certificate(
        &self,
        domains: &[String],
        existing_key_path: Option<&Path>,
    ) -> Result<IssuedCertificate, IssuanceError>;
}
