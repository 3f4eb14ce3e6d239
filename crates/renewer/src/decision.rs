//! Renewal decision: is a lineage due for renewal?

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use warden_config::EffectiveConfig;

use crate::storage::Lineage;

/// Failure to read or parse the certificate whose expiry drives the
/// decision. Surfaced as an error, never treated as "due".
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("failed to read certificate {path:?}: {source}")]
    Read { path: std::path::PathBuf, source: io::Error },

    #[error("failed to parse certificate {path:?}: {reason}")]
    Parse { path: std::path::PathBuf, reason: String },
}

/// Read the end of validity from a PEM certificate.
pub fn cert_not_after(cert_path: &Path) -> Result<DateTime<Utc>, DecisionError> {
    let bytes = fs::read(cert_path).map_err(|source| DecisionError::Read {
        path: cert_path.to_path_buf(),
        source,
    })?;

    let pem = pem::parse(&bytes).map_err(|e| DecisionError::Parse {
        path: cert_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let (_, cert) =
        x509_parser::parse_x509_certificate(pem.contents()).map_err(|e| DecisionError::Parse {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let not_after = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(not_after, 0).ok_or_else(|| DecisionError::Parse {
        path: cert_path.to_path_buf(),
        reason: "notAfter is out of range".to_string(),
    })
}

/// Decide whether a lineage should be renewed now.
///
/// Forcing flags are checked before any expiry math: a dry run always
/// simulates an upcoming renewal, and `renew_by_default` renews
/// unconditionally. Otherwise the lineage is due when now is within
/// `renew_before_days` of the certificate's expiry.
///
/// Pure predicate over the supplied state; the only side effect is the
/// decision rationale written to the log.
pub fn should_renew(config: &EffectiveConfig, lineage: &Lineage) -> Result<bool, DecisionError> {
    if config.dry_run {
        info!(lineage = %lineage.name, "simulating renewal (dry run)");
        return Ok(true);
    }
    if config.renew_by_default {
        info!(lineage = %lineage.name, "Auto-renewal forced");
        return Ok(true);
    }

    let expiry = cert_not_after(&lineage.cert_path)?;
    let threshold = expiry - Duration::days(i64::from(config.renew_before_days));

    if Utc::now() >= threshold {
        info!(
            lineage = %lineage.name,
            expiry = %expiry,
            "certificate is due for renewal"
        );
        Ok(true)
    } else {
        debug!(
            lineage = %lineage.name,
            expiry = %expiry,
            renew_before_days = config.renew_before_days,
            "certificate not yet due for renewal"
        );
        Ok(false)
    }
}
