//! Configuration handling for the Warden renewal core.
//!
//! This crate owns the two halves of renewal configuration:
//!
//! - [`EffectiveConfig`] — the live configuration for one process
//!   invocation, built from CLI input. Values the user supplied on the
//!   command line are tracked in an explicit provenance set so that
//!   persisted values never overwrite them.
//! - [`restore_required_config_elements`] — merges a lineage's persisted
//!   renewal parameters into the live configuration, coercing the
//!   string-typed persisted form back into typed values and rejecting
//!   anything malformed instead of defaulting it.
//!
//! Persisted renewal parameters live in each lineage's conf file as a flat
//! `[renewalparams]` table. Booleans are stored as exactly `"True"` or
//! `"False"`, integers as decimal strings, and an explicitly absent HTTP-01
//! port as the literal `"None"`, so a conf written by one run restores
//! byte-for-byte on the next.

mod challenge;
mod effective;
mod error;
mod params;
mod restore;

pub use challenge::ChallengeType;
pub use effective::EffectiveConfig;
pub use error::RestoreError;
pub use params::{RenewalParameters, WebrootSource};
pub use restore::restore_required_config_elements;
