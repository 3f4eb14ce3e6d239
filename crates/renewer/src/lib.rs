//! Warden renewal core.
//!
//! Manages the renewal lifecycle of a fleet of locally tracked TLS
//! certificate lineages:
//!
//! - **Storage**: per-lineage renewal configs, versioned append-only
//!   archives, atomically retargeted live links
//! - **Decision**: expiry-window renewal checks with dry-run and forced
//!   overrides
//! - **Reconstitution**: persisted renewal parameters restored into a
//!   runnable per-lineage configuration
//! - **Hooks**: validated pre/deploy/post commands with batch-scoped
//!   deduplication
//! - **Orchestration**: sequential batch processing with per-lineage
//!   failure isolation and a jittered start for scheduled fleets
//!
//! The issuance client, storage backend, and plugin selector are trait
//! seams; [`acme::AcmeIssuanceClient`] is the ACME-backed implementation
//! used by the `warden` binary.

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod batch;
pub mod client;
pub mod decision;
pub mod errors;
pub mod hooks;
pub mod plugins;
pub mod reconstitute;
pub mod report;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Batch orchestration
pub use batch::Renewer;

// Issuance client seam
pub use client::{IssuanceClient, IssuanceError, IssuedCertificate};

// ACME-backed issuance
pub use acme::AcmeIssuanceClient;

// Lineage storage
pub use storage::{FsLineageStore, Lineage, LineageStore, StorageError};

// Renewal decision
pub use decision::{cert_not_after, should_renew};

// Reconstitution
pub use reconstitute::reconstitute;

// Hooks
pub use hooks::{validate_hook, HookKind, HookRunner};

// Plugin selection
pub use plugins::{PluginSelector, SelectedPlugins, StaticPluginRegistry};

// Reporting
pub use report::{BatchReport, RenewalOutcome};

// Errors
pub use errors::{BatchError, RenewError};
