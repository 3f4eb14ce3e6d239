//! Error taxonomy for the renewal core.
//!
//! Two tiers: [`RenewError`] is the per-lineage union caught at the batch
//! orchestrator boundary and converted into a failed outcome for that
//! lineage; [`BatchError`] covers conditions that make the whole batch
//! meaningless and abort it before any lineage is attempted.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use warden_config::RestoreError;

use crate::client::IssuanceError;
use crate::decision::DecisionError;
use crate::hooks::HookError;
use crate::plugins::PluginError;
use crate::storage::StorageError;

/// Per-lineage failure. Never escapes the batch orchestrator.
#[derive(Error, Debug)]
pub enum RenewError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("renewal config file {0:?} is missing a renewalparams section")]
    NoRenewalParams(PathBuf),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Issuance(#[from] IssuanceError),
}

/// Batch-level failure raised before any lineage is processed.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("renewal configuration directory {path:?} could not be read: {source}")]
    ConfigDir { path: PathBuf, source: io::Error },

    #[error("no renewable certificate lineage named {0:?} was found")]
    NoSuchLineage(String),

    #[error(transparent)]
    Hook(#[from] HookError),
}
