//! Lineage reconstitution: persisted parameters back into a runnable
//! configuration.

use std::path::Path;

use tracing::debug;

use warden_config::{restore_required_config_elements, EffectiveConfig, RestoreError};

use crate::errors::RenewError;
use crate::plugins::PluginSelector;
use crate::storage::Lineage;

/// Rebuild the runnable configuration for one lineage.
///
/// Loads the lineage, restores its persisted `[renewalparams]` into the
/// live configuration (CLI-set values win), and resolves the
/// authenticator/installer plugins by name. Every failure — malformed
/// conf, missing or invalid parameters, unselectable plugin, rejected
/// domain — is scoped to this lineage; the batch catches it and moves on.
pub fn reconstitute(
    config: &mut EffectiveConfig,
    conf_path: &Path,
    plugins: &dyn PluginSelector,
) -> Result<Lineage, RenewError> {
    let lineage = Lineage::load(conf_path)?;

    let params = lineage
        .renewal_params
        .as_ref()
        .ok_or_else(|| RenewError::NoRenewalParams(conf_path.to_path_buf()))?;

    restore_required_config_elements(config, params)?;

    // Guaranteed by a successful restore
    let authenticator = config
        .authenticator
        .clone()
        .ok_or(RenewError::Restore(RestoreError::NoAuthenticator))?;

    plugins.select(&authenticator, config.installer.as_deref(), &lineage.domains)?;

    debug!(
        lineage = %lineage.name,
        authenticator = %authenticator,
        "Reconstituted lineage configuration"
    );
    Ok(lineage)
}
