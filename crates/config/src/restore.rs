//! Restoration of persisted renewal parameters into the live configuration.

use tracing::debug;

use crate::effective::EffectiveConfig;
use crate::error::RestoreError;
use crate::params::{RenewalParameters, WebrootSource};

/// Merge a lineage's persisted `[renewalparams]` into the live
/// configuration.
///
/// Every assignment honors "CLI-set wins": a field the user supplied on
/// the command line for this invocation is never overwritten by a
/// persisted value. Validation happens before any assignment, so a
/// malformed field leaves the configuration untouched; the caller treats
/// any error as aborting this one lineage.
///
/// An authenticator must be present after the merge — from the persisted
/// parameters or from the command line — otherwise restoration fails.
pub fn restore_required_config_elements(
    config: &mut EffectiveConfig,
    renewalparams: &toml::Table,
) -> Result<(), RestoreError> {
    let params = RenewalParameters::from_table(renewalparams)?;

    if let Some(challs) = params.pref_challs {
        if !config.set_by_cli("pref_challs") {
            config.pref_challs = challs;
        }
    }
    if let Some(must_staple) = params.must_staple {
        if !config.set_by_cli("must_staple") {
            config.must_staple = must_staple;
        }
    }
    if let Some(allow_subset) = params.allow_subset_of_names {
        if !config.set_by_cli("allow_subset_of_names") {
            config.allow_subset_of_names = allow_subset;
        }
    }
    if let Some(reuse_key) = params.reuse_key {
        if !config.set_by_cli("reuse_key") {
            config.reuse_key = reuse_key;
        }
    }
    if let Some(key_size) = params.rsa_key_size {
        if !config.set_by_cli("rsa_key_size") {
            config.rsa_key_size = key_size;
        }
    }
    if let Some(port) = params.http01_port {
        if !config.set_by_cli("http01_port") {
            config.http01_port = port;
        }
    }

    restore_webroot(config, params.webroot);

    if let Some(installer) = params.installer {
        if !config.set_by_cli("installer") && config.installer.is_none() {
            config.installer = Some(installer);
        }
    }
    if let Some(authenticator) = params.authenticator {
        if !config.set_by_cli("authenticator") && config.authenticator.is_none() {
            config.authenticator = Some(authenticator);
        }
    }
    if config.authenticator.is_none() {
        return Err(RestoreError::NoAuthenticator);
    }

    // Plugin-namespaced keys are restored opaquely; plugins interpret them
    config.plugin_extras.extend(params.extra);

    Ok(())
}

fn restore_webroot(config: &mut EffectiveConfig, webroot: Option<WebrootSource>) {
    match webroot {
        Some(WebrootSource::Map(map)) => {
            if !config.set_by_cli("webroot_map") {
                config.webroot_map = map;
            }
        }
        Some(WebrootSource::Paths(paths)) => {
            debug!("conf file has a webroot path instead of a webroot map, restoring the path");
            if !config.set_by_cli("webroot_path") {
                config.webroot_path = paths;
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeType;

    fn table(conf: &str) -> toml::Table {
        conf.parse().unwrap()
    }

    fn config_with_authenticator() -> EffectiveConfig {
        let mut config = EffectiveConfig::new();
        config.authenticator = Some("standalone".to_string());
        config.mark_set_by_cli("authenticator");
        config
    }

    #[test]
    fn test_allow_subset_of_names_success() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(&mut config, &table("allow_subset_of_names = \"True\""))
            .unwrap();
        assert!(config.allow_subset_of_names);
    }

    #[test]
    fn test_allow_subset_of_names_failure() {
        let mut config = config_with_authenticator();
        let err = restore_required_config_elements(
            &mut config,
            &table("allow_subset_of_names = \"maybe\""),
        )
        .unwrap_err();
        assert!(matches!(err, RestoreError::InvalidBool { .. }));
    }

    #[test]
    fn test_must_staple_success() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(&mut config, &table("must_staple = \"True\"")).unwrap();
        assert!(config.must_staple);
    }

    #[test]
    fn test_must_staple_failure_leaves_config_untouched() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(&mut config, &table("must_staple = \"maybe\""))
            .unwrap_err();
        assert!(!config.must_staple);
    }

    #[test]
    fn test_missing_authenticator_is_an_error() {
        let mut config = EffectiveConfig::new();
        let err = restore_required_config_elements(&mut config, &toml::Table::new()).unwrap_err();
        assert!(matches!(err, RestoreError::NoAuthenticator));
        assert_eq!(err.to_string(), "no authenticator was specified");
    }

    #[test]
    fn test_persisted_authenticator_restored() {
        let mut config = EffectiveConfig::new();
        restore_required_config_elements(&mut config, &table("authenticator = \"webroot\""))
            .unwrap();
        assert_eq!(config.authenticator.as_deref(), Some("webroot"));
    }

    #[test]
    fn test_cli_authenticator_wins() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(&mut config, &table("authenticator = \"webroot\""))
            .unwrap();
        assert_eq!(config.authenticator.as_deref(), Some("standalone"));
    }

    #[test]
    fn test_cli_set_field_never_overwritten() {
        let mut config = config_with_authenticator();
        config.rsa_key_size = 4096;
        config.mark_set_by_cli("rsa_key_size");

        restore_required_config_elements(&mut config, &table("rsa_key_size = \"2048\"")).unwrap();
        assert_eq!(config.rsa_key_size, 4096);
    }

    #[test]
    fn test_pref_challs_string_restores_as_list() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(&mut config, &table("pref_challs = \"dns\"")).unwrap();
        assert_eq!(config.pref_challs, vec![ChallengeType::Dns01]);
    }

    #[test]
    fn test_http01_port_none_restores_absent() {
        let mut config = config_with_authenticator();
        config.http01_port = Some(80);
        restore_required_config_elements(&mut config, &table("http01_port = \"None\"")).unwrap();
        assert_eq!(config.http01_port, None);
    }

    #[test]
    fn test_webroot_map_restored() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(
            &mut config,
            &table("webroot_map = { \"example.com\" = \"/var/www\" }"),
        )
        .unwrap();
        assert_eq!(config.webroot_map["example.com"], "/var/www");
    }

    #[test]
    fn test_ancient_webroot_path_restored_as_list() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(
            &mut config,
            &table("authenticator = \"webroot\"\nwebroot_path = \"/var/www/\""),
        )
        .unwrap();
        assert_eq!(config.webroot_path, vec!["/var/www/".to_string()]);
    }

    #[test]
    fn test_cli_webroot_map_wins() {
        let mut config = config_with_authenticator();
        config
            .webroot_map
            .insert("example.com".to_string(), "/from-cli".to_string());
        config.mark_set_by_cli("webroot_map");

        restore_required_config_elements(
            &mut config,
            &table("webroot_map = { \"example.com\" = \"/persisted\" }"),
        )
        .unwrap();
        assert_eq!(config.webroot_map["example.com"], "/from-cli");
    }

    #[test]
    fn test_plugin_extras_merge() {
        let mut config = config_with_authenticator();
        restore_required_config_elements(
            &mut config,
            &table("webroot_imaginary_flag = \"42\""),
        )
        .unwrap();
        assert_eq!(config.plugin_extras["webroot_imaginary_flag"], "42");
    }

    #[test]
    fn test_round_trip_through_renewal_params() {
        let mut config = config_with_authenticator();
        config.must_staple = true;
        config.rsa_key_size = 4096;
        config.pref_challs = vec![ChallengeType::Http01, ChallengeType::Dns01];

        let persisted = config.to_renewal_params();

        let mut restored = EffectiveConfig::new();
        restore_required_config_elements(&mut restored, &persisted).unwrap();

        assert_eq!(restored.authenticator, config.authenticator);
        assert!(restored.must_staple);
        assert_eq!(restored.rsa_key_size, 4096);
        assert_eq!(restored.pref_challs, config.pref_challs);
        assert_eq!(restored.http01_port, None);
    }
}
