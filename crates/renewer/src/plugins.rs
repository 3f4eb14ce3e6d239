//! Plugin selection seam.
//!
//! Authenticator and installer discovery is an external concern; the
//! renewal core only needs to resolve the names a lineage restored and to
//! reject domain sets the chosen plugin cannot handle. Tests substitute
//! their own [`PluginSelector`].

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

/// Plugin selection failures. Scoped to one lineage.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("could not find {kind} plugin {name:?}")]
    UnknownPlugin { kind: &'static str, name: String },

    #[error("the {plugin} plugin does not support domain {domain:?}")]
    InvalidDomain { plugin: String, domain: String },
}

/// Resolved plugin pair for one renewal attempt.
#[derive(Debug, Clone)]
pub struct SelectedPlugins {
    pub authenticator: String,
    pub installer: Option<String>,
}

/// Resolves authenticator/installer names into runnable plugin selections.
pub trait PluginSelector {
    fn select(
        &self,
        authenticator: &str,
        installer: Option<&str>,
        domains: &[String],
    ) -> Result<SelectedPlugins, PluginError>;
}

/// Built-in registry of known plugin names.
#[derive(Debug)]
pub struct StaticPluginRegistry {
    authenticators: BTreeSet<&'static str>,
    installers: BTreeSet<&'static str>,
}

impl Default for StaticPluginRegistry {
    fn default() -> Self {
        Self {
            authenticators: ["standalone", "webroot", "manual", "apache", "nginx"]
                .into_iter()
                .collect(),
            installers: ["apache", "nginx"].into_iter().collect(),
        }
    }
}

impl PluginSelector for StaticPluginRegistry {
    fn select(
        &self,
        authenticator: &str,
        installer: Option<&str>,
        domains: &[String],
    ) -> Result<SelectedPlugins, PluginError> {
        if !self.authenticators.contains(authenticator) {
            return Err(PluginError::UnknownPlugin {
                kind: "authenticator",
                name: authenticator.to_string(),
            });
        }
        if let Some(installer) = installer {
            if !self.installers.contains(installer) {
                return Err(PluginError::UnknownPlugin {
                    kind: "installer",
                    name: installer.to_string(),
                });
            }
        }

        // Plugins speak to the ACME server over ASCII identifiers;
        // internationalized names must arrive already punycoded
        for domain in domains {
            if !domain.is_ascii() || domain.is_empty() {
                return Err(PluginError::InvalidDomain {
                    plugin: authenticator.to_string(),
                    domain: domain.clone(),
                });
            }
        }

        debug!(
            authenticator = %authenticator,
            installer = ?installer,
            "Selected plugins"
        );
        Ok(SelectedPlugins {
            authenticator: authenticator.to_string(),
            installer: installer.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_known_authenticator() {
        let registry = StaticPluginRegistry::default();
        let selected = registry
            .select("webroot", None, &domains(&["example.com"]))
            .unwrap();
        assert_eq!(selected.authenticator, "webroot");
        assert!(selected.installer.is_none());
    }

    #[test]
    fn test_select_with_installer() {
        let registry = StaticPluginRegistry::default();
        let selected = registry
            .select("webroot", Some("nginx"), &domains(&["example.com"]))
            .unwrap();
        assert_eq!(selected.installer.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_unknown_authenticator_fails() {
        let registry = StaticPluginRegistry::default();
        let err = registry
            .select("shrubbery", None, &domains(&["example.com"]))
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::UnknownPlugin { kind: "authenticator", .. }
        ));
    }

    #[test]
    fn test_unknown_installer_fails() {
        let registry = StaticPluginRegistry::default();
        let err = registry
            .select("webroot", Some("shrubbery"), &domains(&["example.com"]))
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::UnknownPlugin { kind: "installer", .. }
        ));
    }

    #[test]
    fn test_non_ascii_domain_rejected() {
        let registry = StaticPluginRegistry::default();
        let err = registry
            .select("webroot", None, &domains(&["uniçodé.com"]))
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidDomain { .. }));
    }
}
