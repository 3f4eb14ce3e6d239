//! The live configuration for one renewal invocation.

use std::collections::{BTreeMap, BTreeSet};

use crate::challenge::ChallengeType;

/// Default ACME directory URL (Let's Encrypt production).
pub const DEFAULT_DIRECTORY_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Default RSA key size in bits.
pub const DEFAULT_RSA_KEY_SIZE: u32 = 2048;

/// Default renewal window: renew when within this many days of expiry.
pub const DEFAULT_RENEW_BEFORE_DAYS: u32 = 30;

/// Default upper bound for the pre-batch jitter sleep, in seconds.
pub const DEFAULT_JITTER_MAX_SECS: u64 = 480;

/// The live configuration object for one renewal run.
///
/// Constructed once per process invocation from CLI input, mutated
/// per-lineage during restoration, and discarded after the batch.
///
/// # CLI provenance
///
/// "A value supplied explicitly on the command line is never overwritten
/// by a persisted value" is enforced through an explicit marker set:
/// the CLI layer calls [`mark_set_by_cli`](Self::mark_set_by_cli) for every
/// argument the user actually passed, and the restorer consults
/// [`set_by_cli`](Self::set_by_cli) before each assignment. Provenance is
/// tracked per persisted field name, not inferred from defaults, so a user
/// passing `--rsa-key-size 2048` pins the default value just as firmly as
/// a non-default one.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    /// Simulate renewals against the staging environment; nothing is saved
    pub dry_run: bool,
    /// Renew unconditionally, ignoring the expiry window
    pub renew_by_default: bool,
    /// Suppress the console summary
    pub quiet: bool,
    /// Expand console output to debug level
    pub verbose: bool,
    /// Skip hook command resolution before the batch
    pub disable_hook_validation: bool,
    /// Reuse the lineage's existing private key on renewal
    pub reuse_key: bool,
    /// Allow issuance to proceed with a subset of the requested names
    pub allow_subset_of_names: bool,
    /// Request the OCSP must-staple extension
    pub must_staple: bool,

    /// Authenticator plugin name
    pub authenticator: Option<String>,
    /// Installer plugin name
    pub installer: Option<String>,
    /// Preferred challenge types, in order
    pub pref_challs: Vec<ChallengeType>,
    /// RSA key size in bits
    pub rsa_key_size: u32,
    /// Port for HTTP-01 challenges; `None` lets the authenticator choose
    pub http01_port: Option<u16>,
    /// Webroot paths shared by all domains (legacy single-path form)
    pub webroot_path: Vec<String>,
    /// Per-domain webroot mapping
    pub webroot_map: BTreeMap<String, String>,
    /// Renew when within this many days of expiry
    pub renew_before_days: u32,
    /// Upper bound for the pre-batch jitter sleep, in seconds
    pub jitter_max_secs: u64,

    /// Command run once per batch before the first renewal attempt
    pub pre_hook: Option<String>,
    /// Command run after each successful renewal
    pub deploy_hook: Option<String>,
    /// Command deferred to the end of the batch, deduplicated
    pub post_hook: Option<String>,

    /// ACME directory URL
    pub server: String,
    /// Contact email for ACME account registration
    pub contact_email: Option<String>,

    /// Plugin-namespaced keys restored opaquely from persisted parameters
    pub plugin_extras: BTreeMap<String, String>,

    set_by_cli: BTreeSet<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            renew_by_default: false,
            quiet: false,
            verbose: false,
            disable_hook_validation: false,
            reuse_key: false,
            allow_subset_of_names: false,
            must_staple: false,
            authenticator: None,
            installer: None,
            pref_challs: Vec::new(),
            rsa_key_size: DEFAULT_RSA_KEY_SIZE,
            http01_port: None,
            webroot_path: Vec::new(),
            webroot_map: BTreeMap::new(),
            renew_before_days: DEFAULT_RENEW_BEFORE_DAYS,
            jitter_max_secs: DEFAULT_JITTER_MAX_SECS,
            pre_hook: None,
            deploy_hook: None,
            post_hook: None,
            server: DEFAULT_DIRECTORY_URL.to_string(),
            contact_email: None,
            plugin_extras: BTreeMap::new(),
            set_by_cli: BTreeSet::new(),
        }
    }
}

impl EffectiveConfig {
    /// Create a configuration with defaults and no CLI provenance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the user supplied `field` on the command line.
    ///
    /// `field` is the persisted parameter name (`rsa_key_size`,
    /// `webroot_map`, ...), not the CLI flag spelling.
    pub fn mark_set_by_cli(&mut self, field: &str) {
        self.set_by_cli.insert(field.to_string());
    }

    /// Whether `field` was supplied on the command line this invocation.
    pub fn set_by_cli(&self, field: &str) -> bool {
        self.set_by_cli.contains(field)
    }

    /// Render the restorable subset back to its persisted string form.
    ///
    /// Written into the lineage conf after every successful issuance so
    /// the next run restores the exact configuration used. Booleans become
    /// exactly `"True"`/`"False"`, integers decimal strings, and an absent
    /// HTTP-01 port the literal `"None"` — the same coercions the restorer
    /// reverses.
    pub fn to_renewal_params(&self) -> toml::Table {
        let mut table = toml::Table::new();

        if let Some(ref authenticator) = self.authenticator {
            table.insert(
                "authenticator".to_string(),
                toml::Value::String(authenticator.clone()),
            );
        }
        if let Some(ref installer) = self.installer {
            table.insert(
                "installer".to_string(),
                toml::Value::String(installer.clone()),
            );
        }
        if !self.pref_challs.is_empty() {
            let names = self
                .pref_challs
                .iter()
                .map(|c| toml::Value::String(c.as_str().to_string()))
                .collect();
            table.insert("pref_challs".to_string(), toml::Value::Array(names));
        }

        table.insert(
            "must_staple".to_string(),
            toml::Value::String(bool_str(self.must_staple).to_string()),
        );
        table.insert(
            "allow_subset_of_names".to_string(),
            toml::Value::String(bool_str(self.allow_subset_of_names).to_string()),
        );
        table.insert(
            "reuse_key".to_string(),
            toml::Value::String(bool_str(self.reuse_key).to_string()),
        );
        table.insert(
            "rsa_key_size".to_string(),
            toml::Value::String(self.rsa_key_size.to_string()),
        );

        let port = match self.http01_port {
            Some(port) => port.to_string(),
            None => "None".to_string(),
        };
        table.insert("http01_port".to_string(), toml::Value::String(port));

        if !self.webroot_map.is_empty() {
            let mut map = toml::Table::new();
            for (domain, path) in &self.webroot_map {
                map.insert(domain.clone(), toml::Value::String(path.clone()));
            }
            table.insert("webroot_map".to_string(), toml::Value::Table(map));
        } else if !self.webroot_path.is_empty() {
            let paths = self
                .webroot_path
                .iter()
                .map(|p| toml::Value::String(p.clone()))
                .collect();
            table.insert("webroot_path".to_string(), toml::Value::Array(paths));
        }

        for (key, value) in &self.plugin_extras {
            table.insert(key.clone(), toml::Value::String(value.clone()));
        }

        table
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
