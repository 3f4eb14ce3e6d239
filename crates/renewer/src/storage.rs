//! Lineage storage: renewal configs, versioned archives, live links.
//!
//! # Directory Structure
//!
//! ```text
//! config_dir/
//! ├── renewal/
//! │   └── example.com.conf      # per-lineage renewal config ([renewalparams])
//! ├── archive/
//! │   └── example.com/
//! │       ├── cert1.pem         # every saved version, never overwritten
//! │       ├── chain1.pem
//! │       ├── fullchain1.pem
//! │       └── privkey1.pem      # 0600 on Unix
//! └── live/
//!     └── example.com/
//!         ├── cert.pem -> ../../archive/example.com/cert1.pem
//!         ├── chain.pem
//!         ├── fullchain.pem
//!         └── privkey.pem
//! ```
//!
//! The archive is append-only: a successor save writes version `N + 1`
//! next to the existing versions and the `live/` symlinks are retargeted
//! afterwards, atomically (temporary link plus rename), so an interrupted
//! save never leaves a half-written version visible as latest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::client::IssuedCertificate;

/// The four file kinds every lineage version carries.
const ITEM_KINDS: [&str; 4] = ["cert", "chain", "fullchain", "privkey"];

/// Storage failures. Malformed per-lineage configs are scoped to their
/// lineage; only an unreadable renewal directory is batch-fatal (and is
/// surfaced by the orchestrator, not here).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("renewal config file {0:?} is empty")]
    EmptyConfig(PathBuf),

    #[error("renewal config file {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("renewal config file {path:?} is missing {field}")]
    MissingField {
        path: PathBuf,
        field: &'static str,
    },

    #[error("lineage {0} has an empty domain list")]
    NoDomains(String),
}

/// A certificate lineage: one named certificate, its version history, and
/// the persisted configuration that produced it.
#[derive(Debug, Clone)]
pub struct Lineage {
    /// Lineage name, derived from the conf file name
    pub name: String,
    /// Domain names covered, in canonical order
    pub domains: Vec<String>,
    /// Version of the current live files
    pub version: u32,
    /// Directory holding every archived version
    pub archive_dir: PathBuf,
    /// Live certificate path
    pub cert_path: PathBuf,
    /// Live chain path
    pub chain_path: PathBuf,
    /// Live fullchain path
    pub fullchain_path: PathBuf,
    /// Live private key path
    pub privkey_path: PathBuf,
    /// The conf file this lineage was loaded from
    pub conf_path: PathBuf,
    /// Persisted `[renewalparams]`, if the conf carries one
    pub renewal_params: Option<toml::Table>,
}

impl Lineage {
    /// Load a lineage from its renewal config file.
    ///
    /// An empty or unparseable file is an error for this lineage only;
    /// the caller decides whether the batch continues.
    pub fn load(conf_path: &Path) -> Result<Self, StorageError> {
        let content = fs::read_to_string(conf_path).map_err(|source| StorageError::Read {
            path: conf_path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(StorageError::EmptyConfig(conf_path.to_path_buf()));
        }

        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            StorageError::Malformed {
                path: conf_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let name = conf_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let domains = table
            .get("domains")
            .and_then(|v| v.as_array())
            .ok_or(StorageError::MissingField {
                path: conf_path.to_path_buf(),
                field: "domains",
            })?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>();
        if domains.is_empty() {
            return Err(StorageError::NoDomains(name));
        }

        let version = table
            .get("version")
            .and_then(|v| v.as_integer())
            .ok_or(StorageError::MissingField {
                path: conf_path.to_path_buf(),
                field: "version",
            })? as u32;

        let path_field = |field: &'static str| -> Result<PathBuf, StorageError> {
            table
                .get(field)
                .and_then(|v| v.as_str())
                .map(PathBuf::from)
                .ok_or(StorageError::MissingField {
                    path: conf_path.to_path_buf(),
                    field,
                })
        };

        let lineage = Self {
            domains,
            version,
            archive_dir: path_field("archive_dir")?,
            cert_path: path_field("cert")?,
            chain_path: path_field("chain")?,
            fullchain_path: path_field("fullchain")?,
            privkey_path: path_field("privkey")?,
            conf_path: conf_path.to_path_buf(),
            renewal_params: table
                .get("renewalparams")
                .and_then(|v| v.as_table())
                .cloned(),
            name,
        };

        trace!(
            lineage = %lineage.name,
            version = lineage.version,
            domains = lineage.domains.len(),
            "Loaded lineage"
        );
        Ok(lineage)
    }
}

/// Storage collaborator for persisting renewal results.
///
/// `save_successor` appends a new version and captures the renewal
/// parameters used for the issuance; `update_all_links_to` retargets the
/// live links once the version is fully on disk.
pub trait LineageStore {
    fn save_successor(
        &self,
        lineage: &Lineage,
        issued: &IssuedCertificate,
        params: &toml::Table,
    ) -> Result<u32, StorageError>;

    fn update_all_links_to(&self, lineage: &Lineage, version: u32) -> Result<(), StorageError>;
}

/// Enumerate renewal config files under `config_dir/renewal`, sorted by
/// name.
///
/// A missing renewal directory means no lineages are tracked yet and
/// yields an empty list; any other read failure is surfaced to the
/// caller, which treats it as batch-fatal.
pub fn renewal_configs(config_dir: &Path) -> Result<Vec<PathBuf>, io::Error> {
    let dir = config_dir.join("renewal");
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut configs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("conf") {
            configs.push(path);
        }
    }
    configs.sort();
    Ok(configs)
}

/// Filesystem-backed lineage store.
#[derive(Debug)]
pub struct FsLineageStore {
    config_dir: PathBuf,
}

impl FsLineageStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// The directory holding per-lineage renewal config files.
    pub fn renewal_dir(&self) -> PathBuf {
        self.config_dir.join("renewal")
    }

    fn archive_dir(&self, name: &str) -> PathBuf {
        self.config_dir.join("archive").join(name)
    }

    fn live_dir(&self, name: &str) -> PathBuf {
        self.config_dir.join("live").join(name)
    }

    /// Enumerate this store's renewal config files, sorted by name.
    pub fn renewal_configs(&self) -> Result<Vec<PathBuf>, io::Error> {
        renewal_configs(&self.config_dir)
    }

    /// Create a brand-new lineage at version 1.
    ///
    /// Renewal only ever appends successors; first issuance goes through
    /// here.
    pub fn create_lineage(
        &self,
        name: &str,
        domains: &[String],
        issued: &IssuedCertificate,
        params: &toml::Table,
    ) -> Result<Lineage, StorageError> {
        self.write_version_files(name, 1, issued)?;
        let conf_path = self.write_conf(name, domains, 1, params)?;
        let lineage = Lineage::load(&conf_path)?;
        self.update_all_links_to(&lineage, 1)?;
        info!(lineage = %name, "Created new lineage");
        Ok(lineage)
    }

    fn write_version_files(
        &self,
        name: &str,
        version: u32,
        issued: &IssuedCertificate,
    ) -> Result<(), StorageError> {
        let archive = self.archive_dir(name);
        fs::create_dir_all(&archive).map_err(|source| StorageError::Write {
            path: archive.clone(),
            source,
        })?;

        let items = [
            ("cert", &issued.cert_pem),
            ("chain", &issued.chain_pem),
            ("fullchain", &issued.fullchain_pem),
            ("privkey", &issued.key_pem),
        ];
        for (kind, pem) in items {
            let path = archive.join(format!("{kind}{version}.pem"));
            fs::write(&path, pem).map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

            // Only the key needs restrictive permissions
            #[cfg(unix)]
            if kind == "privkey" {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(
                    |source| StorageError::Write { path, source },
                )?;
            }
        }
        Ok(())
    }

    fn write_conf(
        &self,
        name: &str,
        domains: &[String],
        version: u32,
        params: &toml::Table,
    ) -> Result<PathBuf, StorageError> {
        let renewal_dir = self.renewal_dir();
        fs::create_dir_all(&renewal_dir).map_err(|source| StorageError::Write {
            path: renewal_dir.clone(),
            source,
        })?;

        let live = self.live_dir(name);
        let mut table = toml::Table::new();
        table.insert("version".to_string(), toml::Value::Integer(i64::from(version)));
        table.insert(
            "archive_dir".to_string(),
            toml::Value::String(self.archive_dir(name).display().to_string()),
        );
        for kind in ITEM_KINDS {
            table.insert(
                kind.to_string(),
                toml::Value::String(live.join(format!("{kind}.pem")).display().to_string()),
            );
        }
        table.insert(
            "domains".to_string(),
            toml::Value::Array(
                domains
                    .iter()
                    .map(|d| toml::Value::String(d.clone()))
                    .collect(),
            ),
        );
        table.insert(
            "renewalparams".to_string(),
            toml::Value::Table(params.clone()),
        );

        let conf_path = renewal_dir.join(format!("{name}.conf"));
        let tmp_path = renewal_dir.join(format!(".{name}.conf.new"));
        let rendered = toml::to_string(&table).map_err(|e| StorageError::Malformed {
            path: conf_path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&tmp_path, rendered).map_err(|source| StorageError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &conf_path).map_err(|source| StorageError::Write {
            path: conf_path.clone(),
            source,
        })?;
        Ok(conf_path)
    }
}

impl LineageStore for FsLineageStore {
    fn save_successor(
        &self,
        lineage: &Lineage,
        issued: &IssuedCertificate,
        params: &toml::Table,
    ) -> Result<u32, StorageError> {
        let next = lineage.version + 1;
        self.write_version_files(&lineage.name, next, issued)?;
        self.write_conf(&lineage.name, &lineage.domains, next, params)?;

        info!(
            lineage = %lineage.name,
            version = next,
            "Saved successor certificate version"
        );
        Ok(next)
    }

    fn update_all_links_to(&self, lineage: &Lineage, version: u32) -> Result<(), StorageError> {
        let live = self.live_dir(&lineage.name);
        fs::create_dir_all(&live).map_err(|source| StorageError::Write {
            path: live.clone(),
            source,
        })?;

        for kind in ITEM_KINDS {
            let target = self.archive_dir(&lineage.name).join(format!("{kind}{version}.pem"));
            let link = live.join(format!("{kind}.pem"));
            let tmp = live.join(format!(".{kind}.pem.new"));

            // Replace via rename so the link is never missing or dangling
            let _ = fs::remove_file(&tmp);
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &tmp).map_err(|source| StorageError::Write {
                path: tmp.clone(),
                source,
            })?;
            #[cfg(not(unix))]
            fs::copy(&target, &tmp).map(|_| ()).map_err(|source| StorageError::Write {
                path: tmp.clone(),
                source,
            })?;
            fs::rename(&tmp, &link).map_err(|source| StorageError::Write {
                path: link.clone(),
                source,
            })?;
        }

        debug!(
            lineage = %lineage.name,
            version,
            "Live links now point at the new version"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{issued_fixture, make_lineage};
    use tempfile::TempDir;

    #[test]
    fn test_load_lineage() {
        let temp = TempDir::new().unwrap();
        let conf = make_lineage(
            temp.path(),
            "example.com",
            &["example.com", "www.example.com"],
            "authenticator = \"standalone\"",
        );

        let lineage = Lineage::load(&conf).unwrap();
        assert_eq!(lineage.name, "example.com");
        assert_eq!(lineage.domains.len(), 2);
        assert_eq!(lineage.version, 1);
        assert!(lineage.renewal_params.is_some());
    }

    #[test]
    fn test_load_empty_conf_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.conf");
        fs::write(&path, "").unwrap();

        let err = Lineage::load(&path).unwrap_err();
        assert!(matches!(err, StorageError::EmptyConfig(_)));
    }

    #[test]
    fn test_load_garbage_conf_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.conf");
        fs::write(&path, "My contents don't matter").unwrap();

        let err = Lineage::load(&path).unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
    }

    #[test]
    fn test_renewal_configs_sorted() {
        let temp = TempDir::new().unwrap();
        make_lineage(temp.path(), "b.com", &["b.com"], "");
        make_lineage(temp.path(), "a.com", &["a.com"], "");

        let store = FsLineageStore::new(temp.path());
        let configs = store.renewal_configs().unwrap();
        assert_eq!(configs.len(), 2);
        assert!(configs[0].ends_with("a.com.conf"));
        assert!(configs[1].ends_with("b.com.conf"));
    }

    #[test]
    fn test_renewal_configs_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        assert!(store.renewal_configs().unwrap().is_empty());
    }

    #[test]
    fn test_save_successor_appends_version() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let conf = make_lineage(temp.path(), "example.com", &["example.com"], "");
        let lineage = Lineage::load(&conf).unwrap();

        let issued = issued_fixture();
        let version = store
            .save_successor(&lineage, &issued, &toml::Table::new())
            .unwrap();
        assert_eq!(version, 2);

        let archive = temp.path().join("archive/example.com");
        assert!(archive.join("cert2.pem").exists());
        assert!(archive.join("privkey2.pem").exists());

        // The conf now records the new version
        let reloaded = Lineage::load(&conf).unwrap();
        assert_eq!(reloaded.version, 2);
    }

    #[test]
    fn test_save_successor_never_overwrites_history() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let conf = make_lineage(temp.path(), "example.com", &["example.com"], "");

        let issued = issued_fixture();
        let lineage = Lineage::load(&conf).unwrap();
        store
            .save_successor(&lineage, &issued, &toml::Table::new())
            .unwrap();
        let lineage = Lineage::load(&conf).unwrap();
        store
            .save_successor(&lineage, &issued, &toml::Table::new())
            .unwrap();

        let archive = temp.path().join("archive/example.com");
        for version in 1..=3 {
            assert!(
                archive.join(format!("cert{version}.pem")).exists(),
                "version {version} should still be archived"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_update_links_points_at_new_version() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let conf = make_lineage(temp.path(), "example.com", &["example.com"], "");
        let lineage = Lineage::load(&conf).unwrap();

        let version = store
            .save_successor(&lineage, &issued_fixture(), &toml::Table::new())
            .unwrap();
        store.update_all_links_to(&lineage, version).unwrap();

        let link = temp.path().join("live/example.com/cert.pem");
        let target = fs::read_link(&link).unwrap();
        assert!(target.ends_with("cert2.pem"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let conf = make_lineage(temp.path(), "example.com", &["example.com"], "");
        let lineage = Lineage::load(&conf).unwrap();

        store
            .save_successor(&lineage, &issued_fixture(), &toml::Table::new())
            .unwrap();

        let key = temp.path().join("archive/example.com/privkey2.pem");
        let mode = fs::metadata(&key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_create_lineage_starts_at_version_one() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let params: toml::Table = "authenticator = \"standalone\"".parse().unwrap();

        let lineage = store
            .create_lineage(
                "new.com",
                &["new.com".to_string()],
                &issued_fixture(),
                &params,
            )
            .unwrap();

        assert_eq!(lineage.version, 1);
        assert_eq!(lineage.domains, vec!["new.com".to_string()]);
        assert!(temp.path().join("archive/new.com/cert1.pem").exists());
        assert!(temp.path().join("renewal/new.com.conf").exists());
    }

    #[test]
    fn test_save_successor_captures_params() {
        let temp = TempDir::new().unwrap();
        let store = FsLineageStore::new(temp.path());
        let conf = make_lineage(temp.path(), "example.com", &["example.com"], "");
        let lineage = Lineage::load(&conf).unwrap();

        let params: toml::Table = "authenticator = \"webroot\"".parse().unwrap();
        store
            .save_successor(&lineage, &issued_fixture(), &params)
            .unwrap();

        let reloaded = Lineage::load(&conf).unwrap();
        let restored = reloaded.renewal_params.unwrap();
        assert_eq!(restored["authenticator"].as_str(), Some("webroot"));
    }
}
