//! ACME-backed issuance client.
//!
//! Wraps `instant-acme` behind the blocking [`IssuanceClient`] interface:
//! the protocol itself lives in that crate, this adapter drives the order
//! state machine. HTTP-01 challenges are satisfied by publishing each key
//! authorization into the configured webroot under
//! `.well-known/acme-challenge/`, where the domain's web server must
//! already serve files from.
//!
//! The adapter owns a private current-thread tokio runtime; the renewal
//! core around it stays strictly sequential and synchronous.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use tracing::{debug, info, warn};

use warden_config::EffectiveConfig;

use crate::client::{IssuanceClient, IssuanceError, IssuedCertificate};

/// Let's Encrypt staging directory URL, used for dry runs.
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Maximum time to wait for order validation and certificate issuance.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Delay between order status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Issuance client speaking ACME to a configurable directory endpoint.
pub struct AcmeIssuanceClient {
    directory_url: String,
    contact_email: Option<String>,
    account_dir: PathBuf,
    webroot_map: BTreeMap<String, String>,
    webroot_paths: Vec<String>,
    runtime: tokio::runtime::Runtime,
}

impl AcmeIssuanceClient {
    /// Create a client for the given directory endpoint.
    ///
    /// `account_dir` holds the registered account credentials across
    /// runs; webroot configuration decides where HTTP-01 key
    /// authorizations are published.
    pub fn new(
        directory_url: impl Into<String>,
        contact_email: Option<String>,
        account_dir: impl Into<PathBuf>,
        webroot_map: BTreeMap<String, String>,
        webroot_paths: Vec<String>,
    ) -> Result<Self, IssuanceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            directory_url: directory_url.into(),
            contact_email,
            account_dir: account_dir.into(),
            webroot_map,
            webroot_paths,
            runtime,
        })
    }

    /// Build a client from the live configuration.
    pub fn from_config(
        config: &EffectiveConfig,
        account_dir: impl Into<PathBuf>,
    ) -> Result<Self, IssuanceError> {
        Self::new(
            config.server.clone(),
            config.contact_email.clone(),
            account_dir,
            config.webroot_map.clone(),
            config.webroot_path.clone(),
        )
    }

    /// Load the stored ACME account, registering a new one on first use.
    async fn account(&self) -> Result<Account, IssuanceError> {
        let creds_path = self.account_dir.join("credentials.json");

        if creds_path.exists() {
            let json = fs::read_to_string(&creds_path)?;
            let credentials: AccountCredentials = serde_json::from_str(&json)
                .map_err(|e| IssuanceError::Account(format!("stored credentials unusable: {e}")))?;
            debug!(directory = %self.directory_url, "Using stored ACME account");
            return Account::from_credentials(credentials)
                .await
                .map_err(|e| IssuanceError::Account(e.to_string()));
        }

        let contact = self
            .contact_email
            .as_ref()
            .map(|email| format!("mailto:{email}"));
        let contact_refs: Vec<&str> = contact.as_deref().into_iter().collect();

        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &contact_refs,
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await
        .map_err(|e| IssuanceError::Account(e.to_string()))?;

        fs::create_dir_all(&self.account_dir)?;
        let json = serde_json::to_string_pretty(&credentials)
            .map_err(|e| IssuanceError::Account(e.to_string()))?;
        fs::write(&creds_path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&creds_path, fs::Permissions::from_mode(0o600))?;
        }

        info!(directory = %self.directory_url, "Registered new ACME account");
        Ok(account)
    }

    /// Where HTTP-01 key authorizations for `domain` get published.
    fn webroot_for(&self, domain: &str) -> Result<&str, IssuanceError> {
        self.webroot_map
            .get(domain)
            .map(String::as_str)
            .or_else(|| self.webroot_paths.first().map(String::as_str))
            .ok_or_else(|| {
                IssuanceError::Validation(format!("no webroot configured for {domain}"))
            })
    }

    fn publish_key_authorization(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<PathBuf, IssuanceError> {
        let challenge_dir = Path::new(self.webroot_for(domain)?)
            .join(".well-known")
            .join("acme-challenge");
        fs::create_dir_all(&challenge_dir)?;

        let path = challenge_dir.join(token);
        fs::write(&path, key_authorization)?;
        debug!(domain = %domain, path = %path.display(), "Published HTTP-01 key authorization");
        Ok(path)
    }

    async fn obtain(
        &self,
        domains: &[String],
        existing_key_path: Option<&Path>,
    ) -> Result<IssuedCertificate, IssuanceError> {
        let key_pair = match existing_key_path {
            Some(path) => {
                debug!(key = %path.display(), "Reusing existing private key");
                let pem = fs::read_to_string(path)?;
                rcgen::KeyPair::from_pem(&pem)
                    .map_err(|e| IssuanceError::KeyMaterial(e.to_string()))?
            }
            None => rcgen::KeyPair::generate()
                .map_err(|e| IssuanceError::KeyMaterial(e.to_string()))?,
        };

        let account = self.account().await?;

        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await
            .map_err(|e| IssuanceError::Order(e.to_string()))?;

        let authorizations = order
            .authorizations()
            .await
            .map_err(|e| IssuanceError::Order(e.to_string()))?;

        let mut challenge_files = Vec::new();
        let mut ready_urls = Vec::new();
        for auth in &authorizations {
            if matches!(auth.status, AuthorizationStatus::Valid) {
                continue;
            }
            #[allow(irrefutable_let_patterns)]
            let Identifier::Dns(domain) = &auth.identifier
            else {
                continue;
            };

            let Some(challenge) = auth
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Http01)
            else {
                remove_challenge_files(&challenge_files);
                return Err(IssuanceError::Validation(format!(
                    "no http-01 challenge offered for {domain}"
                )));
            };

            let key_auth = order.key_authorization(challenge);
            match self.publish_key_authorization(domain, &challenge.token, key_auth.as_str()) {
                Ok(path) => challenge_files.push(path),
                Err(e) => {
                    remove_challenge_files(&challenge_files);
                    return Err(e);
                }
            }
            ready_urls.push(challenge.url.clone());
        }

        let result = self
            .validate_and_finalize(&mut order, domains, &key_pair, ready_urls)
            .await;
        remove_challenge_files(&challenge_files);
        result
    }

    async fn validate_and_finalize(
        &self,
        order: &mut Order,
        domains: &[String],
        key_pair: &rcgen::KeyPair,
        ready_urls: Vec<String>,
    ) -> Result<IssuedCertificate, IssuanceError> {
        for url in &ready_urls {
            order
                .set_challenge_ready(url)
                .await
                .map_err(|e| IssuanceError::Validation(e.to_string()))?;
        }

        let start = Instant::now();
        loop {
            if start.elapsed() > VALIDATION_TIMEOUT {
                return Err(IssuanceError::Timeout);
            }
            order
                .refresh()
                .await
                .map_err(|e| IssuanceError::Order(e.to_string()))?;
            match order.state().status {
                OrderStatus::Ready | OrderStatus::Valid => break,
                OrderStatus::Invalid => {
                    let detail = order
                        .state()
                        .error
                        .as_ref()
                        .map(|e| format!("{e:?}"))
                        .unwrap_or_else(|| "validation failed".to_string());
                    return Err(IssuanceError::Validation(detail));
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }

        let params = rcgen::CertificateParams::new(domains.to_vec())
            .map_err(|e| IssuanceError::Order(e.to_string()))?;
        let csr = params
            .serialize_request(key_pair)
            .map_err(|e| IssuanceError::Order(e.to_string()))?;
        let csr_pem = csr
            .pem()
            .map_err(|e| IssuanceError::Order(e.to_string()))?;

        if order.state().status != OrderStatus::Valid {
            order
                .finalize(csr.der())
                .await
                .map_err(|e| IssuanceError::Order(e.to_string()))?;
        }

        let fullchain_pem = loop {
            if start.elapsed() > VALIDATION_TIMEOUT {
                return Err(IssuanceError::Timeout);
            }
            match order.certificate().await {
                Ok(Some(chain)) => break chain,
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => return Err(IssuanceError::Order(e.to_string())),
            }
        };

        let (cert_pem, chain_pem) = split_fullchain(&fullchain_pem);
        info!(domains = ?domains, "Certificate issued");

        Ok(IssuedCertificate {
            cert_pem,
            chain_pem,
            fullchain_pem,
            key_pem: key_pair.serialize_pem(),
            csr_pem,
        })
    }
}

impl IssuanceClient for AcmeIssuanceClient {
    fn obtain_certificate(
        &self,
        domains: &[String],
        existing_key_path: Option<&Path>,
    ) -> Result<IssuedCertificate, IssuanceError> {
        self.runtime.block_on(self.obtain(domains, existing_key_path))
    }
}

fn remove_challenge_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to clean up challenge file");
        }
    }
}

/// Split a PEM bundle into the leaf certificate and the rest of the chain.
fn split_fullchain(fullchain: &str) -> (String, String) {
    const END_MARKER: &str = "-----END CERTIFICATE-----";
    match fullchain.find(END_MARKER) {
        Some(idx) => {
            let split = idx + END_MARKER.len();
            let cert = format!("{}\n", fullchain[..split].trim_start());
            let chain = fullchain[split..].trim_start().to_string();
            (cert, chain)
        }
        None => (fullchain.to_string(), String::new()),
    }
}
