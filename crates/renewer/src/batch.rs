//! Batch orchestration: renew every tracked lineage, isolating failures.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info};

use warden_config::EffectiveConfig;

use crate::client::IssuanceClient;
use crate::decision::should_renew;
use crate::errors::{BatchError, RenewError};
use crate::hooks::{validate_hook, HookKind, HookRunner};
use crate::plugins::PluginSelector;
use crate::reconstitute::reconstitute;
use crate::report::{BatchReport, RenewalOutcome};
use crate::storage::{renewal_configs, LineageStore};

/// Drives one renewal batch over every tracked lineage.
///
/// Collaborators are injected as trait objects so tests can substitute
/// fakes. Processing is strictly sequential: deterministic hook order,
/// and no parallel hammering of a rate-limited certificate authority.
pub struct Renewer<'a> {
    config_dir: PathBuf,
    client: &'a dyn IssuanceClient,
    store: &'a dyn LineageStore,
    plugins: &'a dyn PluginSelector,
    interactive: bool,
    sleeper: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a> Renewer<'a> {
    pub fn new(
        config_dir: impl Into<PathBuf>,
        client: &'a dyn IssuanceClient,
        store: &'a dyn LineageStore,
        plugins: &'a dyn PluginSelector,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            client,
            store,
            plugins,
            interactive: std::io::stdin().is_terminal(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Override interactivity detection (tests, forced batch mode).
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Replace the jitter sleep implementation.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Process all tracked lineages (or the one named by `selector`).
    ///
    /// Per-lineage errors are caught here, recorded as failed outcomes,
    /// and never stop the batch. Only pre-batch conditions — an
    /// unreadable renewal directory, an unknown selector, an
    /// unresolvable hook command — abort the run.
    pub fn renew_all(
        &mut self,
        config: &EffectiveConfig,
        selector: Option<&str>,
    ) -> Result<BatchReport, BatchError> {
        let mut conf_paths =
            renewal_configs(&self.config_dir).map_err(|source| BatchError::ConfigDir {
                path: self.config_dir.join("renewal"),
                source,
            })?;

        if let Some(name) = selector {
            conf_paths.retain(|p| p.file_stem().and_then(|s| s.to_str()) == Some(name));
            if conf_paths.is_empty() {
                return Err(BatchError::NoSuchLineage(name.to_string()));
            }
        }

        if config.disable_hook_validation {
            debug!("hook validation disabled; missing commands will surface at execution time");
        } else {
            let hooks = [
                (&config.pre_hook, HookKind::Pre),
                (&config.deploy_hook, HookKind::Deploy),
                (&config.post_hook, HookKind::Post),
            ];
            for (command, kind) in hooks {
                if let Some(command) = command {
                    validate_hook(command, kind)?;
                }
            }
        }

        let mut report = BatchReport::new(config.dry_run);
        let mut hooks = HookRunner::new();

        if conf_paths.is_empty() {
            info!("no renewal configurations found; nothing to do");
            return Ok(report);
        }

        // Scheduled fleet-wide invocations all fire at the same minute;
        // spread the load on the shared CA endpoint
        if !self.interactive {
            let max = config.jitter_max_secs.max(1);
            let secs = rand::thread_rng().gen_range(1..=max);
            debug!(sleep_secs = secs, "non-interactive renewal; sleeping before the batch");
            (self.sleeper)(Duration::from_secs(secs));
        }

        for conf_path in &conf_paths {
            let name = conf_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            // Each lineage restores into its own copy so one lineage's
            // persisted parameters never leak into the next
            let mut lineage_config = config.clone();
            match self.renew_lineage(&mut lineage_config, conf_path, &mut hooks) {
                Ok(outcome) => report.record(&name, outcome),
                Err(e) => {
                    error!(
                        lineage = %name,
                        error = %e,
                        "Renewal attempt failed; continuing with the remaining lineages"
                    );
                    report.record(
                        &name,
                        RenewalOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        if report.attempted() > 0 {
            hooks.run_deferred_post();
        }
        report.set_hooks_run(hooks.hooks_run());
        if hooks.hooks_run() == 0 {
            info!("no hooks were run");
        }

        Ok(report)
    }

    fn renew_lineage(
        &self,
        config: &mut EffectiveConfig,
        conf_path: &Path,
        hooks: &mut HookRunner,
    ) -> Result<RenewalOutcome, RenewError> {
        let lineage = reconstitute(config, conf_path, self.plugins)?;

        if !should_renew(config, &lineage)? {
            return Ok(RenewalOutcome::Skipped {
                fullchain: lineage.fullchain_path.clone(),
                reason: "not yet due".to_string(),
            });
        }

        if let Some(command) = config.pre_hook.clone() {
            hooks.run_pre(&command);
        }
        // Deferred regardless of how the attempt ends
        if let Some(command) = config.post_hook.clone() {
            hooks.register_post(&command);
        }

        let existing_key = config.reuse_key.then(|| lineage.privkey_path.clone());
        info!(
            lineage = %lineage.name,
            domains = ?lineage.domains,
            reuse_key = config.reuse_key,
            "Renewing certificate"
        );
        let issued = self
            .client
            .obtain_certificate(&lineage.domains, existing_key.as_deref())?;

        if config.dry_run {
            info!(lineage = %lineage.name, "dry run: not saving the test certificate");
            return Ok(RenewalOutcome::Renewed {
                fullchain: lineage.fullchain_path.clone(),
                dry_run: true,
            });
        }

        let params = config.to_renewal_params();
        let version = self.store.save_successor(&lineage, &issued, &params)?;
        self.store.update_all_links_to(&lineage, version)?;

        if let Some(command) = config.deploy_hook.clone() {
            hooks.run_deploy(&command, &lineage);
        }

        info!(
            lineage = %lineage.name,
            version,
            fullchain = %lineage.fullchain_path.display(),
            "Certificate renewed"
        );
        Ok(RenewalOutcome::Renewed {
            fullchain: lineage.fullchain_path.clone(),
            dry_run: false,
        })
    }
}
