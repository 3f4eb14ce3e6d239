//! Per-batch outcome collection and the user-visible summary.

use std::path::PathBuf;

/// What happened to one lineage in a batch.
#[derive(Debug, Clone)]
pub enum RenewalOutcome {
    /// A new certificate was obtained (and saved, unless this was a dry run)
    Renewed { fullchain: PathBuf, dry_run: bool },
    /// No renewal was needed
    Skipped { fullchain: PathBuf, reason: String },
    /// This lineage failed; the batch continued without it
    Failed { error: String },
}

/// Ordered per-lineage outcomes plus hook counters for one batch run.
#[derive(Debug)]
pub struct BatchReport {
    dry_run: bool,
    outcomes: Vec<(String, RenewalOutcome)>,
    hooks_run: usize,
}

impl BatchReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            outcomes: Vec::new(),
            hooks_run: 0,
        }
    }

    pub fn record(&mut self, name: &str, outcome: RenewalOutcome) {
        self.outcomes.push((name.to_string(), outcome));
    }

    pub fn set_hooks_run(&mut self, hooks_run: usize) {
        self.hooks_run = hooks_run;
    }

    pub fn outcomes(&self) -> &[(String, RenewalOutcome)] {
        &self.outcomes
    }

    /// Renewal attempts: everything that got past the due-check.
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, RenewalOutcome::Skipped { .. }))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, RenewalOutcome::Failed { .. }))
    }

    /// Render the operator-facing batch summary.
    pub fn render(&self) -> String {
        let mut renewed = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in &self.outcomes {
            match outcome {
                RenewalOutcome::Renewed { fullchain, .. } => renewed.push(fullchain),
                RenewalOutcome::Skipped { fullchain, reason } => skipped.push((fullchain, reason)),
                RenewalOutcome::Failed { error } => failed.push((name, error)),
            }
        }

        let mut out = String::new();
        if self.dry_run && !renewed.is_empty() {
            out.push_str(
                "** DRY RUN: simulating renewal close to certificate expiry\n\
                 ** (The test certificates below have not been saved.)\n\n",
            );
        }

        if !skipped.is_empty() {
            out.push_str("The following certificates are not due for renewal yet:\n");
            for (fullchain, reason) in &skipped {
                out.push_str(&format!("  {} ({reason})\n", fullchain.display()));
            }
        }

        if renewed.is_empty() && failed.is_empty() {
            out.push_str("No renewals were attempted.\n");
        } else {
            if !renewed.is_empty() {
                if failed.is_empty() {
                    out.push_str(
                        "Congratulations, all renewals succeeded. \
                         The following certificates have been renewed:\n",
                    );
                } else {
                    out.push_str("The following certificates were successfully renewed:\n");
                }
                for fullchain in &renewed {
                    out.push_str(&format!("  {} (success)\n", fullchain.display()));
                }
            }
            if !failed.is_empty() {
                if renewed.is_empty() {
                    out.push_str(
                        "All renewal attempts failed. \
                         The following certificates could not be renewed:\n",
                    );
                } else {
                    out.push_str("The following certificates could not be renewed:\n");
                }
                for (name, error) in &failed {
                    out.push_str(&format!("  {name} ({error})\n"));
                }
            }
        }

        if self.hooks_run == 0 {
            out.push_str("No hooks were run.\n");
        }

        out
    }
}
