//! Warden - certificate renewal batch entry point.
//!
//! One invocation runs one batch over every tracked lineage; scheduling
//! is external (cron, systemd timers), which is why non-interactive runs
//! start with a randomized delay.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::{info, warn};

use warden_config::{ChallengeType, EffectiveConfig};
use warden_renewer::acme::LETS_ENCRYPT_STAGING;
use warden_renewer::{AcmeIssuanceClient, FsLineageStore, Renewer, StaticPluginRegistry};

/// Warden - renew locally tracked TLS certificates
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory holding renewal/, archive/ and live/
    #[arg(
        short = 'c',
        long = "config-dir",
        env = "WARDEN_CONFIG_DIR",
        default_value = "/etc/warden"
    )]
    config_dir: PathBuf,

    /// Directory for the append-only batch log (default: <config-dir>/logs)
    #[arg(long = "logs-dir", env = "WARDEN_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Simulate renewals against the staging environment; nothing is saved
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Only process the lineage with this name
    #[arg(long = "cert-name", value_name = "NAME")]
    cert_name: Option<String>,

    /// Renew even when not yet due
    #[arg(long = "force-renewal", alias = "renew-by-default")]
    force_renewal: bool,

    /// Skip checking that hook commands resolve before the batch
    #[arg(long = "disable-hook-validation")]
    disable_hook_validation: bool,

    /// Command run once per batch before the first renewal attempt
    #[arg(long = "pre-hook", value_name = "COMMAND")]
    pre_hook: Option<String>,

    /// Command run after each successful renewal
    #[arg(long = "deploy-hook", value_name = "COMMAND")]
    deploy_hook: Option<String>,

    /// Command run once at the end of a batch that attempted renewals
    #[arg(long = "post-hook", value_name = "COMMAND")]
    post_hook: Option<String>,

    /// Reuse each lineage's existing private key
    #[arg(long = "reuse-key")]
    reuse_key: bool,

    /// JSON object mapping each domain to its webroot path
    #[arg(long = "webroot-map", value_name = "JSON")]
    webroot_map: Option<String>,

    /// Webroot path shared by all domains
    #[arg(short = 'w', long = "webroot-path", value_name = "PATH")]
    webroot_path: Option<String>,

    /// Authenticator plugin name
    #[arg(short = 'a', long = "authenticator", value_name = "NAME")]
    authenticator: Option<String>,

    /// Installer plugin name
    #[arg(short = 'i', long = "installer", value_name = "NAME")]
    installer: Option<String>,

    /// RSA key size in bits
    #[arg(long = "rsa-key-size", value_name = "BITS")]
    rsa_key_size: Option<u32>,

    /// Port for HTTP-01 challenges
    #[arg(long = "http01-port", value_name = "PORT")]
    http01_port: Option<u16>,

    /// Request the OCSP must-staple extension
    #[arg(long = "must-staple")]
    must_staple: bool,

    /// Allow issuance to proceed with a subset of the requested names
    #[arg(long = "allow-subset-of-names")]
    allow_subset_of_names: bool,

    /// Comma-separated preferred challenge types
    #[arg(long = "preferred-challenges", value_name = "TYPES")]
    preferred_challenges: Option<String>,

    /// Renew when within this many days of expiry
    #[arg(long = "renew-before-days", value_name = "DAYS")]
    renew_before_days: Option<u32>,

    /// Upper bound for the pre-batch jitter sleep, in seconds
    #[arg(long = "jitter-max-secs", value_name = "SECONDS")]
    jitter_max_secs: Option<u64>,

    /// ACME directory URL
    #[arg(long = "server", env = "WARDEN_SERVER", value_name = "URL")]
    server: Option<String>,

    /// Contact email for ACME account registration
    #[arg(short = 'm', long = "email", value_name = "ADDRESS")]
    email: Option<String>,

    /// Suppress the console summary
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

/// CLI argument ids and the persisted parameter names they pin.
const CLI_PROVENANCE: [(&str, &str); 11] = [
    ("authenticator", "authenticator"),
    ("installer", "installer"),
    ("reuse_key", "reuse_key"),
    ("webroot_map", "webroot_map"),
    ("webroot_path", "webroot_path"),
    ("rsa_key_size", "rsa_key_size"),
    ("http01_port", "http01_port"),
    ("must_staple", "must_staple"),
    ("allow_subset_of_names", "allow_subset_of_names"),
    ("preferred_challenges", "pref_challs"),
    ("server", "server"),
];

fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).context("failed to parse arguments")?;

    let logs_dir = cli
        .logs_dir
        .clone()
        .unwrap_or_else(|| cli.config_dir.join("logs"));
    init_logging(&logs_dir, cli.quiet, cli.verbose)?;

    let config = build_config(&cli, &matches)?;

    info!(
        config_dir = %cli.config_dir.display(),
        dry_run = config.dry_run,
        "Starting renewal batch"
    );

    let store = FsLineageStore::new(&cli.config_dir);
    let plugins = StaticPluginRegistry::default();
    let client = AcmeIssuanceClient::from_config(&config, cli.config_dir.join("accounts"))
        .context("failed to initialize the ACME client")?;

    let mut renewer = Renewer::new(&cli.config_dir, &client, &store, &plugins);
    let report = renewer
        .renew_all(&config, cli.cert_name.as_deref())
        .context("renewal batch aborted before processing any lineage")?;

    // Individual lineage failures are embedded in the summary; only a
    // batch that could not start at all exits non-zero
    if report.has_failures() {
        warn!("one or more renewal attempts failed; see the log for details");
    }
    if !config.quiet {
        print!("{}", report.render());
    }

    Ok(())
}

/// Build the live configuration from CLI input, recording which persisted
/// parameters the user pinned on the command line.
fn build_config(cli: &Cli, matches: &clap::ArgMatches) -> Result<EffectiveConfig> {
    let mut config = EffectiveConfig::new();

    config.dry_run = cli.dry_run;
    config.renew_by_default = cli.force_renewal;
    config.quiet = cli.quiet;
    config.verbose = cli.verbose;
    config.disable_hook_validation = cli.disable_hook_validation;
    config.reuse_key = cli.reuse_key;
    config.must_staple = cli.must_staple;
    config.allow_subset_of_names = cli.allow_subset_of_names;
    config.authenticator = cli.authenticator.clone();
    config.installer = cli.installer.clone();
    config.pre_hook = cli.pre_hook.clone();
    config.deploy_hook = cli.deploy_hook.clone();
    config.post_hook = cli.post_hook.clone();
    config.contact_email = cli.email.clone();

    if let Some(size) = cli.rsa_key_size {
        config.rsa_key_size = size;
    }
    if let Some(port) = cli.http01_port {
        config.http01_port = Some(port);
    }
    if let Some(days) = cli.renew_before_days {
        config.renew_before_days = days;
    }
    if let Some(max) = cli.jitter_max_secs {
        config.jitter_max_secs = max;
    }
    if let Some(ref server) = cli.server {
        config.server = server.clone();
    }
    if let Some(ref challs) = cli.preferred_challenges {
        config.pref_challs = challs
            .split(',')
            .map(ChallengeType::from_name)
            .collect::<Result<Vec<_>, _>>()
            .context("invalid --preferred-challenges")?;
    }
    if let Some(ref json) = cli.webroot_map {
        config.webroot_map = serde_json::from_str::<BTreeMap<String, String>>(json)
            .context("--webroot-map must be a JSON object mapping domains to paths")?;
    }
    if let Some(ref path) = cli.webroot_path {
        config.webroot_path = vec![path.clone()];
    }

    for (arg_id, field) in CLI_PROVENANCE {
        if matches.value_source(arg_id) == Some(ValueSource::CommandLine) {
            config.mark_set_by_cli(field);
        }
    }

    // Dry runs go to the staging environment unless the user pinned a server
    if config.dry_run && !config.set_by_cli("server") {
        config.server = LETS_ENCRYPT_STAGING.to_string();
    }

    Ok(config)
}

/// Console output plus the append-only batch log.
///
/// Quiet/verbose only shape the console; the log file always records at
/// debug level so operators can reconstruct every batch decision.
fn init_logging(logs_dir: &Path, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter, Layer};

    fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;
    let log_path = logs_dir.join("warden.log");
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let console_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(log_file))
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    Ok(())
}
