use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use firebase_setup::gcp::Authenticator;
use firebase_setup::gcp::token_store::FileCredentialStore;
use firebase_setup::gcp::transport::{HttpTransport, RetryPolicy};
use firebase_setup::provision::poll::{PollPolicy, ThreadSleeper};
use firebase_setup::{ProvisionError, Provisioner, RawArgs, resolve};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "firebase-setup",
    about = "Create a GCP project, add Firebase, register Android/iOS apps and download their configs"
)]
struct Cli {
    /// Path to the credentials.json file obtained from Google Cloud Platform.
    /// Required if not using an external config file.
    #[arg(long = "auth")]
    auth: Option<String>,

    /// Unique id of the project: 6 to 30 lowercase letters, digits or hyphens,
    /// starting with a letter, no trailing hyphen (e.g. my-test-project-123).
    #[arg(long = "gcp_project_id")]
    gcp_project_id: Option<String>,

    /// Display name of the project, 4 to 30 characters (e.g. "My Test Project").
    #[arg(long = "gcp_project_name")]
    gcp_project_name: Option<String>,

    /// Display name of the Android app.
    #[arg(long = "android_app_name")]
    android_app_name: Option<String>,

    /// Package name of the Android app as it appears in the Play Console.
    #[arg(long = "android_package")]
    android_package: Option<String>,

    /// Bundle id of the iOS app. Required by --ios_app_name, --app_store_id
    /// and --ios_config_path.
    #[arg(long = "ios_bundle_id")]
    ios_bundle_id: Option<String>,

    /// Display name of the iOS app.
    #[arg(long = "ios_app_name")]
    ios_app_name: Option<String>,

    /// Apple ID assigned to the iOS app in the App Store (e.g. 123456789).
    #[arg(long = "app_store_id")]
    app_store_id: Option<String>,

    /// Directory for the Android config file. Defaults to the current directory.
    #[arg(long = "android_config_path")]
    android_config_path: Option<String>,

    /// Directory for the iOS config file. Defaults to the current directory.
    #[arg(long = "ios_config_path")]
    ios_config_path: Option<String>,

    /// External JSON configuration file. When given, all other project
    /// arguments are ignored.
    #[arg(long = "config_file")]
    config_file: Option<PathBuf>,

    /// Attempts per readiness/assignment poll before giving up.
    #[arg(long = "poll_max_attempts")]
    poll_max_attempts: Option<u32>,

    /// Retries per HTTP request on transient failures.
    #[arg(long = "http_max_retries")]
    http_max_retries: Option<u32>,

    /// Where the OAuth token is cached between runs.
    #[arg(long = "token_cache", default_value = "token.json")]
    token_cache: PathBuf,

    /// Log level, overridden by RUST_LOG.
    #[arg(long = "log_level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn raw_args(&self) -> RawArgs {
        RawArgs {
            auth: self.auth.clone(),
            gcp_project_id: self.gcp_project_id.clone(),
            gcp_project_name: self.gcp_project_name.clone(),
            android_app_name: self.android_app_name.clone(),
            android_package: self.android_package.clone(),
            ios_bundle_id: self.ios_bundle_id.clone(),
            ios_app_name: self.ios_app_name.clone(),
            app_store_id: self.app_store_id.clone(),
            android_config_path: self.android_config_path.clone(),
            ios_config_path: self.ios_config_path.clone(),
            config_file: self.config_file.clone(),
            poll_max_attempts: self.poll_max_attempts,
            http_max_retries: self.http_max_retries,
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Exit code for a command line that clap refused. Help and version requests
/// are not failures; everything else is invalid input.
fn parse_exit_code(e: &clap::Error) -> i32 {
    if e.use_stderr() { 1 } else { 0 }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        }
    };
    init_logging(&cli.log_level);

    if let Err(e) = ctrlc::set_handler(|| {
        warn!("Ctrl+C detected, aborting provisioning");
        std::process::exit(130);
    }) {
        warn!(error = %e, "failed to install Ctrl+C handler");
    }

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        let code = e
            .downcast_ref::<ProvisionError>()
            .map_or(1, ProvisionError::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let params = resolve(cli.raw_args())?;

    let store = FileCredentialStore::new(&cli.token_cache);
    let token = Authenticator::new(&store, &params.credentials_file).bearer()?;

    let transport = HttpTransport::new(
        token,
        RetryPolicy {
            max_retries: params.http_max_retries,
            ..RetryPolicy::default()
        },
    );
    let provisioner = Provisioner::new(
        &transport,
        &ThreadSleeper,
        PollPolicy::new(params.poll_max_attempts),
    );
    let outcome = provisioner
        .run(&params)
        .with_context(|| format!("Provisioning of {} aborted", params.project.id))?;

    info!(
        project_id = %outcome.project_id,
        android_app_id = %outcome.primary.handle.app_id,
        ios_app_id = ?outcome.secondary.as_ref().map(|s| &s.handle.app_id),
        "all steps completed"
    );
    println!("{}", outcome.primary.config_path.display());
    if let Some(ios) = &outcome.secondary {
        println!("{}", ios.config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_flags_exit_like_validation_errors() {
        let e = Cli::try_parse_from(["firebase-setup", "--poll_max_attempts", "abc"]).unwrap_err();
        assert_eq!(parse_exit_code(&e), 1);
        let e = Cli::try_parse_from(["firebase-setup", "--no_such_flag"]).unwrap_err();
        assert_eq!(parse_exit_code(&e), 1);
    }

    #[test]
    fn help_is_not_an_error() {
        let e = Cli::try_parse_from(["firebase-setup", "--help"]).unwrap_err();
        assert_eq!(parse_exit_code(&e), 0);
    }

    #[test]
    fn flags_map_onto_raw_args() {
        let cli = Cli::try_parse_from([
            "firebase-setup",
            "--auth",
            "c.json",
            "--gcp_project_id",
            "demo-proj-1",
            "--android_package",
            "com.demo.app",
            "--poll_max_attempts",
            "7",
        ])
        .unwrap();
        let raw = cli.raw_args();
        assert_eq!(raw.auth.as_deref(), Some("c.json"));
        assert_eq!(raw.gcp_project_id.as_deref(), Some("demo-proj-1"));
        assert_eq!(raw.poll_max_attempts, Some(7));
        assert_eq!(cli.token_cache, PathBuf::from("token.json"));
    }
}
