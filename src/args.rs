//! # Argument Resolution
//!
//! Turns the raw, loosely-typed inputs (discrete command line values or an
//! external JSON descriptor) into one validated [`Params`] set. Nothing here
//! touches the network.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{Error as _, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::gcp::firebase::types::{AppSpec, ProjectDescriptor};

pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_HTTP_MAX_RETRIES: u32 = 10;

/// Raw inputs exactly as the user supplied them.
///
/// The same shape is used for the external descriptor, so its keys mirror the
/// command line argument names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawArgs {
    pub auth: Option<String>,
    pub gcp_project_id: Option<String>,
    pub gcp_project_name: Option<String>,
    pub android_app_name: Option<String>,
    pub android_package: Option<String>,
    pub ios_bundle_id: Option<String>,
    pub ios_app_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub app_store_id: Option<String>,
    pub android_config_path: Option<String>,
    pub ios_config_path: Option<String>,
    /// Never read from a descriptor; a nested reference is ignored.
    #[serde(default, deserialize_with = "ignore_nested_config_file")]
    pub config_file: Option<PathBuf>,
    pub poll_max_attempts: Option<u32>,
    pub http_max_retries: Option<u32>,
}

/// Store ids are numeric, so descriptors may carry them unquoted.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

fn ignore_nested_config_file<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<PathBuf>, D::Error> {
    IgnoredAny::deserialize(d)?;
    warn!("ignoring config_file inside the configuration file");
    Ok(None)
}

/// One application to register plus where its config artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTarget {
    pub app: AppSpec,
    pub config_dir: PathBuf,
}

/// Canonical, validated parameter set consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pub credentials_file: PathBuf,
    pub project: ProjectDescriptor,
    pub primary: AppTarget,
    pub secondary: Option<AppTarget>,
    pub poll_max_attempts: u32,
    pub http_max_retries: u32,
}

/// Resolves raw inputs into [`Params`].
///
/// A descriptor reference, when present, is the sole source of truth and all
/// discrete values are dropped.
pub fn resolve(raw: RawArgs) -> Result<Params> {
    let raw = match raw.config_file.as_deref().filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            info!(path = %path.display(), "using an external configuration file");
            load_descriptor(path)?
        }
        None => {
            info!("using command line arguments for project configuration");
            raw
        }
    };
    validate(raw)
}

/// Reads and parses the external JSON descriptor.
pub fn load_descriptor(path: &Path) -> Result<RawArgs> {
    let text = fs::read_to_string(path).map_err(|e| {
        ProvisionError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        ProvisionError::Configuration(format!("malformed descriptor {}: {}", path.display(), e))
    })
}

fn validate(raw: RawArgs) -> Result<Params> {
    let auth = present(&raw.auth);
    let project_id = present(&raw.gcp_project_id);
    let android_package = present(&raw.android_package);

    let (Some(auth), Some(project_id), Some(android_package)) = (auth, project_id, android_package)
    else {
        warn!("--auth, --gcp_project_id and --android_package are required without a configuration file");
        return Err(ProvisionError::Validation(
            "you need to specify --auth, --gcp_project_id and --android_package \
             if not using an external configuration file"
                .to_string(),
        ));
    };

    let ios_bundle_id = present(&raw.ios_bundle_id);
    let ios_extras = [&raw.ios_app_name, &raw.app_store_id, &raw.ios_config_path];
    if ios_bundle_id.is_none() && ios_extras.iter().any(|v| present(v).is_some()) {
        warn!("iOS specific arguments given without --ios_bundle_id");
        return Err(ProvisionError::Validation(
            "you need to specify --ios_bundle_id if using any of the following: \
             --ios_app_name, --app_store_id or --ios_config_path"
                .to_string(),
        ));
    }

    if raw.poll_max_attempts == Some(0) {
        warn!("rejected zero poll attempts");
        return Err(ProvisionError::Validation(
            "poll_max_attempts must be at least 1".to_string(),
        ));
    }

    validate_project_id(project_id)?;
    let project_name = present(&raw.gcp_project_name);
    if let Some(name) = project_name {
        validate_project_name(name)?;
    }

    let primary = AppTarget {
        app: AppSpec::Android {
            package_name: android_package.to_string(),
            display_name: owned(&raw.android_app_name),
        },
        config_dir: config_dir(&raw.android_config_path),
    };
    let secondary = ios_bundle_id.map(|bundle_id| AppTarget {
        app: AppSpec::Ios {
            bundle_id: bundle_id.to_string(),
            display_name: owned(&raw.ios_app_name),
            app_store_id: owned(&raw.app_store_id),
        },
        config_dir: config_dir(&raw.ios_config_path),
    });

    info!(
        project_id,
        secondary = secondary.is_some(),
        "arguments validated"
    );

    Ok(Params {
        credentials_file: PathBuf::from(auth),
        project: ProjectDescriptor {
            id: project_id.to_string(),
            display_name: project_name.map(str::to_string),
        },
        primary,
        secondary,
        poll_max_attempts: raw.poll_max_attempts.unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS),
        http_max_retries: raw.http_max_retries.unwrap_or(DEFAULT_HTTP_MAX_RETRIES),
    })
}

/// 6 to 30 lowercase letters, digits or hyphens, starting with a letter,
/// without a trailing hyphen.
pub fn validate_project_id(id: &str) -> Result<()> {
    let len_ok = (6..=30).contains(&id.len());
    let chars_ok = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let starts_ok = id.starts_with(|c: char| c.is_ascii_lowercase());
    if len_ok && chars_ok && starts_ok && !id.ends_with('-') {
        Ok(())
    } else {
        warn!(project_id = id, "rejected project id");
        Err(ProvisionError::Validation(format!(
            "invalid project id {id:?}: must be 6 to 30 lowercase letters, digits or \
             hyphens, start with a letter and not end with a hyphen"
        )))
    }
}

/// 4 to 30 characters: letters, digits, hyphen, quotes, space and `!`.
pub fn validate_project_name(name: &str) -> Result<()> {
    let len_ok = (4..=30).contains(&name.chars().count());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '\'' | '"' | ' ' | '!'));
    if len_ok && chars_ok {
        Ok(())
    } else {
        warn!(project_name = name, "rejected project display name");
        Err(ProvisionError::Validation(format!(
            "invalid project name {name:?}: must be 4 to 30 letters, digits, hyphens, \
             quotes, spaces or exclamation points"
        )))
    }
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

fn owned(v: &Option<String>) -> Option<String> {
    present(v).map(str::to_string)
}

fn config_dir(v: &Option<String>) -> PathBuf {
    present(v).map(PathBuf::from).unwrap_or_default()
}
