//! # Firebase Management Data Types
//!
//! Domain descriptors for the project and its applications, and the JSON
//! shapes exchanged with the Resource Manager and Firebase Management APIs.

use serde::{Deserialize, Serialize};

/// Project to create. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    #[serde(rename = "projectId")]
    pub id: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The two mobile platforms an application can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Collection segment under `projects/{id}/`.
    pub fn collection(self) -> &'static str {
        match self {
            Platform::Android => "androidApps",
            Platform::Ios => "iosApps",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An application to register. Each variant carries its own payload shape and
/// serializes directly into the `create` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AppSpec {
    Android {
        #[serde(rename = "packageName")]
        package_name: String,
        #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    Ios {
        #[serde(rename = "bundleId")]
        bundle_id: String,
        #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(rename = "appStoreId", skip_serializing_if = "Option::is_none")]
        app_store_id: Option<String>,
    },
}

impl AppSpec {
    pub fn platform(&self) -> Platform {
        match self {
            AppSpec::Android { .. } => Platform::Android,
            AppSpec::Ios { .. } => Platform::Ios,
        }
    }

    /// Package name or bundle id submitted at registration.
    pub fn identifier(&self) -> &str {
        match self {
            AppSpec::Android { package_name, .. } => package_name,
            AppSpec::Ios { bundle_id, .. } => bundle_id,
        }
    }
}

/// Identifier assigned by the remote system to a registered application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHandle {
    pub app_id: String,
    pub platform: Platform,
}

/// `FirebaseProject` as returned by `projects.get`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FirebaseProject {
    #[serde(rename = "projectId", default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl FirebaseProject {
    pub fn is_active_for(&self, project_id: &str) -> bool {
        self.project_id.as_deref() == Some(project_id)
            && self
                .state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("active"))
    }
}

/// Response of `androidApps.list` / `iosApps.list`. An empty project yields `{}`.
#[derive(Debug, Deserialize, Default)]
pub struct AppList {
    #[serde(default)]
    pub apps: Vec<AppEntry>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppEntry {
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "packageName", default)]
    pub package_name: Option<String>,
    #[serde(rename = "bundleId", default)]
    pub bundle_id: Option<String>,
}

impl AppEntry {
    pub fn identifier(&self) -> Option<&str> {
        self.package_name.as_deref().or(self.bundle_id.as_deref())
    }
}

/// Response of `androidApps.getConfig` / `iosApps.getConfig`.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "configFilename")]
    pub config_filename: String,
    #[serde(rename = "configFileContents")]
    pub config_file_contents: String,
}
