//! # Firebase Management Endpoints
//!
//! URL construction for the Resource Manager and Firebase Management APIs.
//! Requests themselves go through a [`Transport`](crate::gcp::transport::Transport).

use crate::gcp::firebase::types::Platform;

pub const GCP_CRM_BASE_URL: &str = "https://cloudresourcemanager.googleapis.com/v3";
pub const FIREBASE_BASE_URL: &str = "https://firebase.googleapis.com/v1beta1";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub crm_base: String,
    pub firebase_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            crm_base: GCP_CRM_BASE_URL.to_string(),
            firebase_base: FIREBASE_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// `projects.create` (Resource Manager).
    pub fn create_project(&self) -> String {
        format!("{}/projects", self.crm_base)
    }

    /// `projects.addFirebase`.
    pub fn add_firebase(&self, project_id: &str) -> String {
        format!("{}/projects/{}:addFirebase", self.firebase_base, project_id)
    }

    /// `projects.get` (Firebase).
    pub fn project(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.firebase_base, project_id)
    }

    /// `androidApps` / `iosApps` collection, for both create and list.
    pub fn apps(&self, project_id: &str, platform: Platform) -> String {
        format!(
            "{}/projects/{}/{}",
            self.firebase_base,
            project_id,
            platform.collection()
        )
    }

    /// `androidApps.getConfig` / `iosApps.getConfig`.
    pub fn app_config(&self, project_id: &str, platform: Platform, app_id: &str) -> String {
        format!("{}/{}/config", self.apps(project_id, platform), app_id)
    }
}
