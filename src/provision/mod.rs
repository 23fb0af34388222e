//! # Provisioning Workflow
//!
//! Runs the fixed sequence against the management APIs:
//!
//! 1. create the Cloud project
//! 2. add Firebase to it
//! 3. register the Android app (after the project reports `ACTIVE`)
//! 4. download and save its config
//! 5. register the iOS app, when a bundle id was given
//! 6. download and save its config
//!
//! Any failed step aborts the run; nothing after it is attempted.

pub mod artifact;
pub mod poll;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::args::{AppTarget, Params};
use crate::error::{ProvisionError, Result};
use crate::gcp::firebase::types::{
    AppEntry, AppHandle, AppList, AppSpec, ConfigFile, FirebaseProject, ProjectDescriptor,
};
use crate::gcp::firebase::Endpoints;
use crate::gcp::transport::{Method, Transport};

use self::artifact::ConfigArtifact;
use self::poll::{PollPolicy, Sleeper, poll_until};

const STEP_CREATE_PROJECT: &str = "create project";
const STEP_ADD_FIREBASE: &str = "enable sub-service";
const STEP_FETCH_PROJECT: &str = "fetch project";
const STEP_AWAIT_PROJECT: &str = "wait for active project";
const STEP_REGISTER_APP: &str = "register application";
const STEP_LIST_APPS: &str = "list applications";
const STEP_AWAIT_APP: &str = "wait for application id";
const STEP_FETCH_CONFIG: &str = "fetch config";

/// One registered application and where its config was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedApp {
    pub handle: AppHandle,
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub project_id: String,
    pub primary: ProvisionedApp,
    pub secondary: Option<ProvisionedApp>,
}

pub struct Provisioner<'a, T: Transport + ?Sized, S: Sleeper + ?Sized> {
    transport: &'a T,
    sleeper: &'a S,
    endpoints: Endpoints,
    poll: PollPolicy,
}

impl<'a, T: Transport + ?Sized, S: Sleeper + ?Sized> Provisioner<'a, T, S> {
    pub fn new(transport: &'a T, sleeper: &'a S, poll: PollPolicy) -> Self {
        Self {
            transport,
            sleeper,
            endpoints: Endpoints::default(),
            poll,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn run(&self, params: &Params) -> Result<Outcome> {
        let project_id = params.project.id.as_str();

        self.create_project(&params.project)?;
        self.add_firebase(project_id)?;

        let primary = self.provision_app(project_id, &params.primary)?;
        let secondary = match &params.secondary {
            Some(target) => Some(self.provision_app(project_id, target)?),
            None => {
                info!("no iOS bundle id given, skipping the iOS application");
                None
            }
        };

        info!(project_id, "provisioning completed");
        Ok(Outcome {
            project_id: project_id.to_string(),
            primary,
            secondary,
        })
    }

    fn provision_app(&self, project_id: &str, target: &AppTarget) -> Result<ProvisionedApp> {
        let handle = self.register_app(project_id, &target.app)?;
        let config_path = self.download_config(project_id, &handle, &target.config_dir)?;
        Ok(ProvisionedApp {
            handle,
            config_path,
        })
    }

    /// Step 1. Not awaited; the project becomes visible to Firebase later.
    pub fn create_project(&self, project: &ProjectDescriptor) -> Result<()> {
        let url = self.endpoints.create_project();
        let body = encode(STEP_CREATE_PROJECT, &url, project)?;
        info!(project_id = %project.id, display_name = ?project.display_name, "creating Google Cloud Platform project");
        self.call(STEP_CREATE_PROJECT, Method::Post, &url, Some(&body))?;
        Ok(())
    }

    /// Step 2. Completion is observed by the readiness poll in
    /// [`register_app`](Self::register_app).
    pub fn add_firebase(&self, project_id: &str) -> Result<()> {
        let url = self.endpoints.add_firebase(project_id);
        info!(project_id, "adding Firebase to the Google Cloud Platform project");
        self.call(STEP_ADD_FIREBASE, Method::Post, &url, Some(&Value::Object(Default::default())))?;
        Ok(())
    }

    /// Waits for the project to be active, registers `app`, then waits for it
    /// to be listed and returns its assigned id.
    pub fn register_app(&self, project_id: &str, app: &AppSpec) -> Result<AppHandle> {
        let platform = app.platform();

        let project_url = self.endpoints.project(project_id);
        poll_until(&self.poll, self.sleeper, STEP_AWAIT_PROJECT, || {
            info!(project_id, "fetching Firebase project");
            let project: FirebaseProject = self.get(STEP_FETCH_PROJECT, &project_url)?;
            Ok(project.is_active_for(project_id).then_some(()))
        })?;

        let apps_url = self.endpoints.apps(project_id, platform);
        let body = encode(STEP_REGISTER_APP, &apps_url, app)?;
        info!(%platform, identifier = app.identifier(), project_id, "adding application to the Firebase project");
        self.call(STEP_REGISTER_APP, Method::Post, &apps_url, Some(&body))?;

        let entry = poll_until(&self.poll, self.sleeper, STEP_AWAIT_APP, || {
            info!(%platform, project_id, "fetching applications of the Firebase project");
            Ok(select_app(self.list_apps(&apps_url)?, app.identifier()))
        })?;

        info!(%platform, app_id = %entry.app_id, "application registered");
        Ok(AppHandle {
            app_id: entry.app_id,
            platform,
        })
    }

    /// Fetches the app's config and writes it into `dir`.
    pub fn download_config(&self, project_id: &str, handle: &AppHandle, dir: &Path) -> Result<PathBuf> {
        let url = self
            .endpoints
            .app_config(project_id, handle.platform, &handle.app_id);
        info!(platform = %handle.platform, app_id = %handle.app_id, "fetching configuration");
        let file: ConfigFile = self.get(STEP_FETCH_CONFIG, &url)?;

        info!(platform = %handle.platform, app_id = %handle.app_id, filename = %file.config_filename, "decoding configuration");
        ConfigArtifact::from_response(handle.platform, &file, dir)?.write()
    }

    /// All apps of one collection, following `nextPageToken`.
    fn list_apps(&self, apps_url: &str) -> Result<Vec<AppEntry>> {
        let mut apps = Vec::new();
        let mut url = apps_url.to_string();
        loop {
            let page: AppList = self.get(STEP_LIST_APPS, &url)?;
            apps.extend(page.apps);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => url = format!("{apps_url}?pageToken={token}"),
                None => return Ok(apps),
            }
        }
    }

    fn call(&self, step: &str, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        self.transport
            .execute(method, url, body)
            .map_err(|e| ProvisionError::remote(step, url, e))
    }

    fn get<R: DeserializeOwned>(&self, step: &str, url: &str) -> Result<R> {
        let value = self.call(step, Method::Get, url, None)?;
        serde_json::from_value(value)
            .map_err(|e| ProvisionError::remote(step, url, format!("unexpected response: {e}")))
    }
}

fn encode<B: Serialize>(step: &str, url: &str, body: &B) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| ProvisionError::remote(step, url, format!("cannot encode request: {e}")))
}

/// Picks the listed app whose package name / bundle id matches the one just
/// registered. Entries listed without any identifier are taken as a fallback;
/// an entry carrying a different identifier is another app, so the caller
/// keeps polling.
fn select_app(apps: Vec<AppEntry>, identifier: &str) -> Option<AppEntry> {
    if let Some(pos) = apps.iter().position(|a| a.identifier() == Some(identifier)) {
        return apps.into_iter().nth(pos);
    }
    let unnamed = apps.into_iter().find(|a| a.identifier().is_none())?;
    warn!(identifier, app_id = %unnamed.app_id, "no listed application matches, using one without an identifier");
    Some(unnamed)
}
